use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AnalysisError, Result};

/// Closed interval `[min, max]` used for feature bands and filter ranges.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Band {
    pub min: f32,
    pub max: f32,
}

impl Band {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// 1.0 at the centre of the band, falling linearly to 0.0 at either edge.
    /// Values outside the band score 0.0.
    pub fn centring(&self, value: f32) -> f32 {
        if !self.contains(value) {
            return 0.0;
        }
        let half = (self.max - self.min) / 2.0;
        if half <= f32::EPSILON {
            return 1.0;
        }
        let mid = self.min + half;
        (1.0 - (value - mid).abs() / half).clamp(0.0, 1.0)
    }

    /// One-sided score: 0.0 at `min`, rising linearly to 1.0 at `max` and
    /// staying there above it. Values below `min` score 0.0.
    pub fn rising(&self, value: f32) -> f32 {
        if !(value >= self.min) {
            return 0.0;
        }
        let span = self.max - self.min;
        if span <= f32::EPSILON {
            return 1.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    /// 1.0 at `target`, falling linearly to 0.0 at the farther band edge.
    /// Values outside the band score 0.0.
    pub fn closeness(&self, value: f32, target: f32) -> f32 {
        if !self.contains(value) {
            return 0.0;
        }
        let reach = (target - self.min).max(self.max - target);
        if reach <= f32::EPSILON {
            return 1.0;
        }
        (1.0 - (value - target).abs() / reach).clamp(0.0, 1.0)
    }

    fn check(&self, name: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(AnalysisError::InvalidConfig(format!(
                "{name} band [{}, {}] is empty or not finite",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// CLAHE clip limit as a multiple of the uniform bin height.
    pub clahe_clip_limit: f32,
    /// CLAHE tile edge length in pixels.
    pub clahe_tile_size: u32,
    /// Bilateral window radius (window is `2r + 1` wide).
    pub smoothing_radius: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 2.0,
            clahe_tile_size: 64,
            smoothing_radius: 2,
            sigma_color: 25.0,
            sigma_space: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Adaptive threshold neighbourhood size, odd.
    pub block_size: u32,
    /// A pixel is foreground when it is at least this much darker than its local mean.
    pub threshold_offset: f32,
    /// Radius of the square structuring element for opening and closing.
    pub morph_radius: u8,
    /// Minimum distance-to-background (pixels) for a marker.
    pub min_peak_height: f32,
    /// Minimum separation between two markers, also the local-maximum window radius.
    pub min_peak_distance: u32,
    /// Adjacent basins merge when their pass is at least this fraction of the lower peak.
    pub merge_ratio: f32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            block_size: 101,
            threshold_offset: 5.0,
            morph_radius: 1,
            min_peak_height: 2.0,
            min_peak_distance: 5,
            merge_ratio: 0.75,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Regions with a pixel this close to the image edge count as touching it.
    pub border_margin: u32,
    /// Hole ratio at or above which a region is considered to have an inner hole.
    pub min_hole_ratio: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            border_margin: 0,
            min_hole_ratio: 0.03,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_area: u32,
    pub min_area_fraction: f32,
    pub max_area_fraction: f32,
    pub circularity: Band,
    pub extent: Band,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_area: 100,
            min_area_fraction: 0.0005,
            max_area_fraction: 0.05,
            circularity: Band::new(0.1, 1.5),
            extent: Band::new(0.2, 1.0),
        }
    }
}

impl FilterConfig {
    /// Effective `(min, max)` area bounds for an image with `image_area` pixels.
    pub fn area_bounds(&self, image_area: u64) -> (f32, f32) {
        let image_area = image_area as f32;
        let min = (self.min_area as f32).max(self.min_area_fraction * image_area);
        let max = self.max_area_fraction * image_area;
        (min, max)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WasherBands {
    pub hole_ratio: Band,
    pub circularity: Band,
}

impl Default for WasherBands {
    fn default() -> Self {
        Self {
            hole_ratio: Band::new(0.05, 0.6),
            circularity: Band::new(0.75, 1.25),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NutBands {
    pub aspect_ratio: Band,
    /// Aspect ratio of an ideal nut; scores fall off with distance from it.
    pub aspect_target: f32,
    /// `min` is the acceptance threshold; the score is full from `max` up.
    pub extent: Band,
    pub circularity: Band,
}

impl Default for NutBands {
    fn default() -> Self {
        Self {
            aspect_ratio: Band::new(1.0, 1.3),
            aspect_target: 1.0,
            extent: Band::new(0.65, 1.0),
            circularity: Band::new(0.6, 0.92),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoltBands {
    pub aspect_ratio: Band,
    /// `min` is the acceptance threshold; the score is full from `max` up.
    pub extent: Band,
}

impl Default for BoltBands {
    fn default() -> Self {
        Self {
            aspect_ratio: Band::new(2.2, 12.0),
            extent: Band::new(0.6, 1.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrewBands {
    pub aspect_ratio: Band,
    pub extent: Band,
    pub circularity: Band,
}

impl Default for ScrewBands {
    fn default() -> Self {
        Self {
            aspect_ratio: Band::new(1.8, 12.0),
            extent: Band::new(0.25, 0.6),
            circularity: Band::new(0.05, 0.45),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Lowest confidence a full band match can have; partial matches stay below it.
    pub match_floor: f32,
    pub washer: WasherBands,
    pub nut: NutBands,
    pub bolt: BoltBands,
    pub screw: ScrewBands,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            match_floor: 0.5,
            washer: WasherBands::default(),
            nut: NutBands::default(),
            bolt: BoltBands::default(),
            screw: ScrewBands::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    pub window_capacity: usize,
    /// Consistency at or above which counts are reported stable.
    pub stable_cutoff: f32,
    /// Consistency at or above which more captures are suggested instead of vibrating.
    pub settling_cutoff: f32,
    /// Fewer recorded counts than this always yield a "capture more" recommendation.
    pub min_samples: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            window_capacity: 10,
            stable_cutoff: 0.8,
            settling_cutoff: 0.5,
            min_samples: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preprocess: PreprocessConfig,
    pub segmentation: SegmentationConfig,
    pub features: FeatureConfig,
    pub filter: FilterConfig,
    pub classifier: ClassifierConfig,
    pub stability: StabilityConfig,
}

impl Config {
    /// Read a JSON config file. Missing sections and fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AnalysisError::InvalidConfig(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(AnalysisError::InvalidConfig(msg));

        let p = &self.preprocess;
        if p.clahe_tile_size == 0 {
            return invalid("clahe_tile_size must be positive".into());
        }
        if !(p.clahe_clip_limit >= 0.0) {
            return invalid(format!("clahe_clip_limit {} must be >= 0", p.clahe_clip_limit));
        }
        if !(p.sigma_color > 0.0 && p.sigma_space > 0.0) {
            return invalid("bilateral sigmas must be positive".into());
        }

        let s = &self.segmentation;
        if s.block_size < 3 || s.block_size % 2 == 0 {
            return invalid(format!("block_size {} must be odd and >= 3", s.block_size));
        }
        if !(s.merge_ratio > 0.0 && s.merge_ratio <= 1.0) {
            return invalid(format!("merge_ratio {} must be in (0, 1]", s.merge_ratio));
        }
        if s.min_peak_distance == 0 {
            return invalid("min_peak_distance must be positive".into());
        }

        let f = &self.filter;
        if !(f.max_area_fraction > 0.0 && f.max_area_fraction <= 1.0) {
            return invalid(format!(
                "max_area_fraction {} must be in (0, 1]",
                f.max_area_fraction
            ));
        }
        f.circularity.check("filter circularity")?;
        f.extent.check("filter extent")?;

        let c = &self.classifier;
        if !(0.0..1.0).contains(&c.match_floor) {
            return invalid(format!("match_floor {} must be in [0, 1)", c.match_floor));
        }
        c.washer.hole_ratio.check("washer hole_ratio")?;
        c.washer.circularity.check("washer circularity")?;
        c.nut.aspect_ratio.check("nut aspect_ratio")?;
        if !c.nut.aspect_ratio.contains(c.nut.aspect_target) {
            return invalid(format!(
                "nut aspect_target {} is outside its band",
                c.nut.aspect_target
            ));
        }
        c.nut.extent.check("nut extent")?;
        c.nut.circularity.check("nut circularity")?;
        c.bolt.aspect_ratio.check("bolt aspect_ratio")?;
        c.bolt.extent.check("bolt extent")?;
        c.screw.aspect_ratio.check("screw aspect_ratio")?;
        c.screw.extent.check("screw extent")?;
        c.screw.circularity.check("screw circularity")?;

        let st = &self.stability;
        if st.window_capacity == 0 {
            return invalid("window_capacity must be at least 1".into());
        }
        if !(0.0 <= st.settling_cutoff
            && st.settling_cutoff <= st.stable_cutoff
            && st.stable_cutoff <= 1.0)
        {
            return invalid(format!(
                "cut points must satisfy 0 <= settling ({}) <= stable ({}) <= 1",
                st.settling_cutoff, st.stable_cutoff
            ));
        }
        Ok(())
    }
}
