pub mod preprocessing;
pub mod segmentation;
pub mod contours;
pub mod filtering;
pub mod classify;

use image::DynamicImage;
use log::{debug, info, warn};
use time::OffsetDateTime;

use crate::config::Config;
use crate::debug::{DebugConfig, Stage};
use crate::error::{AnalysisError, Result};
use crate::models::{DetectedObject, FeatureRecord, FrameResult};
use classify::Classifier;
use segmentation::LabelMap;

/// Main detection pipeline orchestrator
pub struct PartDetector {
    config: Config,
    classifier: Classifier,
    debug: Option<DebugConfig>,
}

impl PartDetector {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let classifier = Classifier::new(&config.classifier);
        Ok(Self {
            config,
            classifier,
            debug: None,
        })
    }

    /// Save stage images on every `analyze` call.
    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the full detection pipeline on a decoded image
    pub fn analyze(&self, img: &DynamicImage, min_confidence: f32) -> Result<FrameResult> {
        check_threshold(min_confidence)?;
        let timestamp = OffsetDateTime::now_utc();

        let objects = self.detect(img)?;
        let frame = FrameResult::build(timestamp, objects, min_confidence);

        info!(
            "analyzed {}x{} image: {} objects (mean confidence {:.2})",
            img.width(),
            img.height(),
            frame.count,
            frame.mean_confidence
        );
        Ok(frame)
    }

    /// Decode `bytes` and analyze the result.
    pub fn analyze_bytes(&self, bytes: &[u8], min_confidence: f32) -> Result<FrameResult> {
        check_threshold(min_confidence)?;
        if bytes.is_empty() {
            warn!("rejected empty image upload");
            return Err(AnalysisError::InvalidImage("empty input".into()));
        }
        let img = image::load_from_memory(bytes).map_err(|e| {
            warn!("rejected undecodable image: {e}");
            AnalysisError::InvalidImage(format!("failed to decode image: {e}"))
        })?;
        self.analyze(&img, min_confidence)
    }

    /// Every classified object, before the confidence cut.
    pub fn detect(&self, img: &DynamicImage) -> Result<Vec<DetectedObject>> {
        let candidates = self.features(img)?;
        let image_area = img.width() as u64 * img.height() as u64;

        let kept = filtering::filter_objects(&candidates, image_area, &self.config.filter);
        debug!("filtering: kept {} of {} regions", kept.len(), candidates.len());

        let objects = self.classifier.classify_all(kept);
        for object in &objects {
            debug!(
                "region {}: {} ({:.2})",
                object.feature.region_id, object.part_type, object.confidence
            );
        }
        Ok(objects)
    }

    /// Measurements of every segmented region (for debugging)
    pub fn features(&self, img: &DynamicImage) -> Result<Vec<FeatureRecord>> {
        let labels = self.label_map(img)?;
        let features = contours::extract_features(&labels, &self.config.features);
        debug!("features: measured {} regions", features.len());
        Ok(features)
    }

    /// Watershed labelling of an image (for debugging)
    pub fn label_map(&self, img: &DynamicImage) -> Result<LabelMap> {
        let debug = self.debug.as_ref().filter(|d| d.enabled);
        if let Some(debug) = debug {
            debug.save(Stage::Input, img)?;
        }

        debug!("preprocessing {}x{} image", img.width(), img.height());
        let normalized = preprocessing::normalize(img, &self.config.preprocess)?;
        let stages = segmentation::segment_with_stages(&normalized, &self.config.segmentation);

        if let Some(debug) = debug {
            debug.save_gray(Stage::Normalized, &normalized)?;
            debug.save_gray(Stage::Binary, &stages.binary)?;
            debug.save_gray(Stage::Cleaned, &stages.cleaned)?;
            debug.save_rgb(Stage::Labels, &stages.labels.to_color_image())?;
        }

        Ok(stages.labels)
    }
}

fn check_threshold(min_confidence: f32) -> Result<()> {
    if (0.0..=1.0).contains(&min_confidence) {
        Ok(())
    } else {
        warn!("rejected confidence threshold {min_confidence}");
        Err(AnalysisError::InvalidConfidenceThreshold(min_confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let detector = PartDetector::new(Config::default()).unwrap();
        let img = DynamicImage::new_luma8(128, 128);
        for bad in [-0.1, 1.5, f32::NAN] {
            assert!(matches!(
                detector.analyze(&img, bad),
                Err(AnalysisError::InvalidConfidenceThreshold(_))
            ));
        }
        assert!(detector.analyze(&img, 0.0).is_ok());
        assert!(detector.analyze(&img, 1.0).is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.segmentation.block_size = 4;
        assert!(matches!(
            PartDetector::new(config),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn garbage_bytes_are_invalid_image() {
        let detector = PartDetector::new(Config::default()).unwrap();
        assert!(matches!(
            detector.analyze_bytes(b"not an image", 0.5),
            Err(AnalysisError::InvalidImage(_))
        ));
        assert!(matches!(
            detector.analyze_bytes(&[], 0.5),
            Err(AnalysisError::InvalidImage(_))
        ));
    }
}
