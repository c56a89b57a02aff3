use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, RgbImage};
use log::debug;

use crate::error::{AnalysisError, Result};

/// Debug configuration for detector runs
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

impl DebugConfig {
    /// Target `output_dir` for stage images.
    /// The directory must be empty or non-existent.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        if output_dir.exists() {
            let entries = fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            fs::create_dir_all(&output_dir)?;
        }

        Ok(Self {
            output_dir,
            enabled: true,
        })
    }

    pub fn disabled() -> Self {
        Self {
            output_dir: PathBuf::new(),
            enabled: false,
        }
    }

    /// Fresh subdirectory `capture_NN` for the `index`-th capture (1-based),
    /// so stage images from successive captures do not overwrite each other.
    pub fn for_capture(&self, index: usize) -> Result<Self> {
        if !self.enabled {
            return Ok(Self::disabled());
        }
        Self::new(self.output_dir.join(format!("capture_{index:02}")))
    }

    pub fn stage_path(&self, stage: Stage) -> PathBuf {
        self.output_dir.join(stage.file_name())
    }

    pub fn save_gray(&self, stage: Stage, img: &GrayImage) -> Result<()> {
        self.save(stage, &DynamicImage::ImageLuma8(img.clone()))
    }

    pub fn save_rgb(&self, stage: Stage, img: &RgbImage) -> Result<()> {
        self.save(stage, &DynamicImage::ImageRgb8(img.clone()))
    }

    pub fn save(&self, stage: Stage, img: &DynamicImage) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.stage_path(stage);
        write_png(&path, img)?;
        debug!("debug: saved {}", path.display());
        Ok(())
    }
}

/// Intermediate images written in debug mode, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Input,
    Normalized,
    Binary,
    Cleaned,
    Labels,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Input,
        Stage::Normalized,
        Stage::Binary,
        Stage::Cleaned,
        Stage::Labels,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Stage::Input => "00_input.png",
            Stage::Normalized => "01_normalized.png",
            Stage::Binary => "02_binary.png",
            Stage::Cleaned => "03_cleaned.png",
            Stage::Labels => "04_labels.png",
        }
    }
}

fn write_png(path: &Path, img: &DynamicImage) -> Result<()> {
    img.save(path).map_err(|e| match e {
        image::ImageError::IoError(io) => AnalysisError::Io(io),
        other => AnalysisError::InvalidImage(format!(
            "failed to save debug image {}: {other}",
            path.display()
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn rejects_non_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stale.txt"), "x").unwrap();
        let err = DebugConfig::new(dir.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn creates_missing_directory_and_saves_stage() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("debug");
        let config = DebugConfig::new(&target).unwrap();
        assert!(target.is_dir());

        let img = GrayImage::from_pixel(8, 8, Luma([128]));
        config.save_gray(Stage::Binary, &img).unwrap();
        assert!(target.join("02_binary.png").is_file());
    }

    #[test]
    fn captures_get_their_own_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = DebugConfig::new(dir.path().join("debug")).unwrap();
        let img = GrayImage::from_pixel(8, 8, Luma([128]));
        for index in 1..=2 {
            root.for_capture(index).unwrap().save_gray(Stage::Input, &img).unwrap();
        }
        assert!(root.output_dir.join("capture_01").join("00_input.png").is_file());
        assert!(root.output_dir.join("capture_02").join("00_input.png").is_file());
        assert!(!DebugConfig::disabled().for_capture(1).unwrap().enabled);
    }

    #[test]
    fn disabled_config_writes_nothing() {
        let config = DebugConfig::disabled();
        let img = GrayImage::new(4, 4);
        config.save_gray(Stage::Input, &img).unwrap();
        assert!(!Path::new("00_input.png").exists());
    }
}
