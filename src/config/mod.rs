//! Application Configuration
//!
//! OCR engine and prediction settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ImprintError;

/// Default delimiter between texts on one report line.
/// Imprint databases use the same separator between imprint sections.
pub const DEFAULT_DELIMITER: &str = ";";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// OCR engine settings
    pub ocr: OcrSettings,
    /// Prediction and report settings
    pub prediction: PredictionSettings,
}

/// OCR engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Model storage directory; falls back to the environment, then the data dir
    pub model_dir: Option<PathBuf>,
    /// Run inference on the GPU
    pub use_gpu: bool,
    /// Never download missing models
    pub offline: bool,
}

/// Prediction and report settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSettings {
    /// Also read the image rotated by 90, 180 and 270 degrees
    pub rotate: bool,
    /// Separator between texts of one image permutation
    pub delimiter: String,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            rotate: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content).map_err(|e| ImprintError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
