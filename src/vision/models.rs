//! Model management for ONNX Runtime
//!
//! Handles downloading, caching, and loading of the PaddleOCR models.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ort::session::{builder::GraphOptimizationLevel, Session};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::error::ImprintError;

/// Setting this variable forbids model downloads
pub const OFFLINE_ENV: &str = "PILL_OCR_OFFLINE";

/// Model files the OCR engine needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Text detection model (DBNet)
    Detection,
    /// Text recognition model (SVTR/CRNN)
    Recognition,
    /// Character dictionary for recognition
    Dictionary,
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [
        ModelType::Detection,
        ModelType::Recognition,
        ModelType::Dictionary,
    ];

    /// Get the filename for this model type
    pub fn filename(&self) -> &'static str {
        match self {
            ModelType::Detection => "det.onnx",
            ModelType::Recognition => "rec.onnx",
            ModelType::Dictionary => "dict.txt",
        }
    }

    /// Download URL (PaddleOCR ONNX exports on Hugging Face)
    pub fn download_url(&self) -> &'static str {
        match self {
            ModelType::Detection => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/detection/v3/det.onnx"
            }
            // Imprints are Latin letters and digits
            ModelType::Recognition => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/rec.onnx"
            }
            ModelType::Dictionary => {
                "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/dict.txt"
            }
        }
    }

    /// Plausible file size range in bytes, used as an integrity check
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelType::Detection => (2_000_000, 5_000_000),
            ModelType::Recognition => (7_000_000, 10_000_000),
            ModelType::Dictionary => (100, 10_000),
        }
    }

    /// Display name for logs
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::Detection => "Text Detection",
            ModelType::Recognition => "Text Recognition",
            ModelType::Dictionary => "Character Dictionary",
        }
    }
}

/// Model manifest tracking downloaded models
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Seconds since the Unix epoch
    pub downloaded_at: u64,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

/// Availability of one model file
#[derive(Debug, Clone)]
pub struct ModelStatus {
    pub model_type: ModelType,
    pub path: PathBuf,
    pub available: bool,
    pub size_bytes: Option<u64>,
}

/// Model manager for downloading and caching ONNX models
pub struct ModelManager {
    models_dir: PathBuf,
    offline: bool,
}

impl ModelManager {
    /// Create a model manager rooted at `models_dir`
    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create model directory {:?}", models_dir))?;

        Ok(Self {
            models_dir,
            offline: std::env::var_os(OFFLINE_ENV).is_some(),
        })
    }

    /// Forbid downloads. `PILL_OCR_OFFLINE` forbids them too.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = self.offline || offline;
        self
    }

    /// Get the models directory path
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Get the path to a specific model file
    pub fn model_path(&self, model_type: ModelType) -> PathBuf {
        self.models_dir.join(model_type.filename())
    }

    /// Check if a model is present with a plausible size
    pub fn is_model_available(&self, model_type: ModelType) -> bool {
        match std::fs::metadata(self.model_path(model_type)) {
            Ok(metadata) => {
                let (min, max) = model_type.expected_size_range();
                (min..=max).contains(&metadata.len())
            }
            Err(_) => false,
        }
    }

    /// Check if every model the engine needs is available
    pub fn are_models_ready(&self) -> bool {
        ModelType::ALL.iter().all(|&m| self.is_model_available(m))
    }

    /// Get status of all models
    pub fn get_model_status(&self) -> Vec<ModelStatus> {
        ModelType::ALL
            .iter()
            .map(|&model_type| {
                let path = self.model_path(model_type);
                let size_bytes = std::fs::metadata(&path).ok().map(|m| m.len());
                ModelStatus {
                    model_type,
                    available: self.is_model_available(model_type),
                    path,
                    size_bytes,
                }
            })
            .collect()
    }

    /// Download a model if not already available.
    /// Returns the path to the model file.
    pub fn ensure_model(&self, model_type: ModelType) -> Result<PathBuf> {
        let path = self.model_path(model_type);

        if self.is_model_available(model_type) {
            debug!("Model {:?} already available at {:?}", model_type, path);
            return Ok(path);
        }

        if self.offline {
            return Err(ImprintError::ModelUnavailable {
                name: model_type.display_name(),
                path,
                reason: format!(
                    "offline mode; download it manually from {}",
                    model_type.download_url()
                ),
            }
            .into());
        }

        self.download_model(model_type)?;
        Ok(path)
    }

    /// Make sure every model is present, downloading as needed
    pub fn ensure_all_models(&self) -> Result<()> {
        for model_type in ModelType::ALL {
            self.ensure_model(model_type)?;
        }
        Ok(())
    }

    /// Download a specific model (blocking)
    fn download_model(&self, model_type: ModelType) -> Result<()> {
        let url = model_type.download_url();
        let path = self.model_path(model_type);

        info!("Downloading {} model from {}", model_type.display_name(), url);

        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let sha256 = rt.block_on(download_file(url, &path))?;

        if !self.is_model_available(model_type) {
            return Err(ImprintError::ModelUnavailable {
                name: model_type.display_name(),
                path,
                reason: "downloaded file failed size verification".to_string(),
            }
            .into());
        }

        self.record_in_manifest(model_type, sha256)?;

        info!("Downloaded {} model", model_type.display_name());
        Ok(())
    }

    fn record_in_manifest(&self, model_type: ModelType, sha256: String) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();
        let metadata = std::fs::metadata(self.model_path(model_type))?;

        let model_info = ModelInfo {
            model_type: format!("{:?}", model_type),
            filename: model_type.filename().to_string(),
            size_bytes: metadata.len(),
            sha256,
            downloaded_at: unix_timestamp(),
        };

        match manifest
            .models
            .iter_mut()
            .find(|m| m.filename == model_info.filename)
        {
            Some(existing) => *existing = model_info,
            None => manifest.models.push(model_info),
        }

        self.save_manifest(&manifest)
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join("manifest.json");
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.models_dir.join("manifest.json");
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

/// Stream `url` into `path` via a temp file, returning the SHA-256 hex digest
async fn download_file(url: &str, path: &Path) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    debug!("Download size: {:?} bytes", response.content_length());

    let temp_path = path.with_extension("tmp");
    let written = write_stream(response, &temp_path, path).await;
    discard_partial(written, &temp_path)
}

async fn write_stream(response: reqwest::Response, temp_path: &Path, path: &Path) -> Result<String> {
    let mut file = std::fs::File::create(temp_path).context("Failed to create temp file")?;

    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).context("Failed to write to temp file")?;
        hasher.update(&chunk);
    }

    file.flush().context("Failed to flush temp file")?;
    drop(file);

    std::fs::rename(temp_path, path)
        .context("Failed to move downloaded file to final location")?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Remove the temp file of a download that did not complete
fn discard_partial<T>(result: Result<T>, temp_path: &Path) -> Result<T> {
    if result.is_err() && temp_path.exists() {
        match std::fs::remove_file(temp_path) {
            Ok(()) => debug!("Removed partial download {:?}", temp_path),
            Err(e) => warn!("Failed to remove partial download {:?}: {}", temp_path, e),
        }
    }
    result
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
}

impl OnnxSession {
    /// Load a model, optionally on the GPU.
    ///
    /// With `use_gpu` the GPU execution provider must register (DirectML on
    /// Windows, CUDA elsewhere); failure to do so is an error.
    pub fn new(model_path: &Path, use_gpu: bool) -> Result<Self> {
        info!("Loading ONNX model from {:?} (gpu: {})", model_path, use_gpu);

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        let builder = if use_gpu {
            #[cfg(target_os = "windows")]
            let provider = ort::execution_providers::DirectMLExecutionProvider::default().build();
            #[cfg(not(target_os = "windows"))]
            let provider = ort::execution_providers::CUDAExecutionProvider::default().build();

            builder
                .with_execution_providers([provider.error_on_failure()])
                .context("GPU execution provider unavailable")?
        } else {
            builder
        };

        let session = builder
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

        debug!(
            "Model loaded. Inputs: {:?}",
            session.inputs.iter().map(|input| &input.name).collect::<Vec<_>>()
        );

        Ok(Self { session })
    }

    /// Get the underlying session mutably for running inference
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_filenames() {
        assert_eq!(ModelType::Detection.filename(), "det.onnx");
        assert_eq!(ModelType::Recognition.filename(), "rec.onnx");
        assert_eq!(ModelType::Dictionary.filename(), "dict.txt");
    }

    #[test]
    fn test_model_status_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();

        let status = manager.get_model_status();
        assert_eq!(status.len(), 3);
        assert!(status.iter().all(|s| !s.available && s.size_bytes.is_none()));
        assert!(!manager.are_models_ready());
    }

    #[test]
    fn test_size_check_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();

        std::fs::write(manager.model_path(ModelType::Detection), b"truncated").unwrap();
        assert!(!manager.is_model_available(ModelType::Detection));

        std::fs::write(manager.model_path(ModelType::Dictionary), "a\n".repeat(100)).unwrap();
        assert!(manager.is_model_available(ModelType::Dictionary));
    }

    #[test]
    fn test_offline_missing_model_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf())
            .unwrap()
            .offline(true);

        let err = manager.ensure_model(ModelType::Recognition).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImprintError>(),
            Some(ImprintError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        assert!(manager.load_manifest().unwrap().models.is_empty());

        std::fs::write(manager.model_path(ModelType::Dictionary), "0\n1\n").unwrap();
        manager
            .record_in_manifest(ModelType::Dictionary, "abc".to_string())
            .unwrap();
        manager
            .record_in_manifest(ModelType::Dictionary, "def".to_string())
            .unwrap();

        let manifest = manager.load_manifest().unwrap();
        assert_eq!(manifest.models.len(), 1);
        assert_eq!(manifest.models[0].sha256, "def");
        assert_eq!(manifest.models[0].size_bytes, 4);
    }

    #[test]
    fn test_failed_download_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp_path = dir.path().join("rec.tmp");
        std::fs::write(&temp_path, b"half a model").unwrap();

        let result: Result<String> = Err(anyhow::anyhow!("connection reset"));
        assert!(discard_partial(result, &temp_path).is_err());
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_successful_download_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let temp_path = dir.path().join("det.tmp");
        std::fs::write(&temp_path, b"still here").unwrap();

        let digest = discard_partial(Ok("abc".to_string()), &temp_path).unwrap();
        assert_eq!(digest, "abc");
        assert!(temp_path.exists());
    }
}
