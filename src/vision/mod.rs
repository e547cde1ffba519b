//! Vision/OCR Layer
//!
//! Image preparation (sharpening, rotation) and text extraction.
//! The OCR engine sits behind [`TextReader`] so prediction code does not
//! depend on a particular backend.

pub mod detection;
pub mod models;
pub mod ocr;
pub mod ocr_preprocess;
pub mod preprocess;

use anyhow::Result;
use image::RgbImage;
use std::path::Path;
use tracing::info;

pub use models::{ModelManager, ModelStatus, ModelType};
pub use ocr::OcrEngine;
pub use ocr_preprocess::{load_image, rotate_bound, sharpen, Rotation};

/// A single OCR engine output unit
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Region corners in image pixels, clockwise from top-left
    pub region: [(f32, f32); 4],
    /// Recognized text
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

/// Anything that can read text out of an image buffer.
///
/// Engines are expensive to build; callers create one and pass it to every
/// prediction call.
pub trait TextReader {
    fn read_text(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

impl<R: TextReader + ?Sized> TextReader for &mut R {
    fn read_text(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        (**self).read_text(image)
    }
}

impl<R: TextReader + ?Sized> TextReader for Box<R> {
    fn read_text(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        (**self).read_text(image)
    }
}

/// Create the OCR engine used to generate text predictions.
///
/// Models are read from `model_dir`; without it the directory comes from
/// `PILL_OCR_MODULE_PATH` (preferred), `MODULE_PATH`, or the platform data
/// directory. Missing models are downloaded unless offline.
pub fn generate_ocr(model_dir: Option<&Path>, use_gpu: bool) -> Result<OcrEngine> {
    generate_ocr_with(model_dir, use_gpu, false)
}

/// [`generate_ocr`] with explicit control over downloads
pub fn generate_ocr_with(model_dir: Option<&Path>, use_gpu: bool, offline: bool) -> Result<OcrEngine> {
    let dir = crate::storage::resolve_model_dir(model_dir)?;
    info!("Initializing OCR engine (models: {:?}, gpu: {})", dir, use_gpu);

    let manager = ModelManager::with_dir(dir)?.offline(offline);
    OcrEngine::from_manager(&manager, use_gpu)
}
