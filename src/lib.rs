//! pill-imprint-ocr - imprint text extraction from pill photos
//!
//! Loads a pill image, derives sharpened and rotated permutations of it,
//! and asks an OCR engine to read each one. The texts are joined into a
//! report, one line per permutation, for matching against a pill database.
//!
//! ```no_run
//! use pill_imprint_ocr::{generate_ocr, output_predictions, ReportOptions};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut engine = generate_ocr(None, false)?;
//! let report = output_predictions(&mut engine, Path::new("pill.jpg"), &ReportOptions::default())?;
//! print!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod prediction;
pub mod report;
pub mod storage;
pub mod vision;

pub use app::{pill_imprint_prediction, ImprintReader};
pub use config::AppConfig;
pub use error::ImprintError;
pub use prediction::{
    generate_predictions, generate_predictions_from_image, image_variants, single_prediction_set,
    ImageVariant, PredictionGroup, VariantKind,
};
pub use report::{format_predictions, output_predictions, write_report, ReportOptions};
pub use vision::{generate_ocr, Detection, OcrEngine, Rotation, TextReader};
