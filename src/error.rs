//! Error types
//!
//! Typed root causes for the failures callers may want to tell apart.
//! Public functions return `anyhow::Result`; these stay reachable through
//! `anyhow::Error::downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the imprint pipeline
#[derive(Error, Debug)]
pub enum ImprintError {
    /// The input image could not be opened or decoded
    #[error("Failed to load image {path:?}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Only right-angle rotations are supported
    #[error("Unsupported rotation angle: {0} degrees (expected 0, 90, 180 or 270)")]
    UnsupportedAngle(u32),

    /// A model file is missing and cannot be fetched
    #[error("Model {name} unavailable at {path:?}: {reason}")]
    ModelUnavailable {
        name: &'static str,
        path: PathBuf,
        reason: String,
    },

    /// The report could not be written
    #[error("Failed to write predictions to {path:?}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is unreadable or malformed
    #[error("Invalid configuration at {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },
}
