//! Output formatting
//!
//! One line per image permutation, texts joined by a delimiter.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::DEFAULT_DELIMITER;
use crate::error::ImprintError;
use crate::prediction::{generate_predictions, PredictionGroup};
use crate::vision::TextReader;

/// Options for [`output_predictions`]
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// File the report is written to (overwritten)
    pub output_file: Option<PathBuf>,
    /// Also read the image at 90, 180 and 270 degrees
    pub rotate: bool,
    /// Separator between texts on one line
    pub delimiter: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            output_file: None,
            rotate: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

/// Join each group with `delimiter`; every line ends with `\n`
pub fn format_predictions(groups: &[PredictionGroup], delimiter: &str) -> String {
    groups.iter().fold(String::new(), |mut report, group| {
        report.push_str(&group.join(delimiter));
        report.push('\n');
        report
    })
}

/// Write a report to `path`, truncating any previous content.
///
/// The file receives one more trailing newline than the report itself.
pub fn write_report(report: &str, path: &Path) -> Result<()> {
    std::fs::write(path, format!("{report}\n")).map_err(|source| ImprintError::OutputWrite {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Predictions written to {:?}", path);
    Ok(())
}

/// Generate predictions for an image and format them as a report,
/// optionally writing it to `options.output_file`.
pub fn output_predictions<R: TextReader + ?Sized>(
    reader: &mut R,
    image_path: &Path,
    options: &ReportOptions,
) -> Result<String> {
    let groups = generate_predictions(reader, image_path, options.rotate)?;
    let report = format_predictions(&groups, &options.delimiter);

    if let Some(path) = &options.output_file {
        write_report(&report, path)?;
    }

    Ok(report)
}
