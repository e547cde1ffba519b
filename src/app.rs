//! Application Coordinator
//!
//! Owns the OCR engine for the lifetime of a batch so models load once.

use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::AppConfig;
use crate::report::{output_predictions, ReportOptions};
use crate::vision::{generate_ocr_with, OcrEngine, TextReader};

/// OCR engine plus the settings used for every image it reads
pub struct ImprintReader<R> {
    reader: R,
    config: AppConfig,
}

impl ImprintReader<OcrEngine> {
    /// Build the PaddleOCR engine described by `config`
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let engine = generate_ocr_with(
            config.ocr.model_dir.as_deref(),
            config.ocr.use_gpu,
            config.ocr.offline,
        )?;
        Ok(Self::with_reader(engine, config.clone()))
    }
}

impl<R: TextReader> ImprintReader<R> {
    /// Wrap an already initialized engine
    pub fn with_reader(reader: R, config: AppConfig) -> Self {
        Self { reader, config }
    }

    /// Read one image, optionally writing the report to `output_file`
    pub fn predict(&mut self, image_path: &Path, output_file: Option<PathBuf>) -> Result<String> {
        let options = ReportOptions {
            output_file,
            rotate: self.config.prediction.rotate,
            delimiter: self.config.prediction.delimiter.clone(),
        };
        output_predictions(&mut self.reader, image_path, &options)
    }

    /// [`predict`](Self::predict), also writing the report to `out`
    pub fn predict_to<W: Write>(
        &mut self,
        image_path: &Path,
        output_file: Option<PathBuf>,
        out: &mut W,
    ) -> Result<String> {
        let report = self.predict(image_path, output_file)?;
        out.write_all(report.as_bytes())?;
        out.flush()?;
        Ok(report)
    }
}

/// Read the imprint of one pill photo with default settings and print the
/// report to stdout
pub fn pill_imprint_prediction(image_path: &Path) -> Result<String> {
    let mut reader = ImprintReader::<OcrEngine>::from_config(&AppConfig::default())?;
    debug!("Predicting imprint for {:?}", image_path);
    reader.predict_to(image_path, None, &mut std::io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::tests::{det, ScriptedReader};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_predict_uses_config() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("pill.png");
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])).save(&image).unwrap();

        let mut config = AppConfig::default();
        config.prediction.rotate = true;
        config.prediction.delimiter = "/".to_string();

        let scripted = ScriptedReader::new(vec![vec![det("5", 0.9), det("HV", 0.9)]]);
        let mut reader = ImprintReader::with_reader(scripted, config);

        let report = reader.predict(&image, None).unwrap();
        assert_eq!(report, format!("5/HV\n{}", "\n".repeat(7)));
    }

    #[test]
    fn test_reader_reused_across_images() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.png");
        let second = dir.path().join("b.png");
        RgbImage::from_pixel(4, 2, Rgb([10, 10, 10])).save(&first).unwrap();
        RgbImage::from_pixel(2, 4, Rgb([10, 10, 10])).save(&second).unwrap();

        let mut reader = ImprintReader::with_reader(ScriptedReader::silent(), AppConfig::default());
        reader.predict(&first, None).unwrap();
        reader.predict(&second, None).unwrap();

        assert_eq!(reader.reader.seen, vec![(4, 2), (4, 2), (2, 4), (2, 4)]);
    }

    #[test]
    fn test_predict_to_echoes_report() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("pill.png");
        let output = dir.path().join("out.txt");
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])).save(&image).unwrap();

        let scripted = ScriptedReader::new(vec![vec![det("L484", 0.8)]]);
        let mut reader = ImprintReader::with_reader(scripted, AppConfig::default());

        let mut printed = Vec::new();
        let report = reader
            .predict_to(&image, Some(output.clone()), &mut printed)
            .unwrap();

        assert_eq!(report, "L484\n\n");
        assert_eq!(String::from_utf8(printed).unwrap(), report);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "L484\n\n\n");
    }
}
