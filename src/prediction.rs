//! Prediction generation
//!
//! Builds the permutations of a pill image and collects the text the OCR
//! engine reads from each one.

use anyhow::{Context, Result};
use image::RgbImage;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::vision::{load_image, rotate_bound, sharpen, Rotation, TextReader};

/// Filtered texts read from one image permutation
pub type PredictionGroup = Vec<String>;

/// Pixel treatment applied before rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Original,
    Sharpened,
}

/// How one permutation was derived from the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageVariant {
    pub kind: VariantKind,
    pub rotation: Rotation,
}

impl fmt::Display for ImageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            VariantKind::Original => "original",
            VariantKind::Sharpened => "sharpened",
        };
        write!(f, "{} @ {}", kind, self.rotation)
    }
}

/// Build the image permutations in report order:
/// original then sharpened, each at 0/90/180/270 degrees when `rotate` is set.
pub fn image_variants(image: &RgbImage, rotate: bool) -> Vec<(ImageVariant, RgbImage)> {
    let rotations: &[Rotation] = if rotate { &Rotation::ALL } else { &[Rotation::Deg0] };
    let sharp = sharpen(image);

    let mut variants = Vec::with_capacity(2 * rotations.len());
    for (kind, base) in [(VariantKind::Original, image), (VariantKind::Sharpened, &sharp)] {
        for &rotation in rotations {
            variants.push((ImageVariant { kind, rotation }, rotate_bound(base, rotation)));
        }
    }

    variants
}

/// Run the engine on one image and keep the text of every detection with
/// positive confidence and non-empty text
pub fn single_prediction_set<R: TextReader + ?Sized>(
    reader: &mut R,
    image: &RgbImage,
) -> Result<PredictionGroup> {
    let detections = reader.read_text(image)?;

    Ok(detections
        .into_iter()
        .filter(|d| d.confidence > 0.0 && !d.text.is_empty())
        .map(|d| d.text)
        .collect())
}

/// Generate prediction groups for an image file.
///
/// The result is never empty: an image without text yields one empty group
/// per permutation (2 without rotation, 8 with).
pub fn generate_predictions<R: TextReader + ?Sized>(
    reader: &mut R,
    image_path: &Path,
    rotate: bool,
) -> Result<Vec<PredictionGroup>> {
    let image = load_image(image_path)?;
    generate_predictions_from_image(reader, &image, rotate)
        .with_context(|| format!("Failed to read text from {:?}", image_path))
}

/// Same as [`generate_predictions`] for an already decoded image
pub fn generate_predictions_from_image<R: TextReader + ?Sized>(
    reader: &mut R,
    image: &RgbImage,
    rotate: bool,
) -> Result<Vec<PredictionGroup>> {
    let start = Instant::now();
    let variants = image_variants(image, rotate);
    let mut all_predictions = Vec::with_capacity(variants.len());

    for (variant, permuted) in &variants {
        let group = single_prediction_set(reader, permuted)?;
        debug!("{}: {} texts {:?}", variant, group.len(), group);
        all_predictions.push(group);
    }

    info!(
        "Read {} image permutations in {:?}",
        all_predictions.len(),
        start.elapsed()
    );
    Ok(all_predictions)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ImprintError;
    use crate::vision::Detection;
    use image::Rgb;

    /// Scripted engine: replays one response per call and records the
    /// dimensions of every image it was shown
    pub(crate) struct ScriptedReader {
        responses: Vec<Vec<Detection>>,
        pub seen: Vec<(u32, u32)>,
    }

    impl ScriptedReader {
        pub(crate) fn new(responses: Vec<Vec<Detection>>) -> Self {
            Self {
                responses,
                seen: Vec::new(),
            }
        }

        pub(crate) fn silent() -> Self {
            Self::new(vec![])
        }
    }

    impl TextReader for ScriptedReader {
        fn read_text(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
            let call = self.seen.len();
            self.seen.push(image.dimensions());
            Ok(self.responses.get(call).cloned().unwrap_or_default())
        }
    }

    pub(crate) fn det(text: &str, confidence: f32) -> Detection {
        Detection {
            region: [(0.0, 0.0), (10.0, 0.0), (10.0, 5.0), (0.0, 5.0)],
            text: text.to_string(),
            confidence,
        }
    }

    fn pill() -> RgbImage {
        RgbImage::from_fn(6, 4, |x, y| Rgb([(x * 40) as u8, (y * 60) as u8, 90]))
    }

    #[test]
    fn test_two_groups_without_rotation() {
        let mut reader = ScriptedReader::silent();
        let groups = generate_predictions_from_image(&mut reader, &pill(), false).unwrap();

        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.is_empty()));
    }

    #[test]
    fn test_eight_groups_with_rotation() {
        let mut reader = ScriptedReader::silent();
        let groups = generate_predictions_from_image(&mut reader, &pill(), true).unwrap();

        assert_eq!(groups.len(), 8);
        // Rotations alternate orientation in generation order
        assert_eq!(
            reader.seen,
            vec![(6, 4), (4, 6), (6, 4), (4, 6), (6, 4), (4, 6), (6, 4), (4, 6)]
        );
    }

    #[test]
    fn test_variant_order() {
        let variants = image_variants(&pill(), true);
        let labels: Vec<String> = variants.iter().map(|(v, _)| v.to_string()).collect();

        assert_eq!(labels[0], "original @ 0°");
        assert_eq!(labels[3], "original @ 270°");
        assert_eq!(labels[4], "sharpened @ 0°");
        assert_eq!(labels[7], "sharpened @ 270°");
    }

    #[test]
    fn test_sharpened_variant_differs() {
        let image = pill();
        let variants = image_variants(&image, false);

        assert_eq!(variants[0].1, image);
        assert_eq!(variants[1].1, sharpen(&image));
    }

    #[test]
    fn test_filters_zero_confidence_and_empty_text() {
        let mut reader = ScriptedReader::new(vec![vec![
            det("M", 0.93),
            det("ghost", 0.0),
            det("", 0.8),
            det("negative", -0.5),
            det("366", 0.41),
        ]]);

        let group = single_prediction_set(&mut reader, &pill()).unwrap();
        assert_eq!(group, vec!["M", "366"]);
    }

    #[test]
    fn test_groups_follow_call_order() {
        let mut reader = ScriptedReader::new(vec![vec![det("A", 0.5)], vec![det("B", 0.5)]]);
        let groups = generate_predictions_from_image(&mut reader, &pill(), false).unwrap();

        assert_eq!(groups, vec![vec!["A".to_string()], vec!["B".to_string()]]);
    }

    #[test]
    fn test_engine_error_propagates() {
        struct Failing;
        impl TextReader for Failing {
            fn read_text(&mut self, _: &RgbImage) -> Result<Vec<Detection>> {
                anyhow::bail!("inference exploded")
            }
        }

        let result = generate_predictions_from_image(&mut Failing, &pill(), false);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_image_file() {
        let mut reader = ScriptedReader::silent();
        let err = generate_predictions(&mut reader, Path::new("/nonexistent/pill.png"), false)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ImprintError>(),
            Some(ImprintError::ImageLoad { .. })
        ));
        assert!(reader.seen.is_empty());
    }

    #[test]
    fn test_generate_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pill.png");
        pill().save(&path).unwrap();

        let mut reader = ScriptedReader::new(vec![vec![det("AN", 0.7)]]);
        let groups = generate_predictions(&mut reader, &path, false).unwrap();

        assert_eq!(groups, vec![vec!["AN".to_string()], vec![]]);
    }
}
