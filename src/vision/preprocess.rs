//! Image preprocessing for OCR models
//!
//! Handles image resizing, normalization, and tensor conversion for PaddleOCR models.

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{s, Array3, Array4, Axis};

/// Preprocessing configuration
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Longest side allowed for the detection input
    pub det_limit_side_len: u32,
    /// Mean values for detection normalization [R, G, B]
    pub det_mean: [f32; 3],
    /// Std values for detection normalization [R, G, B]
    pub det_std: [f32; 3],
    /// Target height for recognition model
    pub rec_target_height: u32,
    /// Width the recognition input is padded to at minimum
    pub rec_base_width: u32,
    /// Mean values for recognition normalization [R, G, B]
    pub rec_mean: [f32; 3],
    /// Std values for recognition normalization [R, G, B]
    pub rec_std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            det_limit_side_len: 960,
            // DBNet was trained with ImageNet statistics
            det_mean: [0.485, 0.456, 0.406],
            det_std: [0.229, 0.224, 0.225],
            rec_target_height: 48,
            rec_base_width: 320,
            // Recognition maps [0, 255] -> [-1, 1]
            rec_mean: [0.5, 0.5, 0.5],
            rec_std: [0.5, 0.5, 0.5],
        }
    }
}

impl PreprocessConfig {
    /// Smallest width/height ratio a recognition batch is padded to
    pub fn rec_base_ratio(&self) -> f32 {
        self.rec_base_width as f32 / self.rec_target_height as f32
    }
}

/// Convert an RGB image to a normalized CHW f32 array
pub fn normalize_to_chw(image: &RgbImage, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut chw = Array3::<f32>::zeros((3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            chw[[c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }

    chw
}

/// Dimensions for the detection input: longer side capped at `limit`,
/// both sides rounded to a multiple of 32 (required by the model)
pub fn detection_dimensions(width: u32, height: u32, limit: u32) -> (u32, u32) {
    let (w, h) = (width as f32, height as f32);
    let ratio = if w.max(h) > limit as f32 {
        limit as f32 / w.max(h)
    } else {
        1.0
    };

    let round32 = |v: f32| (((v * ratio) / 32.0).round() as u32).max(1) * 32;
    (round32(w), round32(h))
}

/// Full preprocessing pipeline for detection.
/// Returns the NCHW tensor and the (width, height) it was resized to.
pub fn preprocess_for_detection(image: &RgbImage, config: &PreprocessConfig) -> (Array4<f32>, (u32, u32)) {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = detection_dimensions(width, height, config.det_limit_side_len);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let chw = normalize_to_chw(&resized, &config.det_mean, &config.det_std);

    (chw.insert_axis(Axis(0)), (new_w, new_h))
}

/// Resize a cropped text region to the recognition height and pad it on the
/// right to `padded_width` (CHW layout)
pub fn preprocess_for_recognition(
    crop: &RgbImage,
    padded_width: usize,
    config: &PreprocessConfig,
) -> Array3<f32> {
    let target_h = config.rec_target_height;
    let (w, h) = crop.dimensions();
    let ratio = w as f32 / h.max(1) as f32;

    let resized_w = ((target_h as f32 * ratio).ceil() as usize).clamp(1, padded_width.max(1));
    let resized = imageops::resize(crop, resized_w as u32, target_h, FilterType::Triangle);
    let chw = normalize_to_chw(&resized, &config.rec_mean, &config.rec_std);

    let mut padded = Array3::<f32>::zeros((3, target_h as usize, padded_width.max(resized_w)));
    padded.slice_mut(s![.., .., ..resized_w]).assign(&chw);
    padded
}

/// Stack CHW arrays of identical shape into one NCHW batch
pub fn stack_batch(items: &[Array3<f32>]) -> Array4<f32> {
    let (c, h, w) = items.first().map(|a| a.dim()).unwrap_or((3, 0, 0));
    let mut batch = Array4::<f32>::zeros((items.len(), c, h, w));

    for (i, item) in items.iter().enumerate() {
        batch.slice_mut(s![i, .., .., ..]).assign(item);
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_normalize_to_chw() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 255, 0]));

        let chw = normalize_to_chw(&image, &[0.5; 3], &[0.5; 3]);

        assert_eq!(chw.dim(), (3, 1, 2));
        assert!((chw[[0, 0, 0]] - 1.0).abs() < 1e-6); // R = 255 -> 1.0
        assert!((chw[[1, 0, 0]] + 1.0).abs() < 1e-6); // G = 0 -> -1.0
        assert!((chw[[1, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_detection_dimensions_multiple_of_32() {
        let (w, h) = detection_dimensions(500, 300, 960);
        assert_eq!(w % 32, 0);
        assert_eq!(h % 32, 0);
        assert_eq!((w, h), (512, 288));
    }

    #[test]
    fn test_detection_dimensions_capped() {
        let (w, h) = detection_dimensions(1920, 1080, 960);
        assert_eq!(w, 960);
        assert!(h <= 544);
    }

    #[test]
    fn test_detection_dimensions_tiny_image() {
        assert_eq!(detection_dimensions(5, 5, 960), (32, 32));
    }

    #[test]
    fn test_preprocess_for_detection_shape() {
        let image = RgbImage::from_pixel(100, 40, Rgb([128, 128, 128]));
        let (tensor, dims) = preprocess_for_detection(&image, &PreprocessConfig::default());

        assert_eq!(dims, (96, 32));
        assert_eq!(tensor.dim(), (1, 3, 32, 96));
    }

    #[test]
    fn test_preprocess_for_recognition_pads() {
        let config = PreprocessConfig::default();
        let crop = RgbImage::from_pixel(48, 48, Rgb([255, 255, 255]));

        let chw = preprocess_for_recognition(&crop, 320, &config);

        assert_eq!(chw.dim(), (3, 48, 320));
        assert!((chw[[0, 10, 10]] - 1.0).abs() < 1e-6);
        // Padding stays zero
        assert_eq!(chw[[0, 10, 300]], 0.0);
    }

    #[test]
    fn test_stack_batch() {
        let a = Array3::<f32>::from_elem((3, 2, 4), 1.0);
        let b = Array3::<f32>::from_elem((3, 2, 4), 2.0);

        let batch = stack_batch(&[a, b]);

        assert_eq!(batch.dim(), (2, 3, 2, 4));
        assert_eq!(batch[[1, 2, 1, 3]], 2.0);
    }
}
