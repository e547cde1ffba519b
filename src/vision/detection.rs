//! Text region detection post-processing
//!
//! Turns the probability map produced by the DBNet detection model into
//! axis-aligned text boxes in source-image coordinates.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use ndarray::ArrayView2;
use tracing::debug;

/// Configuration for box extraction
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Probability above which a map cell counts as text
    pub thresh: f32,
    /// Minimum mean probability inside a box
    pub box_thresh: f32,
    /// How far boxes are grown (area * ratio / perimeter)
    pub unclip_ratio: f32,
    /// Maximum number of contours examined
    pub max_candidates: usize,
    /// Dilate the binary mask before tracing contours
    pub use_dilation: bool,
    /// Boxes whose short side is at or under this many source pixels are dropped
    pub min_size: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            thresh: 0.3,
            box_thresh: 0.5,
            unclip_ratio: 1.6,
            max_candidates: 1000,
            use_dilation: true,
            min_size: 3.0,
        }
    }
}

/// A detected text box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Mean detection probability inside the box
    pub score: f32,
}

impl TextBox {
    /// Corner points clockwise from top-left
    pub fn polygon(&self) -> [(f32, f32); 4] {
        let (right, bottom) = (self.x + self.width, self.y + self.height);
        [
            (self.x, self.y),
            (right, self.y),
            (right, bottom),
            (self.x, bottom),
        ]
    }

    /// Integer crop rectangle (x, y, width, height), at least 1x1
    pub fn crop_rect(&self) -> (u32, u32, u32, u32) {
        (
            self.x.max(0.0) as u32,
            self.y.max(0.0) as u32,
            self.width.max(1.0).round() as u32,
            self.height.max(1.0).round() as u32,
        )
    }
}

/// Extract text boxes from a `[H, W]` probability map.
///
/// `source_dims` is the (width, height) of the image the map was computed
/// for; boxes are scaled back to it.
pub fn extract_boxes(
    prob_map: ArrayView2<f32>,
    source_dims: (u32, u32),
    config: &DetectionConfig,
) -> Vec<TextBox> {
    let (map_h, map_w) = prob_map.dim();
    if map_h == 0 || map_w == 0 {
        return vec![];
    }
    let (src_w, src_h) = source_dims;

    let mut mask = GrayImage::new(map_w as u32, map_h as u32);
    for ((y, x), &p) in prob_map.indexed_iter() {
        if p > config.thresh {
            mask.put_pixel(x as u32, y as u32, Luma([255u8]));
        }
    }

    if config.use_dilation {
        mask = dilate(&mask, Norm::LInf, 1);
    }

    let contours = find_contours::<u32>(&mask);
    let mut boxes = Vec::new();

    for contour in contours
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && !c.points.is_empty())
        .take(config.max_candidates)
    {
        let min_x = contour.points.iter().map(|p| p.x).min().unwrap_or(0) as f32;
        let max_x = contour.points.iter().map(|p| p.x).max().unwrap_or(0) as f32;
        let min_y = contour.points.iter().map(|p| p.y).min().unwrap_or(0) as f32;
        let max_y = contour.points.iter().map(|p| p.y).max().unwrap_or(0) as f32;

        if (max_x - min_x).min(max_y - min_y) < config.min_size {
            continue;
        }

        let score = box_score(&prob_map, min_x, min_y, max_x, max_y);
        if score < config.box_thresh {
            continue;
        }

        let d = unclip_distance(max_x - min_x, max_y - min_y, config.unclip_ratio);
        let scale_x = src_w as f32 / map_w as f32;
        let scale_y = src_h as f32 / map_h as f32;
        let max_src_x = src_w.saturating_sub(1) as f32;
        let max_src_y = src_h.saturating_sub(1) as f32;

        let x0 = ((min_x - d) * scale_x).clamp(0.0, max_src_x);
        let x1 = ((max_x + d) * scale_x).clamp(0.0, max_src_x);
        let y0 = ((min_y - d) * scale_y).clamp(0.0, max_src_y);
        let y1 = ((max_y + d) * scale_y).clamp(0.0, max_src_y);

        if x1 - x0 <= config.min_size || y1 - y0 <= config.min_size {
            continue;
        }

        boxes.push(TextBox {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
            score,
        });
    }

    debug!("{} contours -> {} text boxes", contours.len(), boxes.len());
    sort_reading_order(boxes)
}

/// Mean probability inside an inclusive map rectangle
fn box_score(prob_map: &ArrayView2<f32>, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> f32 {
    let (h, w) = prob_map.dim();
    let x0 = (min_x.floor() as usize).min(w - 1);
    let x1 = (max_x.ceil() as usize).min(w - 1);
    let y0 = (min_y.floor() as usize).min(h - 1);
    let y1 = (max_y.ceil() as usize).min(h - 1);

    let region = prob_map.slice(ndarray::s![y0..=y1, x0..=x1]);
    region.mean().unwrap_or(0.0)
}

/// Offset by which a `width` x `height` rectangle is pushed outwards on every side
fn unclip_distance(width: f32, height: f32, ratio: f32) -> f32 {
    let perimeter = 2.0 * (width + height);
    if perimeter <= 0.0 {
        return 0.0;
    }
    width * height * ratio / perimeter
}

/// Top-to-bottom, then left-to-right; boxes within 10px vertically share a line
fn sort_reading_order(mut boxes: Vec<TextBox>) -> Vec<TextBox> {
    boxes.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    for i in 1..boxes.len() {
        let mut j = i;
        while j > 0 && (boxes[j].y - boxes[j - 1].y).abs() < 10.0 && boxes[j].x < boxes[j - 1].x {
            boxes.swap(j, j - 1);
            j -= 1;
        }
    }

    boxes
}
