//! OCR (Optical Character Recognition) module
//!
//! Uses PaddleOCR models via ONNX Runtime for text detection and recognition.
//!
//! The pipeline has two stages:
//! 1. Detection finds text boxes in the whole image
//! 2. Recognition reads each cropped box, decoded with CTC against the
//!    character dictionary

use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use ndarray::{ArrayView2, Axis, Ix3, Ix4};
use ort::{inputs, value::TensorRef};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::detection::{extract_boxes, DetectionConfig, TextBox};
use super::models::{ModelManager, ModelType, OnnxSession};
use super::preprocess::{
    preprocess_for_detection, preprocess_for_recognition, stack_batch, PreprocessConfig,
};
use super::{Detection, TextReader};

/// Number of text crops sent through the recognition model at once
const REC_BATCH_SIZE: usize = 6;

/// OCR engine using PaddleOCR via ONNX Runtime
pub struct OcrEngine {
    det: OnnxSession,
    rec: OnnxSession,
    /// CTC label set: index 0 is the blank token
    characters: Vec<String>,
    preprocess: PreprocessConfig,
    detection: DetectionConfig,
}

impl OcrEngine {
    /// Initialize OCR engine with model paths
    pub fn new(
        detection_model: &Path,
        recognition_model: &Path,
        character_dict: &Path,
        use_gpu: bool,
    ) -> Result<Self> {
        let det = OnnxSession::new(detection_model, use_gpu)
            .context("Failed to initialize text detection")?;
        let rec = OnnxSession::new(recognition_model, use_gpu)
            .context("Failed to initialize text recognition")?;
        let characters = load_character_dict(character_dict)?;

        info!(
            "OCR engine ready ({} recognizable characters)",
            characters.len() - 1
        );

        Ok(Self {
            det,
            rec,
            characters,
            preprocess: PreprocessConfig::default(),
            detection: DetectionConfig::default(),
        })
    }

    /// Initialize from a model manager, downloading missing models first
    pub fn from_manager(manager: &ModelManager, use_gpu: bool) -> Result<Self> {
        manager.ensure_all_models()?;
        Self::new(
            &manager.model_path(ModelType::Detection),
            &manager.model_path(ModelType::Recognition),
            &manager.model_path(ModelType::Dictionary),
            use_gpu,
        )
    }

    /// Find text boxes in an image
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<TextBox>> {
        let (input, _) = preprocess_for_detection(image, &self.preprocess);
        let input_ref = TensorRef::from_array_view(&input)?;

        let prob_map = {
            let outputs = self
                .det
                .session_mut()
                .run(inputs![input_ref])
                .context("Detection inference failed")?;

            // [1, 1, H, W]
            outputs[0]
                .try_extract_array::<f32>()?
                .into_owned()
                .into_dimensionality::<Ix4>()
                .context("Unexpected detection output shape")?
        };

        let map = prob_map
            .view()
            .index_axis_move(Axis(0), 0)
            .index_axis_move(Axis(0), 0);

        Ok(extract_boxes(map, image.dimensions(), &self.detection))
    }

    /// Read the text inside each box. Results follow the order of `boxes`.
    pub fn recognize_boxes(&mut self, image: &RgbImage, boxes: &[TextBox]) -> Result<Vec<(String, f32)>> {
        let crops: Vec<RgbImage> = boxes
            .iter()
            .map(|b| {
                let (x, y, w, h) = b.crop_rect();
                imageops::crop_imm(image, x, y, w, h).to_image()
            })
            .collect();

        let ratios: Vec<f32> = crops
            .iter()
            .map(|c| c.width() as f32 / c.height().max(1) as f32)
            .collect();

        let base_ratio = self.preprocess.rec_base_ratio();
        let preprocess = &self.preprocess;
        let characters = &self.characters;
        let rec = &mut self.rec;

        batch_by_aspect_ratio(&ratios, REC_BATCH_SIZE, |chunk| {
            let max_ratio = chunk.iter().map(|&i| ratios[i]).fold(base_ratio, f32::max);
            let padded_width = (preprocess.rec_target_height as f32 * max_ratio).ceil() as usize;

            let items: Vec<_> = chunk
                .iter()
                .map(|&i| preprocess_for_recognition(&crops[i], padded_width, preprocess))
                .collect();
            let batch = stack_batch(&items);
            let input_ref = TensorRef::from_array_view(&batch)?;

            let outputs = rec
                .session_mut()
                .run(inputs![input_ref])
                .context("Recognition inference failed")?;

            // [batch, time_steps, classes]
            let output = outputs[0]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix3>()
                .context("Unexpected recognition output shape")?;

            let decoded = output
                .outer_iter()
                .map(|row| ctc_greedy_decode(row, characters))
                .collect();
            Ok(decoded)
        })
    }

    /// Full pipeline: detection followed by recognition
    pub fn recognize(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let start = Instant::now();

        let boxes = self.detect(image)?;
        if boxes.is_empty() {
            debug!("No text regions found in {:?}", start.elapsed());
            return Ok(vec![]);
        }

        let texts = self.recognize_boxes(image, &boxes)?;

        let detections: Vec<Detection> = boxes
            .iter()
            .zip(texts)
            .map(|(b, (text, confidence))| Detection {
                region: b.polygon(),
                text,
                confidence,
            })
            .collect();

        debug!(
            "OCR complete in {:?}: {} regions",
            start.elapsed(),
            detections.len()
        );
        Ok(detections)
    }
}

/// Run `read_batch` over crop indices grouped into batches of similar
/// aspect ratio, returning its results in the original crop order.
///
/// `read_batch` gets the indices of one batch and returns one result per
/// index, in the same order.
fn batch_by_aspect_ratio<F>(
    ratios: &[f32],
    batch_size: usize,
    mut read_batch: F,
) -> Result<Vec<(String, f32)>>
where
    F: FnMut(&[usize]) -> Result<Vec<(String, f32)>>,
{
    // Similar aspect ratios batch together with less padding
    let mut order: Vec<usize> = (0..ratios.len()).collect();
    order.sort_by(|&a, &b| ratios[a].total_cmp(&ratios[b]));

    let mut results = vec![(String::new(), 0.0f32); ratios.len()];

    for chunk in order.chunks(batch_size.max(1)) {
        let decoded = read_batch(chunk)?;
        if decoded.len() != chunk.len() {
            anyhow::bail!(
                "Recognition returned {} results for a batch of {}",
                decoded.len(),
                chunk.len()
            );
        }
        for (&idx, result) in chunk.iter().zip(decoded) {
            results[idx] = result;
        }
    }

    Ok(results)
}

impl TextReader for OcrEngine {
    fn read_text(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        self.recognize(image)
    }
}

/// Load the recognition label set.
///
/// Index 0 is the CTC blank, then one entry per dictionary line, then a
/// trailing space token.
pub fn load_character_dict(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open character dictionary {:?}", path))?;

    let mut characters = vec!["blank".to_string()];
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let entry = line.trim_end_matches(['\r', '\n']);
        if entry.is_empty() {
            warn!("Skipping empty dictionary line {}", lineno + 1);
            continue;
        }
        characters.push(entry.to_string());
    }
    characters.push(" ".to_string());

    Ok(characters)
}

/// Greedy CTC decoding of one `[time_steps, classes]` prediction.
///
/// Repeated labels collapse, blanks are dropped. The confidence is the mean
/// probability of the kept characters (0.0 when nothing was read).
pub fn ctc_greedy_decode(preds: ArrayView2<f32>, characters: &[String]) -> (String, f32) {
    let mut text = String::new();
    let mut probs = Vec::new();
    let mut prev = None;

    for row in preds.rows() {
        let (idx, prob) = row
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));

        if idx != 0 && prev != Some(idx) {
            if let Some(ch) = characters.get(idx) {
                text.push_str(ch);
                probs.push(prob);
            }
        }
        prev = Some(idx);
    }

    let confidence = if probs.is_empty() {
        0.0
    } else {
        probs.iter().sum::<f32>() / probs.len() as f32
    };

    (text, confidence)
}
