//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the frame into the 640×640 network input, decodes the
//! three anchor-free stride heads (boxes + 5 keypoints) and applies NMS.

use crate::types::{BoundingBox, Detection};
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Placement of the source frame inside the square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    /// Whole-pixel offsets; odd padding puts the extra pixel on the far side.
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let (new_w, new_h) = Self::scaled_size(width, height, scale);
        Self {
            scale,
            pad_x: (INPUT_SIZE - new_w) / 2,
            pad_y: (INPUT_SIZE - new_h) / 2,
        }
    }

    fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
        (
            ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE),
            ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE),
        )
    }

    /// Network-input coordinates back to source-frame coordinates.
    fn to_source(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Output tensor positions for one stride: (scores, boxes, keypoints).
type HeadIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    heads: [HeadIndices; 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(path = %model_path.display(), outputs = ?names, "loaded SCRFD model");

        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD needs 9 outputs (3 strides × score/bbox/kps), model has {}",
                names.len()
            )));
        }

        let heads = head_indices(&names);
        tracing::debug!(?heads, "SCRFD output mapping");

        Ok(Self { session, heads })
    }

    /// Detect faces, highest score first.
    pub fn detect(&mut self, image: &GrayImage) -> Result<Vec<Detection>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let letterbox = Letterbox::fit(width, height);
        let input = preprocess(image, &letterbox);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.heads[slot];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(score_idx, "scores")?;
            let boxes = extract(bbox_idx, "boxes")?;
            let kps = extract(kps_idx, "keypoints")?;
            candidates.extend(decode_head(scores, boxes, kps, stride, &letterbox, SCORE_THRESHOLD));
        }

        let mut kept = non_max_suppression(candidates, NMS_IOU_THRESHOLD);
        sort_by_score(&mut kept);
        Ok(kept)
    }
}

/// Letterboxed NCHW tensor; padding uses the mean so it normalizes to zero.
fn preprocess(image: &GrayImage, letterbox: &Letterbox) -> Array4<f32> {
    let (new_w, new_h) = Letterbox::scaled_size(image.width(), image.height(), letterbox.scale);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let (x0, y0) = (letterbox.pad_x as usize, letterbox.pad_y as usize);

    let side = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + x0, y as usize + y0);
        if tx >= side || ty >= side {
            continue;
        }
        let v = (pixel[0] as f32 - PIXEL_MEAN) / PIXEL_STD;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = v;
        }
    }
    tensor
}

/// Map the nine output tensors to stride heads. Named exports
/// ("score_8", "bbox_16", "kps_32", ...) are matched by name; anything else
/// falls back to the usual [scores ×3, boxes ×3, kps ×3] ordering.
fn head_indices(names: &[String]) -> [HeadIndices; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named: Option<Vec<HeadIndices>> = STRIDES
        .iter()
        .map(|&s| Some((position("score", s)?, position("bbox", s)?, position("kps", s)?)))
        .collect();

    match named {
        Some(heads) => [heads[0], heads[1], heads[2]],
        None => [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
    }
}

fn decode_head(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<Detection> {
    let grid = INPUT_SIZE as usize / stride;
    let anchors = grid * grid * ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..anchors)
        .filter(|&i| scores.get(i).is_some_and(|&s| s > threshold))
        .filter_map(|i| {
            let cell = i / ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * step;
            let cy = (cell / grid) as f32 * step;

            let b = boxes.get(i * 4..i * 4 + 4)?;
            let (x1, y1) = letterbox.to_source((cx - b[0] * step, cy - b[1] * step));
            let (x2, y2) = letterbox.to_source((cx + b[2] * step, cy + b[3] * step));

            let keypoints = kps.get(i * 10..i * 10 + 10).map(|k| {
                std::array::from_fn(|p| {
                    letterbox.to_source((cx + k[p * 2] * step, cy + k[p * 2 + 1] * step))
                })
            });

            Some(Detection {
                bbox: BoundingBox { x: x1, y: y1, width: x2 - x1, height: y2 - y1 },
                score: scores[i],
                keypoints,
            })
        })
        .collect()
}

fn sort_by_score(detections: &mut [Detection]) {
    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    sort_by_score(&mut detections);
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.iter().all(|k| iou(&k.bbox, &candidate.bbox) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}
