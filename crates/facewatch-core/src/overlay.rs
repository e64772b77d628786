//! Overlay canvas: boxes, landmarks, expression and match annotations.
//!
//! [`ImageCanvas`] rasterizes shapes into an RGBA buffer and keeps text as
//! structured annotations. On `present` it can write both to disk
//! (`<path>` as PNG, annotations as JSON next to it) for a viewer to pick up.

use crate::types::{BoundingBox, Detection, Dimensions, Expressions, Landmarks};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Expressions below this probability are not drawn.
pub const EXPRESSION_MIN_PROBABILITY: f32 = 0.1;

const DETECTION_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
const LANDMARK_COLOR: Rgba<u8> = Rgba([0, 255, 255, 255]);
const KNOWN_COLOR: Rgba<u8> = Rgba([0, 200, 0, 255]);
const UNKNOWN_COLOR: Rgba<u8> = Rgba([220, 0, 0, 255]);
const LINE_WIDTH: u32 = 2;

#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("failed to write overlay {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode overlay image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to encode overlay annotations: {0}")]
    Json(#[from] serde_json::Error),
}

/// Drawing surface the live loop renders into each tick.
pub trait Canvas: Send {
    fn clear(&mut self);
    fn draw_detection(&mut self, detection: &Detection);
    fn draw_landmarks(&mut self, landmarks: &Landmarks);
    fn draw_expressions(&mut self, anchor: &BoundingBox, expressions: &Expressions);
    fn draw_labeled_box(&mut self, bbox: &BoundingBox, label: &str, known: bool);
    /// Called once per tick after all faces are drawn.
    fn present(&mut self) -> Result<(), CanvasError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Score,
    Expression,
    Label,
}

/// A piece of text anchored at a pixel position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub x: f32,
    pub y: f32,
    pub text: String,
}

pub struct ImageCanvas {
    image: RgbaImage,
    annotations: Vec<Annotation>,
    output: Option<PathBuf>,
}

impl ImageCanvas {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            image: RgbaImage::new(dims.width, dims.height),
            annotations: Vec::new(),
            output: None,
        }
    }

    /// Persist every presented frame to `path` (PNG) plus a `.json` sidecar.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn put(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    fn rect(&mut self, bbox: &BoundingBox, color: Rgba<u8>) {
        if ![bbox.x, bbox.y, bbox.width, bbox.height].iter().all(|v| v.is_finite()) {
            tracing::debug!(?bbox, "skipping non-finite box");
            return;
        }
        // Edges just outside the canvas can still paint their inner lines.
        let margin = LINE_WIDTH as i64;
        let clamp_x = |v: f32| (v.round() as i64).clamp(-margin, self.image.width() as i64 + margin);
        let clamp_y = |v: f32| (v.round() as i64).clamp(-margin, self.image.height() as i64 + margin);
        let x0 = clamp_x(bbox.x);
        let y0 = clamp_y(bbox.y);
        let x1 = clamp_x(bbox.x + bbox.width);
        let y1 = clamp_y(bbox.y + bbox.height);
        for t in 0..LINE_WIDTH as i64 {
            for x in x0..=x1 {
                self.put(x, y0 + t, color);
                self.put(x, y1 - t, color);
            }
            for y in y0..=y1 {
                self.put(x0 + t, y, color);
                self.put(x1 - t, y, color);
            }
        }
    }

    fn annotate(&mut self, kind: AnnotationKind, x: f32, y: f32, text: String) {
        self.annotations.push(Annotation { kind, x, y, text });
    }
}

impl Canvas for ImageCanvas {
    fn clear(&mut self) {
        self.image.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
        self.annotations.clear();
    }

    fn draw_detection(&mut self, detection: &Detection) {
        self.rect(&detection.bbox, DETECTION_COLOR);
        let b = detection.bbox;
        self.annotate(
            AnnotationKind::Score,
            b.x,
            b.y + b.height,
            format!("{:.2}", detection.score),
        );
    }

    fn draw_landmarks(&mut self, landmarks: &Landmarks) {
        for &(x, y) in &landmarks.points {
            let (px, py) = (x.round() as i64, y.round() as i64);
            for (dx, dy) in [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)] {
                self.put(px + dx, py + dy, LANDMARK_COLOR);
            }
        }
    }

    fn draw_expressions(&mut self, anchor: &BoundingBox, expressions: &Expressions) {
        let mut y = anchor.y + anchor.height;
        for (expression, p) in expressions.above(EXPRESSION_MIN_PROBABILITY) {
            self.annotate(
                AnnotationKind::Expression,
                anchor.x,
                y,
                format!("{} ({:.2})", expression.name(), p),
            );
            y += 12.0;
        }
    }

    fn draw_labeled_box(&mut self, bbox: &BoundingBox, label: &str, known: bool) {
        self.rect(bbox, if known { KNOWN_COLOR } else { UNKNOWN_COLOR });
        self.annotate(AnnotationKind::Label, bbox.x, bbox.y, label.to_string());
    }

    fn present(&mut self) -> Result<(), CanvasError> {
        let Some(path) = self.output.clone() else {
            return Ok(());
        };
        write_atomic(&path, |tmp| {
            self.image
                .save_with_format(tmp, image::ImageFormat::Png)
                .map_err(CanvasError::from)
        })?;
        let json = serde_json::to_vec_pretty(&self.annotations)?;
        write_atomic(&path.with_extension("json"), |tmp| {
            fs::write(tmp, &json).map_err(|source| CanvasError::Io {
                path: tmp.to_path_buf(),
                source,
            })
        })
    }
}

/// Write via a sibling temp file and rename so readers never see a partial file.
fn write_atomic(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<(), CanvasError>,
) -> Result<(), CanvasError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    write(&tmp)?;
    fs::rename(&tmp, path).map_err(|source| CanvasError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bbox() -> BoundingBox {
        BoundingBox { x: 10.0, y: 20.0, width: 50.0, height: 60.0 }
    }

    #[test]
    fn test_labeled_box_draws_outline_and_label() {
        let mut canvas = ImageCanvas::new(Dimensions::new(300, 300));
        canvas.draw_labeled_box(&bbox(), "Wendy (0.31)", true);

        assert_eq!(*canvas.image().get_pixel(10, 20), KNOWN_COLOR);
        assert_eq!(*canvas.image().get_pixel(60, 80), KNOWN_COLOR);
        // Interior untouched.
        assert_eq!(canvas.image().get_pixel(35, 50)[3], 0);
        assert_eq!(canvas.annotations()[0].text, "Wendy (0.31)");
        assert_eq!(canvas.annotations()[0].kind, AnnotationKind::Label);
    }

    #[test]
    fn test_unknown_box_uses_unknown_color() {
        let mut canvas = ImageCanvas::new(Dimensions::new(100, 100));
        canvas.draw_labeled_box(&bbox(), "unknown (0.93)", false);
        assert_eq!(*canvas.image().get_pixel(10, 20), UNKNOWN_COLOR);
    }

    #[test]
    fn test_shapes_clip_at_edges() {
        let mut canvas = ImageCanvas::new(Dimensions::new(40, 40));
        canvas.draw_labeled_box(
            &BoundingBox { x: -10.0, y: -10.0, width: 100.0, height: 100.0 },
            "x",
            true,
        );
        canvas.draw_landmarks(&Landmarks::new(vec![(-5.0, 3.0), (39.0, 39.0)]));
        assert_eq!(*canvas.image().get_pixel(39, 39), LANDMARK_COLOR);
    }

    #[test]
    fn test_huge_box_is_clipped_to_canvas() {
        let mut canvas = ImageCanvas::new(Dimensions::new(300, 300));
        let start = std::time::Instant::now();
        canvas.draw_labeled_box(
            &BoundingBox { x: -5.0, y: 10.0, width: 1e9, height: 1e9 },
            "unknown (1.20)",
            false,
        );
        assert!(start.elapsed() < std::time::Duration::from_millis(500));
        // Top edge inside the canvas is drawn; the far edges lie off-canvas.
        assert_eq!(*canvas.image().get_pixel(150, 10), UNKNOWN_COLOR);
        assert_eq!(canvas.image().get_pixel(299, 150)[3], 0);
    }

    #[test]
    fn test_infinite_box_draws_nothing() {
        let mut canvas = ImageCanvas::new(Dimensions::new(300, 300));
        canvas.draw_labeled_box(
            &BoundingBox { x: 0.0, y: 0.0, width: f32::INFINITY, height: 50.0 },
            "Seno (0.10)",
            true,
        );
        canvas.draw_detection(&Detection {
            bbox: BoundingBox { x: f32::NEG_INFINITY, y: f32::NAN, width: 1.0, height: 1.0 },
            score: 0.5,
            keypoints: None,
        });
        assert!(canvas.image().pixels().all(|p| p[3] == 0));
        // Text annotations are still kept for the viewer.
        assert_eq!(canvas.annotations().len(), 2);
    }

    #[test]
    fn test_expressions_filtered_by_probability() {
        let mut canvas = ImageCanvas::new(Dimensions::new(300, 300));
        let e = Expressions { probabilities: [0.05, 0.7, 0.2, 0.05, 0.0, 0.0, 0.0, 0.0] };
        canvas.draw_expressions(&bbox(), &e);
        let texts: Vec<_> = canvas.annotations().iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["happy (0.70)", "surprised (0.20)"]);
    }

    #[test]
    fn test_clear_resets_pixels_and_annotations() {
        let mut canvas = ImageCanvas::new(Dimensions::new(100, 100));
        canvas.draw_labeled_box(&bbox(), "Seno", true);
        canvas.clear();
        assert!(canvas.annotations().is_empty());
        assert!(canvas.image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_present_without_output_is_noop() {
        let mut canvas = ImageCanvas::new(Dimensions::new(10, 10));
        canvas.present().unwrap();
    }

    #[test]
    fn test_present_writes_png_and_sidecar() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("overlay.png");
        let mut canvas = ImageCanvas::new(Dimensions::new(300, 300)).with_output(&path);
        canvas.draw_labeled_box(&bbox(), "Adi Martha (0.12)", true);
        canvas.present().unwrap();

        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (300, 300));

        let sidecar: Vec<Annotation> =
            serde_json::from_slice(&fs::read(tmp.path().join("overlay.json")).unwrap()).unwrap();
        assert_eq!(sidecar[0].text, "Adi Martha (0.12)");
        assert!(!tmp.path().join("overlay.png.tmp").exists());
    }
}
