//! Similarity transforms and warping for face crops.
//!
//! The recognizer needs faces aligned to the canonical ArcFace keypoint
//! layout; the landmark and expression networks need plain square crops.
//! Both are similarity warps of the source frame.

use image::{GrayImage, Luma};

/// ArcFace reference keypoints for a 112×112 output.
pub const ARCFACE_REFERENCE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// 4-DOF transform `(x, y) -> (a·x − b·y + tx, b·x + a·y + ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    pub const IDENTITY: Self = Self { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 };

    /// Least-squares estimate mapping `src` points onto `dst` points.
    ///
    /// Centering both point sets decouples translation from scale/rotation,
    /// which leaves a closed-form solution.
    pub fn estimate(src: &[(f32, f32)], dst: &[(f32, f32)]) -> Self {
        let n = src.len().min(dst.len());
        if n == 0 {
            return Self::IDENTITY;
        }
        let mean = |pts: &[(f32, f32)]| {
            let (sx, sy) = pts[..n]
                .iter()
                .fold((0.0f32, 0.0f32), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n as f32, sy / n as f32)
        };
        let (mpx, mpy) = mean(src);
        let (mqx, mqy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (&(px, py), &(qx, qy)) in src.iter().zip(dst.iter()).take(n) {
            let (px, py) = (px - mpx, py - mpy);
            let (qx, qy) = (qx - mqx, qy - mqy);
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
            norm += px * px + py * py;
        }
        if norm < 1e-12 {
            return Self { a: 1.0, b: 0.0, tx: mqx - mpx, ty: mqy - mpy };
        }

        let a = dot / norm;
        let b = cross / norm;
        Self {
            a,
            b,
            tx: mqx - (a * mpx - b * mpy),
            ty: mqy - (b * mpx + a * mpy),
        }
    }

    /// Axis-aligned scale + translation taking the square `(x0, y0, side)` onto `[0, out)`.
    pub fn square_crop(x0: f32, y0: f32, side: f32, out: u32) -> Self {
        let a = if side > 0.0 { out as f32 / side } else { 1.0 };
        Self { a, b: 0.0, tx: -x0 * a, ty: -y0 * a }
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// `None` when the transform is degenerate (zero scale).
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }
}

/// Bilinear sample at a sub-pixel position; outside the image reads as 0.
pub fn sample_bilinear(image: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let px = |xi: i64, yi: i64| -> f32 {
        if xi >= 0 && xi < w && yi >= 0 && yi < h {
            image.get_pixel(xi as u32, yi as u32)[0] as f32
        } else {
            0.0
        }
    };

    px(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + px(x0 + 1, y0) * fx * (1.0 - fy)
        + px(x0, y0 + 1) * (1.0 - fx) * fy
        + px(x0 + 1, y0 + 1) * fx * fy
}

/// Warp `image` into a `size`×`size` output where `transform` maps source to output coordinates.
pub fn warp(image: &GrayImage, transform: &SimilarityTransform, size: u32) -> GrayImage {
    let Some(inv) = transform.inverse() else {
        return GrayImage::new(size, size);
    };
    GrayImage::from_fn(size, size, |ox, oy| {
        let (sx, sy) = inv.apply((ox as f32, oy as f32));
        Luma([sample_bilinear(image, sx, sy).round().clamp(0.0, 255.0) as u8])
    })
}

/// Align a face to the canonical 112×112 ArcFace crop using its five keypoints.
pub fn align_face(image: &GrayImage, keypoints: &[(f32, f32); 5]) -> GrayImage {
    let transform = SimilarityTransform::estimate(keypoints, &ARCFACE_REFERENCE_112);
    warp(image, &transform, ALIGNED_SIZE)
}
