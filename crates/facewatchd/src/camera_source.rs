use facewatch_core::pipeline::{CaptureError, FrameSource};
use facewatch_hw::Camera;
use image::GrayImage;

/// The V4L2 camera as the live loop's frame source.
pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    pub fn new(camera: Camera) -> Self {
        Self { camera }
    }
}

impl FrameSource for CameraSource {
    fn capture(&mut self) -> Result<GrayImage, CaptureError> {
        let frame = self
            .camera
            .capture_frame()
            .map_err(|e| CaptureError::Failed(e.to_string()))?;
        tracing::trace!(seq = frame.sequence, "frame captured");
        frame
            .into_image()
            .ok_or_else(|| CaptureError::Failed("frame size does not match buffer".into()))
    }
}
