//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, PixelFormat};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    CaptureNotSupported,
}

/// A discovered V4L2 capture device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// An open V4L2 capture device.
pub struct Camera {
    /// Streaming starts on the first capture and stays on until a dequeue fails.
    stream: Persistent<MmapStream<'static>>,
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open `device_path` and ask for `width`×`height` YUYV.
    ///
    /// The driver may hand back another size or GREY/Y16; whatever it
    /// negotiates is what frames come out as.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::CaptureNotSupported);
        }
        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;
        let pixel_format = pixel_format_of(negotiated.fourcc)?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            stream: Persistent::default(),
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Dequeue the next frame as luma.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (format, width, height) = (self.pixel_format, self.width, self.height);
        let (device, device_path) = (&self.device, &self.device_path);
        let stream = self.stream.get_or_open(|| {
            tracing::debug!(device = %device_path, "starting capture stream");
            MmapStream::with_buffers(device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })
        })?;

        let captured = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))
            .and_then(|(buf, meta)| {
                frame::to_luma(format, buf, width, height)
                    .map(|data| (data, meta.sequence))
                    .map_err(|e| CameraError::CaptureFailed(e.to_string()))
            });

        let (data, sequence) = match captured {
            Ok(frame) => frame,
            Err(e) => {
                self.stream.reset();
                return Err(e);
            }
        };

        Ok(Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    /// Video capture devices among `/dev/video0..15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// A resource opened on first use and reused until reset.
struct Persistent<S> {
    inner: Option<S>,
}

impl<S> Default for Persistent<S> {
    fn default() -> Self {
        Self { inner: None }
    }
}

impl<S> Persistent<S> {
    fn get_or_open<E>(&mut self, open: impl FnOnce() -> Result<S, E>) -> Result<&mut S, E> {
        let inner = match self.inner.take() {
            Some(inner) => inner,
            None => open()?,
        };
        Ok(self.inner.insert(inner))
    }

    fn reset(&mut self) {
        self.inner = None;
    }
}

fn pixel_format_of(fourcc: FourCC) -> Result<PixelFormat, CameraError> {
    match &fourcc.repr {
        b"YUYV" => Ok(PixelFormat::Yuyv),
        b"GREY" => Ok(PixelFormat::Grey),
        b"Y16 " | b"Y16\0" => Ok(PixelFormat::Y16),
        _ => Err(CameraError::FormatNegotiationFailed(format!(
            "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
        ))),
    }
}
