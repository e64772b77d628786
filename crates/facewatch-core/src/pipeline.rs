//! The live detect-match-render loop, one synchronous tick at a time.
//!
//! Scheduling (timer, cancellation) lives with the caller; this type owns
//! the lifecycle state and guarantees a tick before activation does nothing.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::matcher::Matcher;
use crate::overlay::{Canvas, CanvasError};
use crate::resize::resize_observations;
use crate::types::{BoundingBox, Dimensions, MatchResult};
use image::GrayImage;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Display surface size.
pub const DISPLAY_DIMENSIONS: Dimensions = Dimensions::new(300, 300);

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame capture failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("face analysis: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("overlay: {0}")]
    Canvas(#[from] CanvasError),
}

/// Live video frames.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<GrayImage, CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    /// Models or reference set not loaded yet.
    Uninitialized,
    /// Matcher built; waiting for the next tick.
    Ready,
    /// A tick is running.
    Polling,
}

/// One face as rendered on the overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelledFace {
    pub bbox: BoundingBox,
    pub result: MatchResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TickOutcome {
    /// Not activated yet; nothing was captured or drawn.
    NotReady,
    /// Activated but no camera attached.
    NoVideo,
    Rendered(Vec<LabelledFace>),
}

pub struct LiveLoop<A, C> {
    analyzer: A,
    canvas: C,
    display: Dimensions,
    matcher: Option<Arc<dyn Matcher>>,
    source: Option<Box<dyn FrameSource>>,
    state: LoopState,
}

impl<A: FaceAnalyzer, C: Canvas> LiveLoop<A, C> {
    pub fn new(analyzer: A, canvas: C, display: Dimensions) -> Self {
        Self {
            analyzer,
            canvas,
            display,
            matcher: None,
            source: None,
            state: LoopState::Uninitialized,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// Uninitialized → Ready. Returns `true` only for the transition itself;
    /// callers start the camera in reaction to it.
    pub fn activate(&mut self, matcher: Arc<dyn Matcher>) -> bool {
        if self.state != LoopState::Uninitialized {
            tracing::warn!(state = ?self.state, "activate ignored: already active");
            return false;
        }
        self.matcher = Some(matcher);
        self.state = LoopState::Ready;
        tracing::info!("live loop ready");
        true
    }

    pub fn attach_source(&mut self, source: Box<dyn FrameSource>) {
        self.source = Some(source);
    }

    /// Capture → detect → resize → match → render.
    pub fn tick(&mut self) -> Result<TickOutcome, PipelineError> {
        let Some(matcher) = self.matcher.clone() else {
            tracing::debug!("not yet initialized");
            return Ok(TickOutcome::NotReady);
        };
        if self.source.is_none() {
            return Ok(TickOutcome::NoVideo);
        }

        self.state = LoopState::Polling;
        let result = self.poll(matcher.as_ref());
        self.state = LoopState::Ready;
        result.map(TickOutcome::Rendered)
    }

    fn poll(&mut self, matcher: &dyn Matcher) -> Result<Vec<LabelledFace>, PipelineError> {
        let frame = match self.source.as_mut() {
            Some(source) => source.capture()?,
            None => return Ok(Vec::new()),
        };
        let frame_dims = Dimensions::new(frame.width(), frame.height());

        let observations = self.analyzer.detect_all(&frame)?;
        let observations = resize_observations(observations, frame_dims, self.display);

        let faces: Vec<_> = observations
            .into_iter()
            .map(|o| {
                let result = matcher.find_best_match(&o.descriptor);
                (o, result)
            })
            .collect();

        self.canvas.clear();
        for (observation, result) in &faces {
            let bbox = &observation.detection.bbox;
            self.canvas.draw_detection(&observation.detection);
            self.canvas.draw_landmarks(&observation.landmarks);
            if let Some(expressions) = &observation.expressions {
                self.canvas.draw_expressions(bbox, expressions);
            }
            self.canvas
                .draw_labeled_box(bbox, &result.to_string(), !result.is_unknown());
        }
        self.canvas.present()?;

        tracing::trace!(faces = faces.len(), "tick rendered");
        Ok(faces
            .into_iter()
            .map(|(o, result)| LabelledFace {
                bbox: o.detection.bbox,
                result,
            })
            .collect())
    }
}
