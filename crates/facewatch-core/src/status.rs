//! Human-readable progress status. Informational only; never drives control flow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Initialized,
    LoadingModels,
    LoadingImages,
    CreatingMatcher,
    Ready,
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Initialized => f.write_str("Initialized"),
            Status::LoadingModels => f.write_str("Loading models"),
            Status::LoadingImages => f.write_str("Loading images"),
            Status::CreatingMatcher => f.write_str("Creating face matcher"),
            Status::Ready => f.write_str("Ready"),
            Status::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// Receiver of status updates (a UI label, a log, a channel).
pub trait StatusSink: Send + Sync {
    fn publish(&self, status: Status);
}

/// Sink that only logs.
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn publish(&self, status: Status) {
        tracing::info!(%status, "status");
    }
}

/// Sink that keeps every update, for inspection.
#[derive(Default)]
pub struct RecordingStatus {
    history: Mutex<Vec<Status>>,
}

impl RecordingStatus {
    pub fn history(&self) -> Vec<Status> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

impl StatusSink for RecordingStatus {
    fn publish(&self, status: Status) {
        if let Ok(mut h) = self.history.lock() {
            h.push(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let s = Status::Error("permission denied".into());
        assert_eq!(s.to_string(), "Error: permission denied");
    }

    #[test]
    fn test_recording_keeps_order() {
        let sink = RecordingStatus::default();
        sink.publish(Status::LoadingModels);
        sink.publish(Status::Ready);
        assert_eq!(sink.history(), vec![Status::LoadingModels, Status::Ready]);
    }
}
