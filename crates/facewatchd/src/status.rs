use facewatch_core::{Status, StatusSink};
use tokio::sync::watch;

/// Latest status, held in a `watch` channel.
pub struct StatusBoard {
    tx: watch::Sender<Status>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::Initialized);
        tracing::info!(status = %Status::Initialized, "status");
        Self { tx }
    }

    pub fn current(&self) -> Status {
        self.tx.borrow().clone()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for StatusBoard {
    fn publish(&self, status: Status) {
        match &status {
            Status::Error(_) => tracing::error!(%status, "status"),
            _ => tracing::info!(%status, "status"),
        }
        self.tx.send_replace(status);
    }
}
