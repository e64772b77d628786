//! Fixed-period tick driver.
//!
//! Each tick is awaited before the next one is taken, so ticks never
//! overlap; periods missed while a tick runs long are skipped.

use crate::engine::EngineError;
use facewatch_core::TickOutcome;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

/// Drive `tick` every `period` until `shutdown` flips or its sender is
/// dropped. Returns the number of ticks run.
pub async fn run<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TickOutcome, EngineError>>,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0u64;

    tracing::info!(period_ms = period.as_millis() as u64, "scheduler started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                ticks += 1;
                match tick().await {
                    Ok(TickOutcome::Rendered(faces)) => {
                        tracing::debug!(tick = ticks, faces = faces.len(), "tick");
                    }
                    Ok(outcome) => tracing::trace!(tick = ticks, ?outcome, "tick"),
                    Err(EngineError::ChannelClosed) => {
                        tracing::warn!("engine gone; stopping scheduler");
                        break;
                    }
                    Err(e) => tracing::warn!(tick = ticks, error = %e, "tick failed"),
                }
            }
        }
    }
    tracing::info!(ticks, "scheduler stopped");
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use facewatch_core::pipeline::{CaptureError, PipelineError};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let count = Arc::new(AtomicU64::new(0));

        let ticks = run(Duration::from_millis(5), rx, || {
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 3 {
                let _ = tx.send(true);
            }
            async { Ok(TickOutcome::NotReady) }
        })
        .await;

        assert_eq!(ticks, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_slow_ticks_never_overlap() {
        let (tx, rx) = watch::channel(false);
        let in_flight = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let count = Arc::new(AtomicU64::new(0));

        let ticks = run(Duration::from_millis(2), rx, || {
            let in_flight = in_flight.clone();
            let overlapped = overlapped.clone();
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 4 {
                let _ = tx.send(true);
            }
            async move {
                if in_flight.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                time::sleep(Duration::from_millis(10)).await;
                in_flight.store(false, Ordering::SeqCst);
                Ok(TickOutcome::NoVideo)
            }
        })
        .await;

        assert_eq!(ticks, 4);
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_tick_errors_are_swallowed() {
        let (tx, rx) = watch::channel(false);
        let count = Arc::new(AtomicU64::new(0));

        let ticks = run(Duration::from_millis(1), rx, || {
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 2 {
                let _ = tx.send(true);
            }
            async {
                Err(EngineError::Pipeline(PipelineError::Capture(CaptureError::Failed(
                    "timeout".into(),
                ))))
            }
        })
        .await;

        assert_eq!(ticks, 2);
    }

    #[tokio::test]
    async fn test_stops_when_engine_is_gone() {
        let (_tx, rx) = watch::channel(false);
        let ticks = run(Duration::from_millis(1), rx, || async {
            Err(EngineError::ChannelClosed)
        })
        .await;
        assert_eq!(ticks, 1);
    }
}
