use facewatch_core::pipeline::{FrameSource, LiveLoop, PipelineError, TickOutcome};
use facewatch_core::{Canvas, FaceAnalyzer, Matcher};
use facewatch_hw::CameraError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Opens the camera once the loop becomes ready.
pub type CameraOpener =
    Box<dyn FnOnce() -> Result<Box<dyn FrameSource>, CameraError> + Send>;

/// Messages sent from async tasks to the engine thread.
enum EngineRequest {
    Activate {
        matcher: Arc<dyn Matcher>,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Tick {
        reply: oneshot::Sender<Result<TickOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Hand the matcher to the live loop. On the first activation the
    /// camera is opened; its failure is returned but leaves the loop ready.
    pub async fn activate(&self, matcher: Arc<dyn Matcher>) -> Result<bool, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Activate {
                matcher,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Run one live-loop tick and wait for it to finish.
    pub async fn tick(&self) -> Result<TickOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Tick { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the live loop (analyzer, canvas, frame source) and
/// serves requests one at a time until every handle is dropped.
pub fn spawn_engine<A, C>(
    mut live: LiveLoop<A, C>,
    open_camera: CameraOpener,
) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + 'static,
    C: Canvas + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let mut open_camera = Some(open_camera);

    std::thread::Builder::new()
        .name("facewatch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Activate { matcher, reply } => {
                        let result = if live.activate(matcher) {
                            attach_camera(&mut live, open_camera.take())
                        } else {
                            Ok(false)
                        };
                        let _ = reply.send(result);
                    }
                    EngineRequest::Tick { reply } => {
                        let _ = reply.send(live.tick().map_err(EngineError::from));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn attach_camera<A: FaceAnalyzer, C: Canvas>(
    live: &mut LiveLoop<A, C>,
    open_camera: Option<CameraOpener>,
) -> Result<bool, EngineError> {
    let Some(open) = open_camera else {
        return Ok(true);
    };
    let source = open()?;
    live.attach_source(source);
    tracing::info!("video started");
    Ok(true)
}
