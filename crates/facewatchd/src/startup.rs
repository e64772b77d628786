use crate::config::Config;
use crate::engine::{self, CameraOpener, EngineError, EngineHandle};
use anyhow::{Context, Result};
use facewatch_core::reference::{ImageAssetSource, ReferenceSetBuilder};
use facewatch_core::{
    Canvas, Dimensions, FaceAnalyzer, FaceMatcher, LiveLoop, Matcher, ModelSet, OnnxFaceAnalyzer,
    Status, StatusSink,
};
use std::sync::Arc;

/// Bring the daemon up to a running engine.
///
/// `load` runs on the blocking pool and produces the analyzer and matcher.
/// If it fails, `Status::Error` is published and the error returned. A
/// camera that will not open is published as `Status::Error` too, but the
/// engine is still returned and keeps answering ticks without video.
pub async fn start<S, A, C, L>(
    status: Arc<S>,
    load: L,
    canvas: C,
    display: Dimensions,
    open_camera: CameraOpener,
) -> Result<EngineHandle>
where
    S: StatusSink + 'static,
    A: FaceAnalyzer + 'static,
    C: Canvas + 'static,
    L: FnOnce(&dyn StatusSink) -> Result<(A, Arc<dyn Matcher>)> + Send + 'static,
{
    let loading = {
        let status = status.clone();
        tokio::task::spawn_blocking(move || load(status.as_ref()))
    };
    let (analyzer, matcher) = match loading.await.context("startup task panicked")? {
        Ok(loaded) => loaded,
        Err(e) => {
            status.publish(Status::Error(format!("{e:#}")));
            return Err(e);
        }
    };

    let live = LiveLoop::new(analyzer, canvas, display);
    let engine = engine::spawn_engine(live, open_camera)?;

    status.publish(Status::Ready);
    match engine.activate(matcher).await {
        Ok(_) => {}
        Err(EngineError::Camera(e)) => status.publish(Status::Error(e.to_string())),
        Err(e) => return Err(e.into()),
    }

    Ok(engine)
}

/// Load the models, build the reference set and the matcher.
pub fn load(config: &Config, status: &dyn StatusSink) -> Result<(OnnxFaceAnalyzer, Arc<dyn Matcher>)> {
    status.publish(Status::LoadingModels);
    let models = ModelSet::resolve(&config.model_location).context("resolving models")?;
    let mut analyzer = OnnxFaceAnalyzer::load(&models).context("loading models")?;

    let source = ImageAssetSource::new(config.image_location.clone());
    let identities = ReferenceSetBuilder::new(&config.reference, &source, status)
        .build(&mut analyzer)
        .context("building reference set")?;

    status.publish(Status::CreatingMatcher);
    let matcher = FaceMatcher::with_strategy(identities, config.match_threshold, config.match_strategy)
        .context("creating face matcher")?;

    Ok((analyzer, Arc::new(matcher)))
}
