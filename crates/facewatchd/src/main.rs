use anyhow::{Context, Result};
use facewatch_core::{FrameSource, ImageCanvas, StatusSink};
use facewatch_hw::Camera;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod camera_source;
mod config;
mod engine;
#[cfg(test)]
mod fakes;
mod scheduler;
mod startup;
mod status;

use camera_source::CameraSource;
use config::Config;
use engine::CameraOpener;
use status::StatusBoard;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        camera = %config.camera_device,
        models = %config.model_location,
        images = %config.image_location,
        "facewatchd starting"
    );

    let status = Arc::new(StatusBoard::new());

    let mut canvas = ImageCanvas::new(config.display);
    if let Some(path) = &config.overlay_path {
        canvas = canvas.with_output(path);
    }

    let device = config.camera_device.clone();
    let display = config.display;
    let open_camera: CameraOpener = Box::new(move || {
        let camera = Camera::open(&device, display.width, display.height)?;
        Ok(Box::new(CameraSource::new(camera)) as Box<dyn FrameSource>)
    });

    let loader = {
        let config = config.clone();
        move |status: &dyn StatusSink| startup::load(&config, status)
    };
    let engine = startup::start(status.clone(), loader, canvas, display, open_camera).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = engine.clone();
    let scheduler = tokio::spawn(scheduler::run(config.tick_period, shutdown_rx, move || {
        let engine = ticker.clone();
        async move { engine.tick().await }
    }));

    tokio::signal::ctrl_c().await?;
    tracing::info!(status = %status.current(), "facewatchd shutting down");
    let _ = shutdown_tx.send(true);
    scheduler.await.context("scheduler task panicked")?;

    Ok(())
}
