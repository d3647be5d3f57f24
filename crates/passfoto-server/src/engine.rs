//! Validation engine: a dedicated worker thread that owns the loaded model
//! sessions. HTTP handlers submit frames over a channel and await the verdict.

use image::RgbImage;
use passfoto_core::{ModelBundle, PipelineError, Thresholds, ValidationReport};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

enum EngineRequest {
    Validate {
        image: RgbImage,
        reply: oneshot::Sender<Result<ValidationReport, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Validate one frame, awaiting the worker's verdict.
    pub async fn validate(&self, image: RgbImage) -> Result<ValidationReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Validate {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads all three ONNX models synchronously before returning, so a missing
/// or broken model fails startup instead of the first request.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, PipelineError> {
    let mut models = ModelBundle::load_from_dir(&config.model_dir)?;
    tracing::info!(model_dir = %config.model_dir.display(), "validation models loaded");

    let thresholds: Thresholds = config.thresholds.clone();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("passfoto-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Validate { image, reply } => {
                        let result = passfoto_core::validate(&mut models, &image, &thresholds)
                            .map_err(EngineError::Pipeline);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}
