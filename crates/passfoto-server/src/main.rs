use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod routes;

use config::Config;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        model_dir = %config.model_dir.display(),
        output_dir = %config.output_dir.display(),
        "passfotod starting"
    );

    let engine = engine::spawn_engine(&config)?;

    let state = Arc::new(AppState {
        engine,
        output_dir: config.output_dir.clone(),
    });
    let app = routes::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "passfotod listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("passfotod shutting down");
        })
        .await?;

    Ok(())
}
