mod config;
mod models;
mod protocol;
mod routes;
mod state;
mod ws;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use visionlink_core::pipeline::frame_pipeline::FramePipeline;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Live object and face detection over WebSocket.
#[derive(Parser)]
#[command(name = "visionlink")]
struct Cli {
    /// JSON config file; omitted fields keep their defaults.
    #[arg(long, env = "VISIONLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long, env = "VISIONLINK_HOST")]
    host: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Directory searched for bundled model files.
    #[arg(long, env = "VISIONLINK_MODELS_DIR")]
    models_dir: Option<PathBuf>,

    /// Directory holding enrolled reference images.
    #[arg(long, env = "VISIONLINK_GALLERY_DIR")]
    gallery_dir: Option<PathBuf>,

    /// Object detection model file.
    #[arg(long)]
    object_model: Option<PathBuf>,

    /// Face detection model file.
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// Face embedding model file.
    #[arg(long)]
    embedding_model: Option<PathBuf>,

    /// Run identity matching every Nth frame of a session.
    #[arg(long)]
    recognition_interval: Option<u64>,

    /// Minimum cosine similarity for an identity match (0.0-1.0).
    #[arg(long)]
    match_threshold: Option<f64>,

    /// Key identities by detection position instead of tracking faces.
    #[arg(long)]
    no_tracking: bool,

    /// Disable identity recognition.
    #[arg(long)]
    no_recognition: bool,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.models_dir.is_some() {
            config.models_dir = self.models_dir;
        }
        if let Some(dir) = self.gallery_dir {
            config.gallery_dir = dir;
        }
        if self.object_model.is_some() {
            config.object_model = self.object_model;
        }
        if self.face_model.is_some() {
            config.face_model = self.face_model;
        }
        if self.embedding_model.is_some() {
            config.embedding_model = self.embedding_model;
        }
        if let Some(interval) = self.recognition_interval {
            config.recognition_interval = interval;
        }
        if let Some(threshold) = self.match_threshold {
            config.match_threshold = threshold;
        }
        if self.no_tracking {
            config.tracking = false;
        }
        if self.no_recognition {
            config.recognition = false;
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = ServerConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    // Model downloads use a blocking client, so load before the runtime exists.
    let models = models::load(&config)?;
    let pipeline = FramePipeline::new(config.pipeline_config(), models.detectors, models.recognizer);
    let state = AppState::new(Arc::new(pipeline), models.gallery);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(state, config.bind_address()))
}

async fn serve(state: AppState, address: String) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(&address).await?;
    log::info!("Listening on {address}");
    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
    }
}
