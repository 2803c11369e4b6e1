use std::path::PathBuf;

use actix_web::web;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use face_vote::config::{parse_models, PartialConfig};
use face_vote::storage::ImageStore;
use face_vote::{server, verifier, AppConfig, AppState, Backend};

#[derive(Parser, Debug)]
#[command(name = "face-vote", version, about = "Compare two face photos by model majority vote")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "FACE_VOTE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:8080.
    #[arg(long)]
    bind: Option<String>,

    /// Directory uploaded images are stored in.
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Per-file upload limit in bytes.
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    /// Minimum shorter-side size in pixels before a resolution warning.
    #[arg(long)]
    low_res_threshold: Option<u32>,

    /// Comma-separated models to vote with, in order.
    #[arg(long)]
    models: Option<String>,

    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Directory holding the ONNX model files.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Base URL of a DeepFace REST service.
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long)]
    request_timeout_secs: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Result<PartialConfig> {
        let models = self.models.as_deref().map(parse_models).transpose()?;
        Ok(PartialConfig {
            bind: self.bind.clone(),
            upload_dir: self.upload_dir.clone(),
            max_upload_bytes: self.max_upload_bytes,
            low_res_threshold: self.low_res_threshold,
            models,
            backend: self.backend,
            model_dir: self.model_dir.clone(),
            api_url: self.api_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load(cli.config.as_deref(), cli.overrides()?)?;

    let store = ImageStore::new(&config.upload_dir);
    store
        .ensure_dir()
        .context("failed to create upload directory")?;

    let verifier = verifier::build(&config).context("failed to set up verification backend")?;
    info!(
        backend = verifier.name(),
        models = ?config.models,
        upload_dir = %config.upload_dir.display(),
        "face-vote starting"
    );

    let state = web::Data::new(AppState::new(config, verifier));
    actix_rt::System::new().block_on(server::run(state))?;

    info!("face-vote shut down");
    Ok(())
}
