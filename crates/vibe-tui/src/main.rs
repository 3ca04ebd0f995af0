mod action;
mod app;
mod app_state;
mod component;
mod components;
mod focus;
mod theme;
mod widgets;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use vibe_client::{ApiBase, ApiClient, HttpTransport, SearchController, StageController};
use vibe_proto::config::Config;
use vibe_proto::protocol::Stage;

/// Terminal client for the vibe music pipeline: sync playlists, download
/// and embed songs, search the library by mood.
#[derive(Debug, Parser)]
#[command(name = "vibe", version)]
struct Args {
    /// API base URL, e.g. http://localhost:8000 (overrides the config file).
    #[arg(long)]
    api_base: Option<String>,

    /// Spotify authorization code to exchange on startup.
    #[arg(long)]
    code: Option<String>,

    /// Config file to read instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_path = vibe_proto::platform::log_file();
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("vibe log: {}", log_path.display());
    tracing::info!("vibe starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };
    let base_url = args.api_base.as_deref().unwrap_or(&config.api.base_url);
    let base = ApiBase::parse(base_url)?;
    tracing::info!("API base: {}", base);

    // ── Controllers ──────────────────────────────────────────────────────────
    let api = ApiClient::new(base, config.api.request_timeout())?;
    let transport = Arc::new(HttpTransport::new(
        api.http().clone(),
        config.stream.idle_timeout(),
    ));
    let sync = StageController::new(Stage::Sync, api.clone(), transport.clone());
    let download = StageController::new(Stage::Download, api.clone(), transport.clone());
    let embed = StageController::new(Stage::Embed, api.clone(), transport);
    let search = SearchController::new(api.clone(), config.search.n_results);

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let app = app::App::new(api, sync, download, embed, search, args.code);
    app.run().await?;

    tracing::info!("vibe exiting");
    Ok(())
}
