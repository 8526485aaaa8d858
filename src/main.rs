mod agent;
mod app;
mod chat;
mod config;
mod download;
mod handler;
mod lifecycle;
mod scroll;
mod store;
mod tui;
mod ui;
mod workspace;

use anyhow::Result;
use std::sync::Arc;

use agent::{AgentCatalog, Platform};
use app::App;
use chat::{ChatTransport, HttpChatTransport};
use config::Config;
use download::{Downloader, HttpDownloader};
use lifecycle::{Launcher, ProcessLauncher};
use store::StateStore;

/// Logging goes to a file; stdout and stderr belong to the terminal UI.
/// Level comes from AGENTHUB_LOG, default warn.
fn init_logging() -> Result<()> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("agenthub");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("agenthub.log"))?;

    let filter = tracing_subscriber::EnvFilter::try_from_env("AGENTHUB_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = Config::load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "failed to load config, using defaults");
        Config::new()
    });

    let store = Arc::new(StateStore::open(StateStore::default_path()?)?);
    let agents_dir = HttpDownloader::default_dir()?;
    let downloader: Arc<dyn Downloader> = Arc::new(HttpDownloader::new(agents_dir.clone()));
    let transport: Arc<dyn ChatTransport> = Arc::new(HttpChatTransport::new());
    let launcher: Arc<dyn Launcher> = Arc::new(ProcessLauncher);
    let platform = Platform::detect();

    // Registry fetch with the bundled catalog as fallback, so the hub
    // renders something offline
    let catalog = match &config.registry_url {
        Some(url) => {
            let client = reqwest::Client::new();
            match AgentCatalog::fetch(&client, url).await {
                Ok(catalog) => catalog,
                Err(err) => {
                    tracing::warn!(error = %err, url = %url, "registry fetch failed, using bundled catalog");
                    AgentCatalog::builtin()
                }
            }
        }
        None => AgentCatalog::builtin(),
    };

    let mut app = App::new(
        catalog,
        store,
        downloader,
        transport,
        Some(launcher),
        config,
        platform,
        agents_dir,
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event).await?;
        } else {
            break;
        }
    }

    tui::restore()?;
    Ok(())
}
