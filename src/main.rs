use clap::Parser;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use taskboard::core::config::AppConfig;
use taskboard::core::shared::state::AppState;
use taskboard::datastore;
use taskboard::main_module::run_axum_server;
use taskboard::tasks::TemplateRenderer;

#[derive(Debug, Parser)]
#[command(name = "taskboard")]
#[command(about = "Task list web application backed by Cloud Datastore")]
struct Cli {
    /// Overrides SERVER_HOST
    #[arg(long)]
    host: Option<String>,

    /// Overrides SERVER_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let store = datastore::connect(&config.datastore)?;
    let templates = match &config.templates_dir {
        Some(dir) => TemplateRenderer::with_overrides(dir)?,
        None => TemplateRenderer::embedded()?,
    };
    let app_state = Arc::new(AppState::new(store, templates));

    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    info!("Starting taskboard {}", env!("CARGO_PKG_VERSION"));

    run_axum_server(app_state, &host, port).await?;
    info!("Server stopped");
    Ok(())
}
