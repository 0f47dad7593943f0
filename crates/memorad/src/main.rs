use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use dbus_interface::{RecognizerService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "memorad starting");

    let config = config::Config::from_env();
    let engine = engine::Engine::load(&config).context("failed to initialize engine")?;
    let service = RecognizerService::new(Arc::new(engine));

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(
        name = BUS_NAME,
        bus = if config.system_bus { "system" } else { "session" },
        "memorad ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("memorad shutting down");

    Ok(())
}
