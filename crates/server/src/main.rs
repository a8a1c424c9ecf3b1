mod bootstrap;
mod desk_service;
mod health;

use std::time::Duration;

use anyhow::Result;
use deskbot_core::config::{AppConfig, LoadOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use deskbot_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.trim().to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    match app.config.desk.guild_id.as_ref() {
        Some(guild_id) => match app.rest.register_commands(guild_id).await {
            Ok(()) => info!(
                event_name = "system.server.commands_registered",
                correlation_id = "bootstrap",
                guild_id = %guild_id,
                "guild slash commands registered"
            ),
            Err(error) => warn!(
                event_name = "system.server.commands_unregistered",
                correlation_id = "bootstrap",
                guild_id = %guild_id,
                error = %error,
                "guild slash command registration failed; /close may be unavailable"
            ),
        },
        None => warn!(
            event_name = "system.server.commands_unregistered",
            correlation_id = "bootstrap",
            "desk.guild_id not set; skipping slash command registration"
        ),
    }

    info!(event_name = "system.server.started", correlation_id = "bootstrap", "deskbot started");
    tokio::select! {
        outcome = app.runner.start() => {
            if let Err(error) = outcome {
                warn!(
                    event_name = "system.server.gateway_stopped",
                    correlation_id = "shutdown",
                    error = %error,
                    "gateway runner gave up"
                );
            }
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!(event_name = "system.server.stopping", correlation_id = "shutdown", "deskbot stopping");
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}
