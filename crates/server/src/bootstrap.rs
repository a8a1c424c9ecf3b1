use std::sync::Arc;

use deskbot_core::audit::TracingAuditSink;
use deskbot_core::config::{AppConfig, ConfigError, LoadOptions};
use deskbot_core::desk::{DeskCollaborators, SupportDesk};
use deskbot_core::reminders::ReminderBoard;
use deskbot_db::{connect_with_settings, migrations, DbPool, SqlTicketStore};
use deskbot_gateway::events::desk_dispatcher;
use deskbot_gateway::rest::{RestClient, RestError};
use deskbot_gateway::socket::{GatewayRunner, ReconnectPolicy};
use deskbot_gateway::transport::WebSocketGatewayTransport;
use thiserror::Error;
use tracing::info;

use crate::desk_service::DeskService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub desk: Arc<SupportDesk>,
    pub rest: Arc<RestClient>,
    pub runner: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("platform client setup failed: {0}")]
    Rest(#[from] RestError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let rest = Arc::new(RestClient::from_config(&config.gateway)?);
    let desk = Arc::new(SupportDesk::new(
        config.desk.clone(),
        DeskCollaborators {
            store: Arc::new(SqlTicketStore::new(db_pool.clone())),
            messenger: rest.clone(),
            directory: rest.clone(),
            channels: rest.clone(),
            audit: Arc::new(TracingAuditSink),
        },
    ));
    let reminders = Arc::new(ReminderBoard::from_config(&config.reminders));
    info!(
        event_name = "system.bootstrap.desk_ready",
        correlation_id = "bootstrap",
        team_name = %config.desk.team_name,
        reminder_channels = config.reminders.channel_ids.len(),
        "support desk wired"
    );

    let service = Arc::new(DeskService::new(desk.clone(), reminders, rest.clone()));
    let runner = GatewayRunner::new(
        Arc::new(WebSocketGatewayTransport::from_config(&config.gateway)),
        desk_dispatcher(service),
        rest.clone(),
        ReconnectPolicy::default(),
    );

    Ok(Application { config, db_pool, desk, rest, runner })
}
