use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use deskbot_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

const READY: &str = "ready";
const DEGRADED: &str = "degraded";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub status: &'static str,
    pub detail: String,
}

impl ComponentStatus {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: READY, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: DEGRADED, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub runtime: ComponentStatus,
    pub ticket_store: ComponentStatus,
    /// `None` when the ticket store could not be queried.
    pub open_tickets: Option<i64>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.listening",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint listening"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.stopped",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint stopped unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let (ticket_store, open_tickets) = match count_open_tickets(&state.db_pool).await {
        Ok(count) => (ComponentStatus::ready("ticket_logs reachable"), Some(count)),
        Err(error) => {
            (ComponentStatus::degraded(format!("ticket_logs query failed: {error}")), None)
        }
    };
    let ready = ticket_store.status == READY;

    let report = HealthReport {
        status: if ready { READY } else { DEGRADED },
        runtime: ComponentStatus::ready("deskbot-server runtime initialized"),
        ticket_store,
        open_tickets,
        checked_at: Utc::now().to_rfc3339(),
    };

    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(report))
}

async fn count_open_tickets(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ticket_logs WHERE closed_at IS NULL")
        .fetch_one(pool)
        .await
}
