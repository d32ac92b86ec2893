/*!
 * # Health Check Module
 *
 * `GET /health` reports the service version and whether the database
 * answers a ping. An unreachable database turns the response into a 503 so
 * load balancers stop routing to the instance.
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub database: HealthStatus,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub start_time: Instant,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self {
            db_pool,
            start_time: Instant::now(),
        }
    }

    pub async fn check(&self) -> HealthInfo {
        let database = match self.db_pool.ping().await {
            Ok(()) => HealthStatus::Up,
            Err(e) => {
                error!("Database health check failed: {}", e);
                HealthStatus::Down
            }
        };

        HealthInfo {
            status: database,
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            timestamp: Utc::now(),
        }
    }
}

async fn health_handler(State(state): State<HealthState>) -> Response {
    let info = state.check().await;
    let code = match info.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(info)).into_response()
}

/// Health routes, already bound to their own state
pub fn health_routes<S>(db_pool: Arc<DatabaseConnection>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .with_state(HealthState::new(db_pool))
}
