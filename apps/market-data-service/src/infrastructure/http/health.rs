//! Health, Readiness, and Metrics Handlers
//!
//! - `GET /` - Plain-text banner
//! - `GET /health` - JSON status with feed connections and market status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (store answers)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::domain::calendar::MarketStatus;
use crate::infrastructure::feeds::FeedSnapshot;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Whether the snapshot store answered.
    pub store_reachable: bool,
    /// Market status at `current_time`.
    pub market: MarketStatus,
    /// Venue socket states.
    pub feeds: Vec<FeedSnapshot>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Store reachable and every expected socket connected.
    Healthy,
    /// Store reachable but an expected socket is down.
    Degraded,
    /// Store unreachable.
    Unhealthy,
}

// =============================================================================
// HTTP Handlers
// =============================================================================

/// `GET /`
pub async fn banner() -> &'static str {
    "Market data service is running"
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = Utc::now();
    let store_reachable = state.store.ping().await.is_ok();
    let market = state.query.calendar_status(now);
    let feeds = state.feed_snapshots();

    let status = determine_health_status(store_reachable, market.is_open, &feeds);
    let response = HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: now,
        store_reachable,
        market,
        feeds,
    };

    let status_code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

/// `GET /healthz`
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `GET /readyz`
pub async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "READY"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

/// `GET /metrics`
pub async fn metrics() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

/// Equities sockets only run while the market is open, so they count
/// toward health only then. The crypto socket always counts.
fn determine_health_status(
    store_reachable: bool,
    market_open: bool,
    feeds: &[FeedSnapshot],
) -> HealthStatus {
    if !store_reachable {
        return HealthStatus::Unhealthy;
    }

    let all_up = feeds
        .iter()
        .filter(|feed| market_open || feed.venue != "finnhub")
        .all(|feed| feed.connected);

    if all_up {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Tests
// =============================================================================
