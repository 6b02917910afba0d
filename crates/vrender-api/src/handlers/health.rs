//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub renderer: CheckStatus,
    pub auth: CheckStatus,
    pub queue: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
        }
    }

    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Readiness probe: renderer credentials, token verification and queue headroom.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let renderer = match state.worker.ensure_credentials() {
        Ok(()) if state.worker.serve_url.is_none() => {
            CheckStatus::error("REMOTION_SERVE_URL is not configured")
        }
        Ok(()) => CheckStatus::ok(),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let auth = if state.config.jwt_secret.is_some() {
        CheckStatus::ok()
    } else {
        CheckStatus::error("SUPABASE_JWT_SECRET is not configured")
    };

    let snapshot = state.executor.queue_snapshot("").await;
    let queue = if snapshot.stats.pending >= state.queue_config.max_queue_length {
        CheckStatus::error(format!("queue full ({} waiting)", snapshot.stats.pending))
    } else {
        CheckStatus::ok()
    };

    let all_ok = renderer.is_ok() && auth.is_ok() && queue.is_ok();
    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            renderer,
            auth,
            queue,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
