//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that probes the metadata and content stores

use crate::{services::project_service::ProjectService, stores::StoreResult};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs each store's own health check (a `SELECT 1` for SQLite, a probe
/// file write/read/delete for disk). HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(service): State<ProjectService>) -> impl IntoResponse {
    let metadata_check = service.metadata_store().health_check().await;
    let content_check = service.content_store().health_check().await;

    let mut checks = HashMap::new();
    checks.insert("metadata", CheckStatus::from(metadata_check));
    checks.insert("content", CheckStatus::from(content_check));

    let overall_ok = checks.values().all(|check| check.ok);
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<StoreResult<()>> for CheckStatus {
    fn from(result: StoreResult<()>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(err) => {
                tracing::warn!("readiness check failed: {}", err);
                Self {
                    ok: false,
                    error: Some(format!("error: {}", err)),
                }
            }
        }
    }
}
