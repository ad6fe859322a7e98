//! Liveness and readiness probes.
//!
//! `/healthz` is a constant-time liveness check. `/readyz` verifies the two
//! things the pipeline actually depends on: the metadata database answers
//! queries and the payload directory is writable.

use crate::routes::routes::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
pub struct ProbeReport {
    status: &'static str,
    sqlite: CheckStatus,
    disk: CheckStatus,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// `GET /healthz` — always 200, never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /readyz` — 200 when both checks pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = sqlite_check(&state).await;
    let disk = disk_check(&state).await;

    let overall_ok = sqlite.ok && disk.ok;
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let report = ProbeReport {
        status: if overall_ok { "ok" } else { "error" },
        sqlite,
        disk,
    };
    (status, Json(report))
}

async fn sqlite_check(state: &AppState) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.store.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    }
}

/// Best-effort write/read/delete of a temp file under the store base path.
async fn disk_check(state: &AppState) -> CheckStatus {
    let tmp_path = state
        .store
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return CheckStatus::failed(format!("could not write tmp file: {}", e));
    }
    let read_back = fs::read(&tmp_path).await;
    let _ = fs::remove_file(&tmp_path).await;
    match read_back {
        Ok(bytes) if bytes == b"readyz" => CheckStatus::ok(),
        Ok(_) => CheckStatus::failed("file content mismatch"),
        Err(e) => CheckStatus::failed(format!("could not read tmp file: {}", e)),
    }
}
