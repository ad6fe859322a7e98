//! Webhook handler for bucket notification batches.
//!
//! `POST /events` accepts S3-style event JSON and drives the fingerprint
//! pipeline synchronously. The response is always 200 with a per-record
//! report; partial failure is expected and retry policy belongs to the
//! notification source.

use crate::{
    errors::AppError,
    models::event::UploadBatch,
    routes::routes::AppState,
    services::pipeline::RecordOutcome,
};
use axum::{Json, extract::State};
use serde::Serialize;

/// Summary of one processed batch.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub received: usize,
    pub migrated: usize,
    pub ignored: usize,
    pub failed: usize,
    pub outcomes: Vec<RecordOutcome>,
}

/// `POST /events` — process one notification batch.
pub async fn ingest_events(
    State(state): State<AppState>,
    Json(batch): Json<UploadBatch>,
) -> Result<Json<BatchReport>, AppError> {
    let received = batch.records.len();
    let outcomes = state.pipeline.process_batch(batch).await;

    let mut migrated = 0;
    let mut ignored = 0;
    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            RecordOutcome::Migrated { .. } => migrated += 1,
            RecordOutcome::Ignored { .. } => ignored += 1,
            RecordOutcome::Failed { .. } => failed += 1,
        }
    }

    Ok(Json(BatchReport {
        received,
        migrated,
        ignored,
        failed,
        outcomes,
    }))
}
