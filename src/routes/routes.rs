//! Route wiring for the fingerprint pipeline service.
//!
//! - `POST /events`          — notification webhook, drives the pipeline
//! - `GET  /o/{bucket}/{*key}` — read a stored object (301 for aliases)
//! - `GET  /healthz`, `GET /readyz` — probes
//!
//! The wildcard `*key` allows nested keys like `raw/css/app.css`.

use crate::{
    handlers::{
        event_handlers::ingest_events,
        health_handlers::{healthz, readyz},
        object_handlers::get_object,
    },
    services::{fs_store::FsStore, pipeline::Pipeline},
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Shared state carried by every handler: the concrete backend (for the
/// read path and probes) plus the pipeline bound to it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FsStore>,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(store: Arc<FsStore>) -> Self {
        let pipeline = Pipeline::new(store.clone());
        Self { store, pipeline }
    }
}

/// Build and return the router for the service.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/events", post(ingest_events))
        .route("/o/{bucket}/{*key}", get(get_object))
}
