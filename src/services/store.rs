//! Storage backend seam.
//!
//! The pipeline only ever needs three operations from its backend: fetch an
//! object with its content digest, put an object with header metadata, and
//! delete a key. Keeping them behind a trait lets tests inject an in-memory
//! backend and fault-inject individual steps.

use crate::models::object::StoredObject;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("invalid bucket name `{0}`")]
    InvalidBucket(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything a single fetch returns: payload plus the header metadata the
/// backend stored with it. `etag` is the backend-supplied content digest —
/// stable for identical payload bytes, which is what makes fingerprinted
/// keys deterministic.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub body: Bytes,
    pub etag: String,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub redirect_location: Option<String>,
}

/// A single put request. Overwrite semantics: putting an existing key
/// replaces payload and metadata in one step.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub cache_control: Option<String>,
    pub redirect_location: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full payload and metadata for (bucket, key).
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<FetchedObject>;

    /// Write (or overwrite) an object.
    async fn put(&self, bucket: &str, object: PutObject) -> StoreResult<StoredObject>;

    /// Delete a key. Returns `Ok(false)` when the key was already absent;
    /// absence is never an error so redelivered notifications can re-run
    /// the delete step as a no-op.
    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<bool>;
}
