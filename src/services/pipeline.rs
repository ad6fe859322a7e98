//! The fingerprint pipeline: turn "object just uploaded at key K" into
//! "fingerprinted copy + raw alias exist, original is gone".
//!
//! Per eligible record the steps run strictly in order:
//! fetch → write `fp/{digest}.{ext}` → write `raw/{key}` alias → delete
//! original. Both writes must succeed before the delete so a crash in the
//! middle never leaves the original removed without a durable replacement.
//! Keys under the reserved `fp`/`raw` prefixes are the pipeline's own
//! output and are dropped before any backend call; that filter is the sole
//! guard against the pipeline re-triggering itself.

use crate::{
    models::event::UploadBatch,
    services::{
        policy,
        store::{ObjectStore, PutObject, StoreError},
    },
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Key prefixes owned by the pipeline. Anything under them is output,
/// never input.
pub const RESERVED_PREFIXES: [&str; 2] = ["fp", "raw"];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetching original object: {0}")]
    Fetch(#[source] StoreError),
    #[error("writing fingerprinted object: {0}")]
    FingerprintWrite(#[source] StoreError),
    #[error("writing raw alias: {0}")]
    AliasWrite(#[source] StoreError),
    #[error("deleting original object: {0}")]
    Delete(#[source] StoreError),
}

impl PipelineError {
    pub fn stage(&self) -> FailureStage {
        match self {
            PipelineError::Fetch(_) => FailureStage::Fetch,
            PipelineError::FingerprintWrite(_) => FailureStage::FingerprintWrite,
            PipelineError::AliasWrite(_) => FailureStage::AliasWrite,
            PipelineError::Delete(_) => FailureStage::Delete,
        }
    }
}

/// Which step of a record's migration failed. A `Delete` failure is the
/// only one that leaves both derived objects in place; the others abort
/// before the original is touched.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    FingerprintWrite,
    AliasWrite,
    Delete,
}

/// Outcome of one notification record, reported back to the caller.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Key starts with a reserved prefix; dropped without backend calls.
    Ignored { key: String },
    /// Both derived objects written and the original removed (or already
    /// absent on a redelivery).
    Migrated {
        key: String,
        fingerprinted_key: String,
        alias_key: String,
    },
    Failed {
        key: String,
        stage: FailureStage,
        error: String,
    },
}

/// The pipeline itself. Holds nothing but a handle to the storage backend;
/// all state lives in the backend's key namespace.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// True when the key is pipeline output. Plain prefix match on the raw
    /// key, same as the source of these notifications applies its own
    /// prefix filters.
    pub fn is_reserved(key: &str) -> bool {
        RESERVED_PREFIXES.iter().any(|p| key.starts_with(p))
    }

    /// Process one notification batch sequentially, in delivery order. A
    /// failing record is reported in its outcome and never stops the rest
    /// of the batch.
    pub async fn process_batch(&self, batch: UploadBatch) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(batch.records.len());
        for record in batch.records {
            let bucket = record.s3.bucket.name;
            let key = record.s3.object.key;
            debug!(
                bucket,
                key,
                event = record.event_name,
                size = record.s3.object.size,
                "received upload notification"
            );

            if Self::is_reserved(&key) {
                info!(bucket, key, "ignoring pipeline output key");
                outcomes.push(RecordOutcome::Ignored { key });
                continue;
            }

            match self.migrate(&bucket, &key).await {
                Ok((fingerprinted_key, alias_key)) => {
                    outcomes.push(RecordOutcome::Migrated {
                        key,
                        fingerprinted_key,
                        alias_key,
                    });
                }
                Err(err) => {
                    warn!(bucket, key, error = %err, "record failed");
                    outcomes.push(RecordOutcome::Failed {
                        key,
                        stage: err.stage(),
                        error: err.to_string(),
                    });
                }
            }
        }
        outcomes
    }

    /// Migrate one original object into its (fingerprinted, alias) pair and
    /// remove it. Returns the two derived keys.
    async fn migrate(&self, bucket: &str, key: &str) -> Result<(String, String), PipelineError> {
        let fetched = self
            .store
            .fetch(bucket, key)
            .await
            .map_err(PipelineError::Fetch)?;

        // The extension and both headers derive from the original key, not
        // the fingerprinted one, so the naming scheme can change without
        // changing classification.
        let ext = policy::extension(key);
        let fingerprinted_key = format!("fp/{}.{}", fetched.etag, ext);
        let content_type = policy::content_type_for_key(key);
        let cache_control = policy::cache_control_for(content_type);

        info!(bucket, key, fingerprinted_key, "writing fingerprinted object");
        self.store
            .put(
                bucket,
                PutObject {
                    key: fingerprinted_key.clone(),
                    body: fetched.body.clone(),
                    content_type: content_type.to_string(),
                    cache_control: Some(cache_control.to_string()),
                    redirect_location: None,
                },
            )
            .await
            .map_err(PipelineError::FingerprintWrite)?;

        // No cache-control on the alias: it must be re-resolved on every
        // request so the redirect target can move when content changes.
        let alias_key = format!("raw/{key}");
        let redirect = format!("/{fingerprinted_key}");
        info!(bucket, key, alias_key, redirect, "writing raw alias");
        self.store
            .put(
                bucket,
                PutObject {
                    key: alias_key.clone(),
                    body: fetched.body,
                    content_type: content_type.to_string(),
                    cache_control: None,
                    redirect_location: Some(redirect),
                },
            )
            .await
            .map_err(PipelineError::AliasWrite)?;

        let removed = self
            .store
            .delete(bucket, key)
            .await
            .map_err(PipelineError::Delete)?;
        if removed {
            info!(bucket, key, "removed original object");
        } else {
            info!(bucket, key, "original object already absent");
        }

        Ok((fingerprinted_key, alias_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EventBucket, EventObject, S3Entity, UploadRecord};
    use crate::models::object::StoredObject;
    use crate::services::store::{FetchedObject, StoreResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::io;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use uuid::Uuid;

    #[derive(Clone)]
    struct MockRecord {
        body: Bytes,
        etag: String,
        content_type: Option<String>,
        cache_control: Option<String>,
        redirect_location: Option<String>,
    }

    /// In-memory backend with per-step fault injection and call counting.
    #[derive(Default)]
    struct MockStore {
        objects: Mutex<HashMap<String, MockRecord>>,
        calls: AtomicUsize,
        delete_calls: AtomicUsize,
        fail_put_prefix: Mutex<Option<String>>,
        fail_delete: Mutex<bool>,
    }

    impl MockStore {
        fn seed(&self, bucket: &str, key: &str, body: &[u8], etag: &str) {
            self.objects.lock().unwrap().insert(
                format!("{bucket}/{key}"),
                MockRecord {
                    body: Bytes::copy_from_slice(body),
                    etag: etag.to_string(),
                    content_type: None,
                    cache_control: None,
                    redirect_location: None,
                },
            );
        }

        fn get(&self, bucket: &str, key: &str) -> Option<MockRecord> {
            self.objects
                .lock()
                .unwrap()
                .get(&format!("{bucket}/{key}"))
                .cloned()
        }

        fn fail_puts_under(&self, prefix: &str) {
            *self.fail_put_prefix.lock().unwrap() = Some(prefix.to_string());
        }
    }

    #[async_trait]
    impl ObjectStore for MockStore {
        async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<FetchedObject> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let record = self.get(bucket, key).ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
            Ok(FetchedObject {
                body: record.body,
                etag: record.etag,
                content_type: record.content_type,
                cache_control: record.cache_control,
                redirect_location: record.redirect_location,
            })
        }

        async fn put(&self, bucket: &str, object: PutObject) -> StoreResult<StoredObject> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(prefix) = self.fail_put_prefix.lock().unwrap().as_deref() {
                if object.key.starts_with(prefix) {
                    return Err(StoreError::Io(io::Error::other("injected put failure")));
                }
            }
            let etag = format!("{:x}", md5::compute(&object.body));
            let size_bytes = object.body.len() as i64;
            self.objects.lock().unwrap().insert(
                format!("{bucket}/{}", object.key),
                MockRecord {
                    body: object.body,
                    etag: etag.clone(),
                    content_type: Some(object.content_type.clone()),
                    cache_control: object.cache_control.clone(),
                    redirect_location: object.redirect_location.clone(),
                },
            );
            Ok(StoredObject {
                id: Uuid::new_v4(),
                bucket: bucket.to_string(),
                key: object.key,
                content_type: Some(object.content_type),
                cache_control: object.cache_control,
                redirect_location: object.redirect_location,
                size_bytes,
                etag,
                last_modified: Utc::now(),
            })
        }

        async fn delete(&self, bucket: &str, key: &str) -> StoreResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail_delete.lock().unwrap() {
                return Err(StoreError::Io(io::Error::other("injected delete failure")));
            }
            Ok(self
                .objects
                .lock()
                .unwrap()
                .remove(&format!("{bucket}/{key}"))
                .is_some())
        }
    }

    fn record(bucket: &str, key: &str) -> UploadRecord {
        UploadRecord {
            event_name: "ObjectCreated:Put".to_string(),
            s3: S3Entity {
                bucket: EventBucket {
                    name: bucket.to_string(),
                },
                object: EventObject {
                    key: key.to_string(),
                    size: 0,
                },
            },
        }
    }

    fn batch(records: Vec<UploadRecord>) -> UploadBatch {
        UploadBatch { records }
    }

    #[tokio::test]
    async fn reserved_prefixes_are_dropped_without_backend_calls() {
        let store = Arc::new(MockStore::default());
        let pipeline = Pipeline::new(store.clone());

        let outcomes = pipeline
            .process_batch(batch(vec![
                record("uploads", "fp/abc123.css"),
                record("uploads", "raw/css/app.css"),
            ]))
            .await;

        assert!(matches!(outcomes[0], RecordOutcome::Ignored { .. }));
        assert!(matches!(outcomes[1], RecordOutcome::Ignored { .. }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn migrates_an_upload_into_fingerprint_and_alias() {
        let store = Arc::new(MockStore::default());
        store.seed("uploads", "css/app.a1b2.css", b"body { color: red }", "abc123");
        let pipeline = Pipeline::new(store.clone());

        let outcomes = pipeline
            .process_batch(batch(vec![record("uploads", "css/app.a1b2.css")]))
            .await;

        match &outcomes[0] {
            RecordOutcome::Migrated {
                fingerprinted_key,
                alias_key,
                ..
            } => {
                assert_eq!(fingerprinted_key, "fp/abc123.css");
                assert_eq!(alias_key, "raw/css/app.a1b2.css");
            }
            other => panic!("expected Migrated, got {other:?}"),
        }

        let fp = store.get("uploads", "fp/abc123.css").unwrap();
        assert_eq!(&fp.body[..], b"body { color: red }");
        assert_eq!(fp.content_type.as_deref(), Some("text/css"));
        assert_eq!(fp.cache_control.as_deref(), Some(policy::LONG_LIVED));
        assert!(fp.redirect_location.is_none());

        let alias = store.get("uploads", "raw/css/app.a1b2.css").unwrap();
        assert_eq!(alias.redirect_location.as_deref(), Some("/fp/abc123.css"));
        assert!(alias.cache_control.is_none());

        assert!(store.get("uploads", "css/app.a1b2.css").is_none());
    }

    #[tokio::test]
    async fn html_uploads_get_the_no_cache_directive() {
        let store = Arc::new(MockStore::default());
        store.seed("uploads", "index.html", b"<html></html>", "feed00");
        let pipeline = Pipeline::new(store.clone());

        pipeline
            .process_batch(batch(vec![record("uploads", "index.html")]))
            .await;

        let fp = store.get("uploads", "fp/feed00.html").unwrap();
        assert_eq!(fp.cache_control.as_deref(), Some(policy::NO_CACHE));
    }

    #[tokio::test]
    async fn redelivery_reproduces_identical_derived_objects() {
        let store = Arc::new(MockStore::default());
        store.seed("uploads", "app.js", b"console.log(1)", "d1g3st");
        let pipeline = Pipeline::new(store.clone());

        pipeline
            .process_batch(batch(vec![record("uploads", "app.js")]))
            .await;
        let first_fp = store.get("uploads", "fp/d1g3st.js").unwrap();
        let first_alias = store.get("uploads", "raw/app.js").unwrap();

        // Same bytes show up again under the original key (crash before the
        // delete was acknowledged, then redelivery).
        store.seed("uploads", "app.js", b"console.log(1)", "d1g3st");
        let outcomes = pipeline
            .process_batch(batch(vec![record("uploads", "app.js")]))
            .await;

        assert!(matches!(outcomes[0], RecordOutcome::Migrated { .. }));
        let second_fp = store.get("uploads", "fp/d1g3st.js").unwrap();
        let second_alias = store.get("uploads", "raw/app.js").unwrap();
        assert_eq!(first_fp.body, second_fp.body);
        assert_eq!(
            first_alias.redirect_location,
            second_alias.redirect_location
        );
    }

    #[tokio::test]
    async fn fingerprint_write_failure_leaves_the_original_untouched() {
        let store = Arc::new(MockStore::default());
        store.seed("uploads", "logo.png", b"\x89PNG", "0ff1ce");
        store.fail_puts_under("fp/");
        let pipeline = Pipeline::new(store.clone());

        let outcomes = pipeline
            .process_batch(batch(vec![record("uploads", "logo.png")]))
            .await;

        match &outcomes[0] {
            RecordOutcome::Failed { stage, .. } => {
                assert_eq!(*stage, FailureStage::FingerprintWrite);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(store.get("uploads", "logo.png").is_some());
        assert_eq!(store.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delete_failure_keeps_both_derived_objects() {
        let store = Arc::new(MockStore::default());
        store.seed("uploads", "logo.png", b"\x89PNG", "0ff1ce");
        *store.fail_delete.lock().unwrap() = true;
        let pipeline = Pipeline::new(store.clone());

        let outcomes = pipeline
            .process_batch(batch(vec![record("uploads", "logo.png")]))
            .await;

        match &outcomes[0] {
            RecordOutcome::Failed { stage, .. } => assert_eq!(*stage, FailureStage::Delete),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(store.get("uploads", "fp/0ff1ce.png").is_some());
        let alias = store.get("uploads", "raw/logo.png").unwrap();
        assert_eq!(alias.redirect_location.as_deref(), Some("/fp/0ff1ce.png"));
        // Delete attempted exactly once; no in-invocation retry.
        assert_eq!(store.delete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_failing_record_does_not_stop_the_batch() {
        let store = Arc::new(MockStore::default());
        store.seed("uploads", "good.css", b"ok", "900d");
        let pipeline = Pipeline::new(store.clone());

        // "missing.css" was never uploaded, so its fetch fails first.
        let outcomes = pipeline
            .process_batch(batch(vec![
                record("uploads", "missing.css"),
                record("uploads", "good.css"),
            ]))
            .await;

        match &outcomes[0] {
            RecordOutcome::Failed { stage, .. } => assert_eq!(*stage, FailureStage::Fetch),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(matches!(outcomes[1], RecordOutcome::Migrated { .. }));
        assert!(store.get("uploads", "fp/900d.css").is_some());
    }
}
