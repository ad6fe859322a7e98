//! FsStore — the storage backend the pipeline runs against: object payloads
//! on local disk sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`,
//! metadata (content type, cache control, redirect target, ETag) in SQLite.
//!
//! Puts are overwrite-safe upserts and the ETag is a whole-payload MD5, so
//! the pipeline's content-derived keys and at-least-once redelivery work
//! without any extra coordination. Buckets are implicit; the first put under
//! a bucket name creates its directory.

use crate::{
    models::object::StoredObject,
    services::store::{FetchedObject, ObjectStore, PutObject, StoreError, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Clone)]
pub struct FsStore {
    /// Shared SQLite pool for metadata.
    pub db: Arc<SqlitePool>,

    /// Root directory for object payloads.
    pub base_path: PathBuf,
}

impl FsStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    /// Rejects empty/oversized keys, absolute paths, `..`, and control bytes.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Bucket names become a single directory component, so they get a
    /// stricter check than keys: no separators at all.
    fn ensure_bucket_safe(bucket: &str) -> StoreResult<()> {
        if bucket.is_empty()
            || bucket.contains('/')
            || bucket.contains("..")
            || bucket
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidBucket(bucket.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(bucket);
        path
    }

    /// Two-level shard identifiers from MD5(bucket/key), first two bytes as
    /// hex. Keeps per-directory file counts down.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.bucket_root(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Fetch the metadata row for (bucket, key).
    async fn fetch_meta(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket, key, content_type, cache_control, redirect_location,
                    size_bytes, etag, last_modified
             FROM objects WHERE bucket = ? AND key = ?",
        )
        .bind(bucket)
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            other => StoreError::Sqlx(other),
        })
    }

    /// Write the payload durably: temp file, fsync, rename into place.
    async fn write_payload(&self, file_path: &Path, body: &Bytes) -> StoreResult<()> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let mut file = File::create(&tmp_path).await?;
        let steps = async {
            file.write_all(body).await?;
            file.flush().await?;
            file.sync_all().await
        };
        if let Err(err) = steps.await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        Ok(())
    }

    /// Recursively remove empty directories up to the bucket root after a
    /// delete, stopping at the first non-empty or missing one.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<FetchedObject> {
        Self::ensure_bucket_safe(bucket)?;
        Self::ensure_key_safe(key)?;
        let meta = self.fetch_meta(bucket, key).await?;

        let file_path = self.object_path(bucket, key);
        let body = fs::read(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok(FetchedObject {
            body: Bytes::from(body),
            etag: meta.etag,
            content_type: meta.content_type,
            cache_control: meta.cache_control,
            redirect_location: meta.redirect_location,
        })
    }

    async fn put(&self, bucket: &str, object: PutObject) -> StoreResult<StoredObject> {
        Self::ensure_bucket_safe(bucket)?;
        Self::ensure_key_safe(&object.key)?;

        let file_path = self.object_path(bucket, &object.key);
        self.write_payload(&file_path, &object.body).await?;

        let etag = format!("{:x}", md5::compute(&object.body));
        let size_bytes = object.body.len() as i64;
        let last_modified = Utc::now();

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                id, bucket, key, content_type, cache_control, redirect_location,
                size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                content_type = excluded.content_type,
                cache_control = excluded.cache_control,
                redirect_location = excluded.redirect_location,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, bucket, key, content_type, cache_control, redirect_location,
                      size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket)
        .bind(&object.key)
        .bind(Some(object.content_type.clone()))
        .bind(object.cache_control.clone())
        .bind(object.redirect_location.clone())
        .bind(size_bytes)
        .bind(&etag)
        .bind(last_modified)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        Self::ensure_bucket_safe(bucket)?;
        Self::ensure_key_safe(key)?;

        let result = sqlx::query("DELETE FROM objects WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            // Already absent; redelivered notifications land here.
            return Ok(false);
        }

        let file_path = self.object_path(bucket, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(bucket);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(true)
    }
}
