//! Metadata record for an object held by the storage backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One stored object, addressed by (bucket, key).
///
/// This is the metadata row only; payload bytes live on disk. Alias objects
/// written by the pipeline carry a `redirect_location` and no meaningful
/// payload of their own.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Bucket the object belongs to.
    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Cache-Control header value served with the object, if any.
    pub cache_control: Option<String>,

    /// Redirect target served instead of the payload (alias objects).
    pub redirect_location: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 content digest; doubles as the pipeline's fingerprint source.
    pub etag: String,

    /// Timestamp when the object was last written.
    pub last_modified: DateTime<Utc>,
}
