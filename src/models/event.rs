//! Inbound "object created" notification batch, in the S3 event JSON shape
//! bucket-notification webhooks deliver:
//!
//! ```json
//! {"Records":[{"eventName":"ObjectCreated:Put",
//!              "s3":{"bucket":{"name":"uploads"},
//!                    "object":{"key":"css/app.css","size":1024}}}]}
//! ```
//!
//! Only the bucket name, key, and size are consumed; everything else the
//! source attaches is ignored.

use serde::Deserialize;

/// A batch of upload notifications. Delivery is at-least-once; the same
/// record may arrive again after a crash on the source side.
#[derive(Debug, Deserialize)]
pub struct UploadBatch {
    #[serde(rename = "Records")]
    pub records: Vec<UploadRecord>,
}

/// One object-creation notification.
#[derive(Debug, Deserialize)]
pub struct UploadRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: EventBucket,
    pub object: EventObject,
}

#[derive(Debug, Deserialize)]
pub struct EventBucket {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct EventObject {
    pub key: String,
    #[serde(default)]
    pub size: u64,
}
