//! Data models for the fingerprint pipeline.
//!
//! `event` holds the inbound notification shapes (S3-style event JSON),
//! `object` the stored-object metadata record persisted by the backend.

pub mod event;
pub mod object;
