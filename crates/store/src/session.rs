//! Session and lease traits consumed by the write path.
//!
//! These traits are the boundary between the upload pipeline and a
//! concrete storage service. They use `#[async_trait]` so they stay
//! object-safe behind `Arc<dyn ...>` shared across worker tasks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::RemoteObject;

/// Entry point to a storage service for one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Obtains a session authorizing one-shot whole-object uploads.
    ///
    /// Sessions are single-use from the caller's perspective: a failed
    /// upload discards the session and fetches a fresh one before
    /// retrying.
    async fn simple_session(&self) -> Result<Box<dyn SimpleSession>, StoreError>;

    /// Begins a multipart upload for `name`, returning the session that
    /// accepts its parts.
    async fn start_multipart(
        &self,
        name: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<Arc<dyn MultipartSession>, StoreError>;
}

/// One-shot upload session for objects below the multipart threshold.
#[async_trait]
pub trait SimpleSession: Send + Sync {
    /// Uploads the whole object in one call.
    ///
    /// `digest` is the hex SHA-256 of `payload`, verified server-side.
    async fn upload_whole(
        &self,
        payload: &[u8],
        name: &str,
        content_type: &str,
        digest: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<RemoteObject, StoreError>;
}

/// An in-progress multipart upload.
#[async_trait]
pub trait MultipartSession: Send + Sync {
    /// Obtains a short-lived lease authorizing part uploads.
    ///
    /// A lease belongs to exactly one worker and is discarded after a
    /// failed attempt; retries go through a fresh lease.
    async fn part_lease(&self) -> Result<Box<dyn PartLease>, StoreError>;

    /// Assembles all uploaded parts, in part-index order, into the final
    /// object.
    async fn finish(&self) -> Result<RemoteObject, StoreError>;
}

/// Short-lived authorization to upload parts to one endpoint.
#[async_trait]
pub trait PartLease: Send {
    /// Uploads one part to the slot keyed by `part_index` (1-based).
    ///
    /// Returns the number of bytes the service acknowledged; anything
    /// short of `payload.len()` counts as a failed attempt. Re-uploading
    /// the same index replaces the slot, which is what makes retries
    /// safe.
    async fn upload_part(
        &mut self,
        payload: &[u8],
        digest: &str,
        part_index: u32,
    ) -> Result<usize, StoreError>;
}
