//! Shared types for the object-store boundary.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Handle to a fully persisted remote object, returned once an upload
/// completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Object name (key) within the bucket.
    pub name: String,
    /// Total object size in bytes.
    pub size: u64,
    /// Content type stored with the object.
    pub content_type: String,
    /// Hex digest of the whole object, when the service reports one.
    /// Multipart assemblies may not have a whole-object digest.
    pub digest: Option<String>,
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
