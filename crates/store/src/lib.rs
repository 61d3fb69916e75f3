//! Object-store boundary for the Cirrus client.
//!
//! Defines the session and lease traits the write path talks to, the
//! shared error taxonomy, the retry-policy seam, and an in-memory
//! backend used by tests and local development.

pub mod error;
pub mod memory;
pub mod retry;
pub mod session;
pub mod types;

pub use error::StoreError;
pub use memory::{MemoryStore, StoredObject};
pub use retry::{RetryPolicy, TransientErrorPolicy};
pub use session::{MultipartSession, ObjectStore, PartLease, SimpleSession};
pub use types::{RemoteObject, digest_hex};

/// Smallest part size real services accept for multipart uploads (5 MB).
///
/// The writer does not enforce this: the service rejects undersized parts
/// itself, and test backends deliberately accept any size.
pub const MIN_PART_SIZE: usize = 5_000_000;

/// Content type used when an upload does not specify one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Maximum number of metadata key/value pairs stored with an object.
pub const MAX_METADATA_PAIRS: usize = 10;
