//! Error taxonomy for the object-store boundary.

/// Errors produced by object-store sessions and leases.
///
/// The type is `Clone` because the write path records the first fatal
/// error of an upload and hands the same value back to every later call
/// on that upload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network-level failure reaching the service.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service rejected the request.
    #[error("service error (status {status}): {message}")]
    Service { status: u16, message: String },

    /// The service acknowledged fewer bytes than were sent.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Server-side digest verification failed.
    #[error("digest mismatch for {0}")]
    DigestMismatch(String),

    /// The upload was cancelled after an earlier fatal error.
    #[error("upload cancelled")]
    Cancelled,

    /// Malformed object name, metadata, or part index.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The multipart session is unknown or already finished.
    #[error("no such upload session: {0}")]
    SessionNotFound(String),
}
