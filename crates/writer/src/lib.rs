//! Streaming write path for the Cirrus object-storage client.
//!
//! [`ObjectWriter`] accepts an arbitrary-length byte stream and persists
//! it as a single remote object. Objects that stay under the chunk-size
//! threshold go up in one shot at close; once the stream crosses the
//! threshold, the writer switches to a multipart upload and streams
//! full chunks to a pool of concurrent upload workers.
//!
//! It is critical to check the result of
//! [`close`](ObjectWriter::close): a successful
//! [`write`](ObjectWriter::write) does not mean the object has been
//! persisted.

mod chunk;
mod fault;
mod pool;
mod writer;

pub use writer::{ObjectWriter, UploadOptions};

/// Chunk-size threshold at which an upload switches to multipart, and
/// the size of every full chunk (100 MB).
pub const DEFAULT_CHUNK_SIZE: usize = 100_000_000;
