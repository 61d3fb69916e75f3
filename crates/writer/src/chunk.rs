//! Chunk values handed from the writer to upload workers.

/// One contiguous segment of the object stream.
///
/// Ids are 1-based and strictly increasing in flush order. The payload
/// moves to the receiving worker at hand-off; the writer never touches
/// it again.
#[derive(Debug)]
pub(crate) struct Chunk {
    /// Part index the payload is uploaded to.
    pub id: u32,
    /// Payload length in bytes.
    pub size: usize,
    /// Hex SHA-256 of the payload, sent for server-side verification.
    pub digest: String,
    /// Owned payload bytes.
    pub payload: Vec<u8>,
}
