//! The streaming object writer: segmentation, dispatch, and close.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use cirrus_store::{
    DEFAULT_CONTENT_TYPE, ObjectStore, RemoteObject, RetryPolicy, StoreError, TransientErrorPolicy,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::DEFAULT_CHUNK_SIZE;
use crate::chunk::Chunk;
use crate::fault::ErrorState;
use crate::pool::WorkerPool;

/// Tuning knobs for one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Number of concurrent part-upload workers once an object goes
    /// multipart. Values below 1 are treated as 1.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Content type stored with the object.
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Up to ten key/value pairs stored with the object.
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Threshold at which the upload switches to multipart, and the
    /// size of every full chunk. Real services reject parts below
    /// [`cirrus_store::MIN_PART_SIZE`]; the writer leaves enforcement to
    /// the service so test backends can use small thresholds.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum retry attempts per upload call. `None` keeps retrying
    /// for as long as the policy classifies failures as retriable.
    #[serde(default)]
    pub retry_limit: Option<u32>,
}

fn default_concurrency() -> usize {
    1
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            content_type: default_content_type(),
            metadata: HashMap::new(),
            chunk_size: default_chunk_size(),
            retry_limit: None,
        }
    }
}

/// Streams one logical object into the store.
///
/// Bytes are buffered up to the chunk-size threshold. An object that
/// never crosses it is persisted with a single one-shot upload at
/// close; once the first full chunk is cut, the writer starts a
/// multipart session and streams chunks to a pool of concurrent
/// workers.
///
/// Only [`close`](Self::close) is authoritative: a successful
/// [`write`](Self::write) does not mean the object has been persisted.
/// Dropping the writer without closing abandons the upload.
pub struct ObjectWriter {
    store: Arc<dyn ObjectStore>,
    retry: Arc<dyn RetryPolicy>,
    name: String,
    opts: UploadOptions,

    buf: Vec<u8>,
    hasher: Sha256,
    next_id: u32,
    pool: Option<WorkerPool>,
    fault: ErrorState,
    outcome: Option<Result<RemoteObject, StoreError>>,
}

impl ObjectWriter {
    /// Creates a writer for the object `name` with the default retry
    /// policy.
    pub fn new(store: Arc<dyn ObjectStore>, name: impl Into<String>, opts: UploadOptions) -> Self {
        Self::with_retry_policy(store, name, opts, Arc::new(TransientErrorPolicy))
    }

    /// Creates a writer with an externally supplied retry policy.
    pub fn with_retry_policy(
        store: Arc<dyn ObjectStore>,
        name: impl Into<String>,
        mut opts: UploadOptions,
        retry: Arc<dyn RetryPolicy>,
    ) -> Self {
        opts.concurrency = opts.concurrency.max(1);
        if opts.chunk_size == 0 {
            opts.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        Self {
            store,
            retry,
            name: name.into(),
            opts,
            buf: Vec::new(),
            hasher: Sha256::new(),
            next_id: 1,
            pool: None,
            fault: ErrorState::new(),
            outcome: None,
        }
    }

    /// Effective options for this upload.
    pub fn options(&self) -> &UploadOptions {
        &self.opts
    }

    /// Remote handle stored by a successful close.
    pub fn remote(&self) -> Option<&RemoteObject> {
        match &self.outcome {
            Some(Ok(obj)) => Some(obj),
            _ => None,
        }
    }

    /// Appends `data` to the object, cutting and dispatching full
    /// chunks whenever the buffer reaches the chunk-size threshold. A
    /// single oversized write produces as many chunks as it spans.
    ///
    /// Returns the number of bytes accepted, following the
    /// `std::io::Write` convention: bytes buffered before a failure are
    /// reported as accepted, and the recorded error surfaces on the
    /// next call and on [`close`](Self::close).
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, StoreError> {
        if let Some(err) = self.fault.get() {
            return Err(err);
        }
        if self.outcome.is_some() {
            return Err(StoreError::InvalidArgument("write after close".into()));
        }

        let mut accepted = 0;
        let mut rest = data;
        loop {
            let left = self.opts.chunk_size - self.buf.len();
            if rest.len() < left {
                self.hasher.update(rest);
                self.buf.extend_from_slice(rest);
                accepted += rest.len();
                return Ok(accepted);
            }
            let (fill, tail) = rest.split_at(left);
            self.hasher.update(fill);
            self.buf.extend_from_slice(fill);
            accepted += fill.len();
            if let Err(err) = self.flush_chunk().await {
                self.fault.record(err.clone());
                if accepted > 0 {
                    return Ok(accepted);
                }
                return Err(self.fault.get().unwrap_or(err));
            }
            rest = tail;
        }
    }

    /// Flushes any trailing bytes and finalizes the upload, returning
    /// the remote handle.
    ///
    /// Idempotent: repeated calls return the first outcome without
    /// issuing further remote calls. This result is authoritative for
    /// the whole upload.
    pub async fn close(&mut self) -> Result<RemoteObject, StoreError> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let result = match self.finalize().await {
            Ok(obj) => match self.fault.get() {
                Some(err) => Err(err),
                None => {
                    info!(object = %obj.name, size = obj.size, "upload finished");
                    Ok(obj)
                }
            },
            Err(err) => {
                self.fault.record(err.clone());
                Err(self.fault.get().unwrap_or(err))
            }
        };
        self.outcome = Some(result.clone());
        result
    }

    async fn finalize(&mut self) -> Result<RemoteObject, StoreError> {
        if self.pool.is_none() {
            // No chunk was ever cut: the whole object is in the buffer.
            if let Some(err) = self.fault.get() {
                return Err(err);
            }
            return self.simple_upload().await;
        }

        // Trailing bytes become the final, short chunk.
        let mut flush_err = None;
        if !self.buf.is_empty() {
            flush_err = self.flush_chunk().await.err();
        }

        // Close the queue and wait for every worker before assembling;
        // the error state holds its final value only once they exit.
        let pool = self.pool.take().ok_or(StoreError::Cancelled)?;
        let finished = pool.finish().await;

        match flush_err {
            Some(err) => Err(err),
            None => finished,
        }
    }

    /// Uploads the buffered object in one shot, fetching a fresh
    /// session to retry on transient failure.
    async fn simple_upload(&mut self) -> Result<RemoteObject, StoreError> {
        let digest = hex::encode(self.hasher.clone().finalize());
        let mut session = self.store.simple_session().await?;
        let mut attempts: u32 = 0;
        loop {
            let err = match session
                .upload_whole(
                    &self.buf,
                    &self.name,
                    &self.opts.content_type,
                    &digest,
                    &self.opts.metadata,
                )
                .await
            {
                Ok(obj) => return Ok(obj),
                Err(err) => err,
            };

            attempts += 1;
            let capped = self.opts.retry_limit.is_some_and(|limit| attempts > limit);
            if capped || !self.retry.is_retriable(&err) {
                return Err(err);
            }
            info!(
                object = %self.name,
                attempts,
                error = %err,
                "retrying one-shot upload with a fresh session"
            );
            session = self.store.simple_session().await?;
        }
    }

    /// Starts the multipart session and worker pool on the first full
    /// chunk. Exclusive `&mut self` access makes the transition
    /// single-shot.
    async fn ensure_pool(&mut self) -> Result<(), StoreError> {
        if self.pool.is_some() {
            return Ok(());
        }
        info!(
            object = %self.name,
            workers = self.opts.concurrency,
            "object crossed chunk threshold, starting multipart upload"
        );
        let session = self
            .store
            .start_multipart(&self.name, &self.opts.content_type, &self.opts.metadata)
            .await?;
        self.pool = Some(WorkerPool::start(
            session,
            Arc::clone(&self.retry),
            self.opts.retry_limit,
            self.opts.concurrency,
            self.fault.clone(),
        ));
        Ok(())
    }

    /// Cuts the buffered bytes into the next chunk, resetting the
    /// buffer and running digest.
    fn cut_chunk(&mut self) -> Chunk {
        let payload = mem::take(&mut self.buf);
        let digest = hex::encode(mem::take(&mut self.hasher).finalize());
        let chunk = Chunk {
            id: self.next_id,
            size: payload.len(),
            digest,
            payload,
        };
        self.next_id += 1;
        debug!(object = %self.name, chunk = chunk.id, size = chunk.size, "chunk cut");
        chunk
    }

    async fn flush_chunk(&mut self) -> Result<(), StoreError> {
        self.ensure_pool().await?;
        let chunk = self.cut_chunk();
        let pool = self.pool.as_ref().ok_or(StoreError::Cancelled)?;
        pool.dispatch(chunk).await
    }
}
