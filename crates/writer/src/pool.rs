//! Lazily started pool of part-upload workers.
//!
//! The pool owns the multipart session, the bounded hand-off queue, and
//! the worker tasks draining it. It is created on the first chunk flush
//! and consumed by [`WorkerPool::finish`] during close.

use std::sync::Arc;

use cirrus_store::{MultipartSession, PartLease, RemoteObject, RetryPolicy, StoreError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chunk::Chunk;
use crate::fault::ErrorState;

/// Queue receiver shared by every worker; locking it is how a worker
/// claims the next chunk.
type SharedQueue = Arc<Mutex<mpsc::Receiver<Chunk>>>;

pub(crate) struct WorkerPool {
    session: Arc<dyn MultipartSession>,
    tx: mpsc::Sender<Chunk>,
    handles: Vec<JoinHandle<()>>,
    fault: ErrorState,
}

impl WorkerPool {
    /// Spawns `workers` upload tasks against `session`.
    pub fn start(
        session: Arc<dyn MultipartSession>,
        retry: Arc<dyn RetryPolicy>,
        retry_limit: Option<u32>,
        workers: usize,
        fault: ErrorState,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Chunk>(1);
        let rx: SharedQueue = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(workers);
        for id in 1..=workers as u32 {
            handles.push(tokio::spawn(upload_worker(
                id,
                Arc::clone(&session),
                Arc::clone(&retry),
                retry_limit,
                Arc::clone(&rx),
                fault.clone(),
            )));
        }
        Self {
            session,
            tx,
            handles,
            fault,
        }
    }

    /// Hands a chunk to some worker.
    ///
    /// Blocks until a worker accepts it or the upload is cancelled,
    /// whichever comes first.
    pub async fn dispatch(&self, chunk: Chunk) -> Result<(), StoreError> {
        let cancel = self.fault.cancel_token();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(self.fault.get().unwrap_or(StoreError::Cancelled))
            }
            sent = self.tx.send(chunk) => {
                // A send error means every worker is gone, which only
                // happens after one of them recorded a fatal error.
                sent.map_err(|_| self.fault.get().unwrap_or(StoreError::Cancelled))
            }
        }
    }

    /// Closes the queue, waits for every worker to exit, then assembles
    /// the uploaded parts.
    ///
    /// Joining the workers first guarantees the error state holds its
    /// final value; a session with a recorded error is never assembled.
    pub async fn finish(self) -> Result<RemoteObject, StoreError> {
        drop(self.tx);
        for handle in self.handles {
            let _ = handle.await;
        }
        if let Some(err) = self.fault.get() {
            return Err(err);
        }
        self.session.finish().await
    }
}

/// One upload worker: claims chunks from the shared queue and uploads
/// each through its lease, fetching a fresh lease to retry the same
/// chunk on transient failure.
async fn upload_worker(
    id: u32,
    session: Arc<dyn MultipartSession>,
    retry: Arc<dyn RetryPolicy>,
    retry_limit: Option<u32>,
    queue: SharedQueue,
    fault: ErrorState,
) {
    let cancel = fault.cancel_token().clone();
    let mut lease: Box<dyn PartLease> = match session.part_lease().await {
        Ok(lease) => lease,
        Err(err) => {
            fault.record(err);
            return;
        }
    };

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            chunk = async { queue.lock().await.recv().await } => match chunk {
                Some(chunk) => chunk,
                // Queue closed and drained: clean exit.
                None => return,
            },
        };
        debug!(worker = id, chunk = chunk.id, size = chunk.size, "uploading chunk");

        let mut attempts: u32 = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                outcome = lease.upload_part(&chunk.payload, &chunk.digest, chunk.id) => outcome,
            };
            let err = match outcome {
                Ok(written) if written == chunk.size => {
                    debug!(worker = id, chunk = chunk.id, "chunk uploaded");
                    break;
                }
                Ok(written) => StoreError::ShortWrite {
                    written,
                    expected: chunk.size,
                },
                Err(err) => err,
            };

            attempts += 1;
            let capped = retry_limit.is_some_and(|limit| attempts > limit);
            if capped || !retry.is_retriable(&err) {
                fault.record(err);
                return;
            }
            info!(
                worker = id,
                chunk = chunk.id,
                attempts,
                error = %err,
                "retrying chunk with a fresh lease"
            );
            lease = match session.part_lease().await {
                Ok(lease) => lease,
                Err(err) => {
                    fault.record(err);
                    return;
                }
            };
        }
    }
}
