//! First-error-wins state shared between the writer and its workers.

use std::sync::{Arc, Mutex};

use cirrus_store::StoreError;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Records the first fatal error of an upload and cancels everything
/// tied to the session when it happens.
///
/// Clones share the same cell. The cancellation token fires exactly
/// once, on the transition from no error to an error; later calls to
/// [`record`](Self::record) are no-ops.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorState {
    err: Arc<Mutex<Option<StoreError>>>,
    cancel: CancellationToken,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `err` if no error is held yet and fires cancellation.
    pub fn record(&self, err: StoreError) {
        let mut slot = self.err.lock().unwrap();
        if slot.is_none() {
            error!(error = %err, "upload failed");
            *slot = Some(err);
            self.cancel.cancel();
        }
    }

    /// Returns the recorded error, if any, without blocking.
    pub fn get(&self) -> Option<StoreError> {
        self.err.lock().unwrap().clone()
    }

    /// Token observed by anything that must unblock when the upload
    /// fails.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
