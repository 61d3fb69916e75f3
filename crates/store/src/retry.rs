//! Retry-policy seam.

use crate::error::StoreError;

/// Classifies a failed upload attempt as retriable or fatal.
///
/// Implementations must be pure: no side effects, and the same answer
/// for the same error. The write path consults the policy on every
/// failure before deciding whether to fetch a fresh lease and retry.
pub trait RetryPolicy: Send + Sync {
    /// Returns `true` if the failed attempt should be retried.
    fn is_retriable(&self, err: &StoreError) -> bool;
}

/// Any matching closure can serve as a policy, which keeps test setups
/// short.
impl<F> RetryPolicy for F
where
    F: Fn(&StoreError) -> bool + Send + Sync,
{
    fn is_retriable(&self, err: &StoreError) -> bool {
        self(err)
    }
}

/// Default policy: transport failures, throttling, server-side errors,
/// and short writes are transient; everything else is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientErrorPolicy;

impl RetryPolicy for TransientErrorPolicy {
    fn is_retriable(&self, err: &StoreError) -> bool {
        match err {
            StoreError::Transport(_) => true,
            StoreError::Service { status, .. } => *status == 429 || *status >= 500,
            StoreError::ShortWrite { .. } => true,
            _ => false,
        }
    }
}
