#![forbid(unsafe_code)]

//! Advisory cancellation flag for in-flight batches.
//!
//! Each root action arms a fresh flag when its batch opens; `abort()`
//! trips it. The store checks the flag only after the running action
//! body returns, then fails the batch with
//! [`StoreError::Aborted`](crate::StoreError::Aborted) and rolls back.
//! Long-running bodies that want to stop earlier poll
//! [`is_cancelled`](CancelToken::is_cancelled) themselves. The flag is
//! an atomic behind an `Arc`, so a body may hand a token clone to a
//! worker thread and have the worker poll it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable view of one batch's cancellation flag.
///
/// Obtained through [`ActionScope::cancel_token`](crate::ActionScope::cancel_token).
/// Clones may outlive the batch; a tripped flag stays tripped, and the
/// next root action arms a fresh one.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tripped: Arc<AtomicBool>,
}

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self {
            tripped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Trip the flag. Idempotent.
    pub(crate) fn trip(&self) {
        self.tripped.store(true, Ordering::Release);
    }

    /// Whether `abort()` has been called on the owning batch.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }
}
