#![forbid(unsafe_code)]

//! Error taxonomy for store operations.
//!
//! Only two kinds of failure reach an action's caller: failures of the
//! action body itself (including aborts) and programmer misuse of the
//! batch API. Observer-side failures (subscriber callbacks, filters) are
//! reported via `tracing` and never surface here.

use std::fmt;

/// Errors produced by [`Store`](crate::Store) operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An action body failed. The whole batch was rolled back to its
    /// pre-batch checkpoint before this error was returned.
    Action {
        /// Name of the action that failed.
        action: String,
        /// Human-readable failure description.
        message: String,
    },
    /// The in-flight batch was cancelled via `abort()`. Observed after the
    /// action body returned; state was rolled back to the checkpoint.
    Aborted {
        /// Name of the action call that first observed the cancellation.
        action: String,
    },
    /// `abort()` or `flush()` was called with no action running.
    NoActionInProgress {
        /// The operation that was attempted.
        operation: &'static str,
    },
    /// An operation that bypasses batching (e.g. `restore()`) was called
    /// while a batch was in flight.
    ActionInProgress {
        /// The operation that was attempted.
        operation: &'static str,
    },
    /// Two store definitions at different definition sites claimed the
    /// same identifier.
    DuplicateStoreId {
        /// The contested identifier.
        id: String,
        /// Definition site that registered the identifier first.
        first_site: String,
        /// Definition site whose registration was rejected.
        second_site: String,
    },
    /// The store identifier failed validation.
    InvalidStoreId {
        /// The rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl StoreError {
    /// Build an [`StoreError::Action`] for a failing action body.
    #[must_use]
    pub fn action(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Action {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Whether this error is an abort (as opposed to an arbitrary action
    /// failure or programmer misuse).
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action { action, message } => {
                write!(f, "action '{action}' failed: {message}")
            }
            Self::Aborted { action } => write!(f, "action '{action}' aborted"),
            Self::NoActionInProgress { operation } => {
                write!(f, "{operation} called with no action in progress")
            }
            Self::ActionInProgress { operation } => {
                write!(f, "{operation} called while an action is in progress")
            }
            Self::DuplicateStoreId {
                id,
                first_site,
                second_site,
            } => {
                write!(
                    f,
                    "store id '{id}' already registered at {first_site} (rejected at {second_site})"
                )
            }
            Self::InvalidStoreId { id, reason } => {
                write!(f, "invalid store id '{id}': {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
