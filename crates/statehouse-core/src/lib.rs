#![forbid(unsafe_code)]

//! Statehouse Core
//!
//! This crate provides the store half of the statehouse state-management
//! stack: a deeply-immutable, versioned state value behind a cloneable
//! handle, mutated only through named, batchable actions.
//!
//! # Key Components
//!
//! - [`Store`] - Shared handle over one state value with subscribe/notify
//! - [`ActionScope`] - Mutation surface handed to action bodies
//! - [`ActionRecord`] - One entry in the ordered per-batch action log
//! - [`Subscription`] - RAII guard that unsubscribes on drop
//! - [`CancelToken`] - Advisory per-batch cancellation flag
//! - [`StoreError`] - Error taxonomy for batch and registry failures
//!
//! # Batching model
//!
//! The first (root) action call opens a batch: the current state becomes
//! the rollback checkpoint and a cancellation flag is armed. Actions
//! called from inside a running action join the same batch, growing its
//! ordered log. When the root call returns, the batch concludes: on any
//! failure or abort the state snaps back to the checkpoint and no
//! subscriber hears anything; on success subscribers are notified exactly
//! once with the previous state, the new state, and the full log.
//!
//! Mid-batch progress can be published with [`ActionScope::flush`], which
//! collapses the pending log into a single `FLUSH` marker and advances the
//! notification baseline without ending the batch.
//!
//! # How it fits in the system
//! `statehouse-core` knows nothing about undo/redo. History, persistence,
//! and UI bindings are all external observers built on [`Store::subscribe`]
//! and [`Store::restore`]; see the `statehouse-history` crate for the
//! undo/redo overlay.

pub mod action;
pub mod cancel;
pub mod error;
pub mod registry;
pub mod store;

pub use action::{ActionKind, ActionRecord, FLUSH, HISTORY_RESTORE};
pub use cancel::CancelToken;
pub use error::StoreError;
pub use store::{ActionScope, Store, Subscription};
