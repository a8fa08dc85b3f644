#![forbid(unsafe_code)]

//! The action-batching store.
//!
//! # Design
//!
//! [`Store<S>`] wraps one state value in shared, reference-counted storage
//! (`Rc<RefCell<..>>`). The state itself lives behind an `Rc<S>`, so
//! snapshots are O(1) and rollback is a pointer swap. Mutations go through
//! named actions; the first (root) action call opens a batch and every
//! action called from inside it joins that batch. Subscribers hear about a
//! batch at most once, when the root call commits.
//!
//! # Invariants
//!
//! 1. State changes only inside an action; between actions the snapshot is
//!    referentially stable (unchanged batch ⇒ same `Rc`).
//! 2. A batch notifies subscribers at most once on success, never on
//!    failure or abort.
//! 3. `version` increments once per published change (commit, flush,
//!    restore).
//! 4. Subscribers are notified in registration order; dead subscriptions
//!    (dropped [`Subscription`] guards) are pruned lazily on notify.
//!
//! # Failure Modes
//!
//! - **Re-entrant mutation**: calling store operations from inside an
//!   [`ActionScope::update`] closure panics (RefCell borrow rules). Nested
//!   actions must go through [`ActionScope::action`] instead.
//! - **Panicking action body**: the batch stays open and the store is
//!   poisoned for further use. Action bodies report failure through
//!   `Result`, not panics.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, error};

use crate::action::ActionRecord;
use crate::cancel::CancelToken;
use crate::error::StoreError;
use crate::registry;

/// A subscriber callback: `(previous, next, action log)`.
type NotifyFn<S> = dyn Fn(&S, &S, &[ActionRecord]);
/// A notification filter over the same arguments.
type FilterFn<S> = dyn Fn(&S, &S, &[ActionRecord]) -> bool;

struct SubscriberEntry<S> {
    callback: Weak<NotifyFn<S>>,
    filter: Option<Rc<FilterFn<S>>>,
}

/// Transient bookkeeping for one in-flight batch.
struct Batch<S> {
    /// Nesting depth; the batch concludes when this returns to zero.
    depth: u32,
    /// Rollback point captured when the root action started.
    checkpoint: Rc<S>,
    /// "Previous state" for the next notification; advanced by flush.
    notify_base: Rc<S>,
    /// Pending action log for the next notification.
    log: Vec<ActionRecord>,
    /// Number of leading records already collapsed by a flush (0 or 1).
    flushed_prefix: usize,
    /// First failure observed anywhere in the batch.
    poison: Option<StoreError>,
    /// Cancellation flag shared by the whole batch.
    cancel: CancelToken,
}

struct StoreInner<S> {
    id: String,
    state: Rc<S>,
    version: u64,
    subscribers: Vec<SubscriberEntry<S>>,
    batch: Option<Batch<S>>,
}

/// A shared handle to one versioned, observably-mutated state value.
///
/// Cloning a `Store` creates a new handle to the **same** inner state;
/// both handles see the same value, batch, and subscribers.
pub struct Store<S> {
    inner: Rc<RefCell<StoreInner<S>>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Store")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .field("batch_open", &inner.batch.is_some())
            .finish()
    }
}

impl<S: Clone + PartialEq + 'static> Store<S> {
    /// Create a new store with the given identifier and initial state.
    ///
    /// The identifier is claimed in the process-wide registry, keyed by
    /// this call's definition site. Re-running the same construction is
    /// idempotent; claiming the identifier from a different site fails
    /// with [`StoreError::DuplicateStoreId`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidStoreId`] or
    /// [`StoreError::DuplicateStoreId`] on registry rejection.
    #[track_caller]
    pub fn new(id: impl Into<String>, initial: S) -> Result<Self, StoreError> {
        let id = id.into();
        registry::register(&id, std::panic::Location::caller())?;
        Ok(Self {
            inner: Rc::new(RefCell::new(StoreInner {
                id,
                state: Rc::new(initial),
                version: 0,
                subscribers: Vec::new(),
                batch: None,
            })),
        })
    }

    /// The store's registered identifier.
    #[must_use]
    pub fn id(&self) -> String {
        self.inner.borrow().id.clone()
    }

    /// Current state snapshot. Cheap; referentially stable between actions.
    #[must_use]
    pub fn snapshot(&self) -> Rc<S> {
        self.inner.borrow().state.clone()
    }

    /// Number of published changes so far (commits, flushes, restores).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered subscribers, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Subscribe to committed state changes.
    ///
    /// The callback receives `(previous, next, action log)` once per
    /// committed batch, flush, or restore. It never fires at subscription
    /// time, and never for a rolled-back batch. Returns a [`Subscription`]
    /// guard; dropping the guard unsubscribes.
    pub fn subscribe(&self, callback: impl Fn(&S, &S, &[ActionRecord]) + 'static) -> Subscription {
        self.push_subscriber(Rc::new(callback), None)
    }

    /// Subscribe with a filter predicate.
    ///
    /// The callback fires only when `filter` returns `true` for the
    /// notification. A panicking filter counts as "do not fire" and is
    /// reported, not propagated.
    pub fn subscribe_filtered(
        &self,
        callback: impl Fn(&S, &S, &[ActionRecord]) + 'static,
        filter: impl Fn(&S, &S, &[ActionRecord]) -> bool + 'static,
    ) -> Subscription {
        self.push_subscriber(Rc::new(callback), Some(Rc::new(filter)))
    }

    fn push_subscriber(
        &self,
        callback: Rc<NotifyFn<S>>,
        filter: Option<Rc<FilterFn<S>>>,
    ) -> Subscription {
        let weak = Rc::downgrade(&callback);
        self.inner.borrow_mut().subscribers.push(SubscriberEntry {
            callback: weak,
            filter,
        });
        Subscription {
            _guard: Box::new(callback),
        }
    }

    /// Invoke a named action with no payload.
    ///
    /// See [`Self::action_with`] for the batching contract.
    ///
    /// # Errors
    ///
    /// Propagates the body's error, or [`StoreError::Aborted`] if the
    /// batch was cancelled while the body ran. Either way the whole batch
    /// rolls back once the root call unwinds.
    pub fn action<R>(
        &self,
        name: &str,
        body: impl FnOnce(&mut ActionScope<'_, S>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.run_action(ActionRecord::invoke(name, None), body)
    }

    /// Invoke a named action carrying a payload value.
    ///
    /// The record (name + payload) is appended to the batch log before the
    /// body runs. A root call opens the batch: checkpoint, cancellation
    /// signal, empty log. A call made while a batch is in flight joins it.
    /// When the root call finishes, the batch either commits (one
    /// notification with the full ordered log) or rolls back entirely.
    ///
    /// # Errors
    ///
    /// See [`Self::action`].
    pub fn action_with<R>(
        &self,
        name: &str,
        payload: Value,
        body: impl FnOnce(&mut ActionScope<'_, S>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.run_action(ActionRecord::invoke(name, Some(payload)), body)
    }

    fn run_action<R>(
        &self,
        record: ActionRecord,
        body: impl FnOnce(&mut ActionScope<'_, S>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let name = record.name().to_string();
        self.begin_call(record);
        let mut scope = ActionScope { store: self };
        let result = body(&mut scope);
        self.finish_call(&name, result)
    }

    fn begin_call(&self, record: ActionRecord) {
        let inner = &mut *self.inner.borrow_mut();
        match inner.batch.as_mut() {
            Some(batch) => {
                batch.depth += 1;
                batch.log.push(record);
            }
            None => {
                inner.batch = Some(Batch {
                    depth: 1,
                    checkpoint: inner.state.clone(),
                    notify_base: inner.state.clone(),
                    log: vec![record],
                    flushed_prefix: 0,
                    poison: None,
                    cancel: CancelToken::new(),
                });
            }
        }
    }

    fn batch_cancelled(&self) -> bool {
        self.inner
            .borrow()
            .batch
            .as_ref()
            .is_some_and(|b| b.cancel.is_cancelled())
    }

    fn finish_call<R>(
        &self,
        action: &str,
        result: Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        // The cancellation signal is observed here, after the body has
        // returned; it never interrupts a body mid-flight.
        let failure = match &result {
            Err(err) => Some(err.clone()),
            Ok(_) if self.batch_cancelled() => Some(StoreError::Aborted {
                action: action.to_string(),
            }),
            Ok(_) => None,
        };

        let notification = {
            let inner = &mut *self.inner.borrow_mut();
            let Some(batch) = inner.batch.as_mut() else {
                return Err(StoreError::NoActionInProgress {
                    operation: "action completion",
                });
            };
            if let Some(err) = &failure
                && batch.poison.is_none()
            {
                batch.poison = Some(err.clone());
            }
            batch.depth -= 1;
            if batch.depth > 0 {
                None
            } else {
                let Some(batch) = inner.batch.take() else {
                    return Err(StoreError::NoActionInProgress {
                        operation: "action completion",
                    });
                };
                if let Some(poison) = batch.poison {
                    inner.state = batch.checkpoint;
                    return Err(poison);
                }
                let next = inner.state.clone();
                let prev = batch.notify_base;
                if *next == *prev {
                    // No net change: keep the old allocation so unchanged
                    // state stays reference-identical, and stay silent.
                    inner.state = prev;
                    None
                } else {
                    inner.version += 1;
                    let subscribers = Self::collect_live(&mut inner.subscribers);
                    Some((inner.id.clone(), prev, next, batch.log, subscribers))
                }
            }
        };

        if let Some(err) = failure {
            return Err(err);
        }
        if let Some((id, prev, next, log, subscribers)) = notification {
            let notified = Self::fan_out(&id, subscribers, &prev, &next, &log);
            debug!(
                store = %id,
                actions = log.len(),
                subscribers = notified,
                "action batch committed"
            );
        }
        result
    }

    /// Signal cancellation of the in-flight batch.
    ///
    /// Observed after the currently running action body returns; the batch
    /// then fails with [`StoreError::Aborted`] and rolls back.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoActionInProgress`] if no batch is active.
    pub fn abort(&self) -> Result<(), StoreError> {
        let inner = self.inner.borrow();
        match inner.batch.as_ref() {
            Some(batch) => {
                batch.cancel.trip();
                Ok(())
            }
            None => Err(StoreError::NoActionInProgress { operation: "abort" }),
        }
    }

    /// Publish mid-batch progress to subscribers without ending the batch.
    ///
    /// Subscribers receive the state at the last flush (or batch start),
    /// the current state, and a single synthetic `FLUSH` record listing
    /// the collapsed action names. The pending log is replaced by that
    /// marker and the notification baseline advances to the current state.
    /// A flush with nothing new since the previous flush, or whose
    /// pending records net to no visible state change, is a silent no-op;
    /// suppressed records stay pending for the completion notification.
    /// A later batch failure still rolls back to the original pre-batch
    /// checkpoint.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoActionInProgress`] if no batch is active.
    pub fn flush(&self) -> Result<(), StoreError> {
        let (id, prev, next, log, subscribers) = {
            let inner = &mut *self.inner.borrow_mut();
            let Some(batch) = inner.batch.as_mut() else {
                return Err(StoreError::NoActionInProgress { operation: "flush" });
            };
            if batch.log.len() <= batch.flushed_prefix || *inner.state == *batch.notify_base {
                return Ok(());
            }
            let collapsed: Vec<String> = batch.log[batch.flushed_prefix..]
                .iter()
                .map(|r| r.name().to_string())
                .collect();
            let marker = ActionRecord::flush(collapsed);
            let next = inner.state.clone();
            let prev = std::mem::replace(&mut batch.notify_base, next.clone());
            batch.log = vec![marker.clone()];
            batch.flushed_prefix = 1;
            inner.version += 1;
            let subscribers = Self::collect_live(&mut inner.subscribers);
            (inner.id.clone(), prev, next, vec![marker], subscribers)
        };
        let notified = Self::fan_out(&id, subscribers, &prev, &next, &log);
        debug!(store = %id, subscribers = notified, "flush published");
        Ok(())
    }

    /// Replace the state directly, bypassing the batch machinery.
    ///
    /// Integration point for history/undo overlays and remote-state sync.
    /// If `new_state` equals the current state this is a no-op returning
    /// `Ok(false)`. Otherwise subscribers are notified once with a single
    /// synthetic `HISTORY_RESTORE` record and `Ok(true)` is returned.
    ///
    /// # Errors
    ///
    /// [`StoreError::ActionInProgress`] if a batch is in flight; restoring
    /// mid-batch would corrupt the rollback checkpoint.
    pub fn restore(&self, new_state: S) -> Result<bool, StoreError> {
        let (id, prev, next, subscribers) = {
            let inner = &mut *self.inner.borrow_mut();
            if inner.batch.is_some() {
                return Err(StoreError::ActionInProgress {
                    operation: "restore",
                });
            }
            if *inner.state == new_state {
                return Ok(false);
            }
            let prev = std::mem::replace(&mut inner.state, Rc::new(new_state));
            inner.version += 1;
            let subscribers = Self::collect_live(&mut inner.subscribers);
            (inner.id.clone(), prev, inner.state.clone(), subscribers)
        };
        let log = vec![ActionRecord::history_restore()];
        let notified = Self::fan_out(&id, subscribers, &prev, &next, &log);
        debug!(store = %id, subscribers = notified, "state restored");
        Ok(true)
    }

    /// Collect live callbacks in registration order, pruning dead entries.
    #[allow(clippy::type_complexity)]
    fn collect_live(
        subscribers: &mut Vec<SubscriberEntry<S>>,
    ) -> Vec<(Rc<NotifyFn<S>>, Option<Rc<FilterFn<S>>>)> {
        subscribers.retain(|entry| entry.callback.strong_count() > 0);
        subscribers
            .iter()
            .filter_map(|entry| {
                entry
                    .callback
                    .upgrade()
                    .map(|cb| (cb, entry.filter.clone()))
            })
            .collect()
    }

    /// Deliver one notification to each collected subscriber.
    ///
    /// Filter and callback panics are isolated per subscriber: reported
    /// via `tracing` and never propagated to the action caller.
    #[allow(clippy::type_complexity)]
    fn fan_out(
        id: &str,
        subscribers: Vec<(Rc<NotifyFn<S>>, Option<Rc<FilterFn<S>>>)>,
        prev: &S,
        next: &S,
        log: &[ActionRecord],
    ) -> usize {
        let mut notified = 0usize;
        for (callback, filter) in subscribers {
            if let Some(filter) = filter {
                match catch_unwind(AssertUnwindSafe(|| filter(prev, next, log))) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(_) => {
                        error!(store = %id, "subscriber filter panicked; notification suppressed");
                        continue;
                    }
                }
            }
            if catch_unwind(AssertUnwindSafe(|| callback(prev, next, log))).is_err() {
                error!(store = %id, "subscriber callback panicked");
            } else {
                notified += 1;
            }
        }
        notified
    }
}

/// Mutation surface handed to action bodies.
///
/// A scope only exists while its action body runs, which is what makes
/// "state changes only happen inside an action" a compile-time property.
pub struct ActionScope<'a, S> {
    store: &'a Store<S>,
}

impl<S: Clone + PartialEq + 'static> ActionScope<'_, S> {
    /// Current state snapshot.
    #[must_use]
    pub fn get(&self) -> Rc<S> {
        self.store.snapshot()
    }

    /// Mutate the state in place (clone-on-write).
    ///
    /// The closure must not call back into the store; use
    /// [`Self::action`] for nested actions instead.
    pub fn update(&mut self, f: impl FnOnce(&mut S)) {
        let inner = &mut *self.store.inner.borrow_mut();
        f(Rc::make_mut(&mut inner.state));
    }

    /// Replace the state wholesale.
    pub fn set(&mut self, state: S) {
        self.store.inner.borrow_mut().state = Rc::new(state);
    }

    /// Invoke a nested action; it joins the current batch.
    ///
    /// # Errors
    ///
    /// See [`Store::action`].
    pub fn action<R>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut ActionScope<'_, S>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.store.action(name, body)
    }

    /// Invoke a nested action with a payload.
    ///
    /// # Errors
    ///
    /// See [`Store::action`].
    pub fn action_with<R>(
        &mut self,
        name: &str,
        payload: Value,
        body: impl FnOnce(&mut ActionScope<'_, S>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.store.action_with(name, payload, body)
    }

    /// Signal cancellation of the whole batch.
    ///
    /// Observed after the current body returns; everything before that
    /// still runs.
    pub fn abort(&self) {
        if let Some(batch) = self.store.inner.borrow().batch.as_ref() {
            batch.cancel.trip();
        }
    }

    /// Publish mid-batch progress; see [`Store::flush`].
    pub fn flush(&self) {
        // A scope implies an open batch, so the store-level error path is
        // unreachable from here.
        let _ = self.store.flush();
    }

    /// The batch's cancellation token, for polling or handing to workers.
    #[must_use]
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.store
            .inner
            .borrow()
            .batch
            .as_ref()
            .map(|b| b.cancel.clone())
    }

    /// Whether the batch has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.store.batch_cancelled()
    }

    /// The store this scope mutates.
    #[must_use]
    pub fn store(&self) -> &Store<S> {
        self.store
    }
}

/// RAII guard for a subscriber callback.
///
/// Dropping the guard drops the strong reference to the callback; the
/// store's weak entry fails to upgrade on the next notification and is
/// pruned.
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
