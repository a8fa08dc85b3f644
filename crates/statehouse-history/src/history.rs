#![forbid(unsafe_code)]

//! Snapshot timeline with cursor navigation.
//!
//! This module provides the [`History`] overlay which records committed
//! store snapshots and supports:
//!
//! - **Auto-capture**: Every committed batch becomes a history entry
//! - **Depth limits**: Oldest entries evicted when the cap is exceeded
//! - **Branch handling**: Capturing after an undo discards the redo tail
//! - **Time travel**: undo/redo/jump restore snapshots through the store
//!
//! # Invariants
//!
//! 1. `cursor < entries.len()` (after any operation, until disposed)
//! 2. The store state equals `entries[cursor]` whenever no action is in
//!    flight
//! 3. `entries.len() <= config.max_entries` (after any operation, if
//!    capped)
//! 4. A restore performed by the history itself is never re-captured
//!
//! # Memory Model
//!
//! Entries hold `Rc<S>` snapshots, so a timeline of large states shares
//! structure with the live state instead of deep-copying it. The state
//! observed at construction is retained twice: as `entries[0]` (evictable
//! under the cap like any entry) and as the permanent initial state that
//! [`History::clear`] returns to.
//!
//! ```text
//! construction, then capture x2     undo
//! ┌──────────────────────────┐     ┌──────────────────────────┐
//! │ [init, e1, e2]           │     │ [init, e1, e2]           │
//! │            ^cursor=2     │     │        ^cursor=1         │
//! └──────────────────────────┘     └──────────────────────────┘
//!
//! capture  <-- new branch, discards e2
//! ┌──────────────────────────┐
//! │ [init, e1, e3]           │
//! │            ^cursor=2     │
//! └──────────────────────────┘
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;
use web_time::Instant;

use statehouse_core::{ActionRecord, Store, StoreError, Subscription};

/// Predicate deciding whether a committed batch is worth a history entry.
type CaptureFilter = dyn Fn(&[ActionRecord]) -> bool;

/// Configuration for the history overlay.
#[derive(Clone)]
pub struct HistoryConfig {
    /// Maximum number of entries to keep (0 = unlimited).
    pub max_entries: usize,
    /// Whether to record an entry for every committed batch.
    pub auto_capture: bool,
    /// Optional filter applied to each auto-captured batch log.
    pub filter: Option<Rc<CaptureFilter>>,
}

impl fmt::Debug for HistoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryConfig")
            .field("max_entries", &self.max_entries)
            .field("auto_capture", &self.auto_capture)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            auto_capture: true,
            filter: None,
        }
    }
}

impl HistoryConfig {
    /// Create a configuration with a custom entry cap.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::default()
        }
    }

    /// Disable or enable auto-capture.
    #[must_use]
    pub fn with_auto_capture(mut self, enabled: bool) -> Self {
        self.auto_capture = enabled;
        self
    }

    /// Restrict auto-capture to batches the predicate accepts.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&[ActionRecord]) -> bool + 'static) -> Self {
        self.filter = Some(Rc::new(filter));
        self
    }

    /// Create an uncapped configuration (for testing).
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_entries: 0,
            ..Self::default()
        }
    }
}

/// One recorded point on the timeline.
#[derive(Debug, Clone)]
pub struct HistoryEntry<S> {
    state: Rc<S>,
    actions: Vec<String>,
    at: Instant,
    label: Option<String>,
}

impl<S> HistoryEntry<S> {
    fn initial(state: Rc<S>) -> Self {
        Self {
            state,
            actions: Vec::new(),
            at: Instant::now(),
            label: None,
        }
    }

    /// The snapshot this entry restores to.
    #[must_use]
    pub fn state(&self) -> &Rc<S> {
        &self.state
    }

    /// Names of the actions that produced this entry, root first.
    #[must_use]
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// When the entry was recorded.
    #[must_use]
    pub fn at(&self) -> Instant {
        self.at
    }

    /// User-supplied label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Human-readable summary: the label, or the joined action names.
    #[must_use]
    pub fn description(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.actions.join("+"),
        }
    }
}

/// Distinguishes ordinary store traffic from the history's own restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Applying,
}

struct HistoryInner<S> {
    store: Store<S>,
    config: HistoryConfig,
    /// Permanently retained construction-time state; [`History::clear`]
    /// returns to it even after `entries[0]` has been evicted.
    initial_state: Rc<S>,
    /// Timeline; `entries[0]` starts as the initial entry.
    entries: Vec<HistoryEntry<S>>,
    /// Index of the entry the store currently matches.
    cursor: usize,
    phase: Phase,
    disposed: bool,
}

impl<S: Clone + PartialEq + 'static> HistoryInner<S> {
    /// Record a snapshot after the cursor, discarding any redo tail.
    ///
    /// Returns `false` when the snapshot equals the entry at the cursor,
    /// so repeated captures of an unchanged store stay silent.
    fn push_entry(&mut self, state: Rc<S>, actions: Vec<String>, label: Option<String>) -> bool {
        if *state == *self.entries[self.cursor].state {
            return false;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(HistoryEntry {
            state,
            actions,
            at: Instant::now(),
            label,
        });
        self.cursor = self.entries.len() - 1;
        if self.config.max_entries > 0 {
            while self.entries.len() > self.config.max_entries {
                self.entries.remove(0);
                self.cursor -= 1;
            }
        }
        true
    }
}

/// Undo/redo overlay over one [`Store`].
///
/// Holds the store handle and, while auto-capture is on, a subscription
/// to it. Dropping the `History` detaches it from the store; the store
/// itself keeps working.
pub struct History<S> {
    inner: Rc<RefCell<HistoryInner<S>>>,
    subscription: Option<Subscription>,
}

impl<S: fmt::Debug> fmt::Debug for History<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("History")
            .field("entries", &inner.entries.len())
            .field("cursor", &inner.cursor)
            .field("auto_capture", &self.subscription.is_some())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

impl<S: Clone + PartialEq + 'static> History<S> {
    /// Attach a history overlay to `store`.
    ///
    /// The current store state is retained as the permanent initial state
    /// and seeds the timeline as its first entry. If `config.auto_capture`
    /// is set, a subscription is installed and every committed batch from
    /// now on is recorded.
    #[must_use]
    pub fn new(store: &Store<S>, config: HistoryConfig) -> Self {
        let auto = config.auto_capture;
        let initial = store.snapshot();
        let inner = Rc::new(RefCell::new(HistoryInner {
            store: store.clone(),
            config,
            initial_state: initial.clone(),
            entries: vec![HistoryEntry::initial(initial)],
            cursor: 0,
            phase: Phase::Idle,
            disposed: false,
        }));
        let mut history = Self {
            inner,
            subscription: None,
        };
        if auto {
            history.subscription = Some(history.subscribe_to_store());
        }
        history
    }

    fn subscribe_to_store(&self) -> Subscription {
        let weak: Weak<RefCell<HistoryInner<S>>> = Rc::downgrade(&self.inner);
        let store = self.inner.borrow().store.clone();
        store.subscribe(move |_, next, log| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let inner = &mut *inner.borrow_mut();
            if inner.disposed || inner.phase == Phase::Applying {
                return;
            }
            if let Some(filter) = &inner.config.filter
                && !filter(log)
            {
                return;
            }
            let actions = log.iter().map(|r| r.name().to_string()).collect();
            // The store's fan-out runs outside its own borrow, so taking a
            // fresh snapshot here is safe and avoids cloning `next`.
            let snapshot = inner.store.snapshot();
            debug_assert!(*snapshot == *next);
            if inner.push_entry(snapshot, actions, None) {
                debug!(cursor = inner.cursor, "history entry captured");
            }
        })
    }

    /// Record the current store state as a history entry.
    ///
    /// Returns `false` when the state equals the entry at the cursor
    /// (nothing to record), when a restore is in flight, or after
    /// [`Self::dispose`].
    pub fn capture(&self) -> bool {
        self.capture_with(None)
    }

    /// Record the current store state under a label.
    pub fn capture_labeled(&self, label: &str) -> bool {
        self.capture_with(Some(label.to_string()))
    }

    fn capture_with(&self, label: Option<String>) -> bool {
        let inner = &mut *self.inner.borrow_mut();
        if inner.disposed || inner.phase == Phase::Applying {
            return false;
        }
        let snapshot = inner.store.snapshot();
        inner.push_entry(snapshot, Vec::new(), label)
    }

    /// Step the cursor back one entry and restore that snapshot.
    ///
    /// Returns `Ok(false)` when there is nothing to undo (cursor on the
    /// first entry, or disposed).
    ///
    /// # Errors
    ///
    /// [`StoreError::ActionInProgress`] when called from inside an action
    /// body; the cursor is left where it was.
    pub fn undo(&self) -> Result<bool, StoreError> {
        let target = {
            let inner = &mut *self.inner.borrow_mut();
            if inner.disposed || inner.cursor == 0 {
                return Ok(false);
            }
            inner.cursor -= 1;
            inner.phase = Phase::Applying;
            inner.entries[inner.cursor].state.clone()
        };
        self.apply(target, "undo", |inner| inner.cursor += 1)
    }

    /// Step the cursor forward one entry and restore that snapshot.
    ///
    /// Returns `Ok(false)` when there is nothing to redo.
    ///
    /// # Errors
    ///
    /// See [`Self::undo`].
    pub fn redo(&self) -> Result<bool, StoreError> {
        let target = {
            let inner = &mut *self.inner.borrow_mut();
            if inner.disposed || inner.cursor + 1 >= inner.entries.len() {
                return Ok(false);
            }
            inner.cursor += 1;
            inner.phase = Phase::Applying;
            inner.entries[inner.cursor].state.clone()
        };
        self.apply(target, "redo", |inner| inner.cursor -= 1)
    }

    /// Move the cursor directly to `index` and restore that entry.
    ///
    /// Returns `Ok(false)` for an out-of-range index or a no-op move,
    /// leaving the cursor untouched.
    ///
    /// # Errors
    ///
    /// See [`Self::undo`].
    pub fn jump_to(&self, index: usize) -> Result<bool, StoreError> {
        let (target, previous) = {
            let inner = &mut *self.inner.borrow_mut();
            if inner.disposed || index >= inner.entries.len() || index == inner.cursor {
                return Ok(false);
            }
            let previous = inner.cursor;
            inner.cursor = index;
            inner.phase = Phase::Applying;
            (inner.entries[index].state.clone(), previous)
        };
        self.apply(target, "jump", move |inner| inner.cursor = previous)
    }

    /// Restore `target` with the re-entrancy tag held, rolling the cursor
    /// back via `revert` if the store refuses.
    fn apply(
        &self,
        target: Rc<S>,
        operation: &str,
        revert: impl FnOnce(&mut HistoryInner<S>),
    ) -> Result<bool, StoreError> {
        let store = self.inner.borrow().store.clone();
        // The restore notifies synchronously; the borrow must be released
        // first or the capture callback would re-enter it.
        let result = store.restore((*target).clone());
        let inner = &mut *self.inner.borrow_mut();
        inner.phase = Phase::Idle;
        match result {
            Ok(_) => {
                debug!(cursor = inner.cursor, operation, "history cursor moved");
                Ok(true)
            }
            Err(err) => {
                revert(inner);
                Err(err)
            }
        }
    }

    /// Check if undo is available.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.disposed && inner.cursor > 0
    }

    /// Check if redo is available.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.disposed && inner.cursor + 1 < inner.entries.len()
    }

    /// Number of entries on the timeline, the initial entry included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Whether the timeline has no entries (only after [`Self::dispose`]).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// The full timeline, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<HistoryEntry<S>> {
        self.inner.borrow().entries.clone()
    }

    /// The entry the store currently matches; `None` once disposed.
    #[must_use]
    pub fn current_entry(&self) -> Option<HistoryEntry<S>> {
        let inner = self.inner.borrow();
        inner.entries.get(inner.cursor).cloned()
    }

    /// Index of the current entry.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.inner.borrow().cursor
    }

    /// The construction-time state [`Self::clear`] returns to.
    #[must_use]
    pub fn initial_state(&self) -> Rc<S> {
        self.inner.borrow().initial_state.clone()
    }

    /// Descriptions of undoable entries, most recent first.
    #[must_use]
    pub fn undo_descriptions(&self, limit: usize) -> Vec<String> {
        let inner = self.inner.borrow();
        inner
            .entries
            .get(1..=inner.cursor)
            .unwrap_or(&[])
            .iter()
            .rev()
            .take(limit)
            .map(HistoryEntry::description)
            .collect()
    }

    /// Descriptions of redoable entries, nearest first.
    #[must_use]
    pub fn redo_descriptions(&self, limit: usize) -> Vec<String> {
        let inner = self.inner.borrow();
        inner
            .entries
            .get(inner.cursor + 1..)
            .unwrap_or(&[])
            .iter()
            .take(limit)
            .map(HistoryEntry::description)
            .collect()
    }

    /// Begin recording committed batches; no-op if already recording.
    pub fn start_auto_capture(&mut self) {
        if self.inner.borrow().disposed || self.subscription.is_some() {
            return;
        }
        self.subscription = Some(self.subscribe_to_store());
    }

    /// Stop recording committed batches; no-op if already stopped.
    pub fn stop_auto_capture(&mut self) {
        self.subscription = None;
    }

    /// Whether committed batches are currently being recorded.
    #[must_use]
    pub fn auto_capture(&self) -> bool {
        self.subscription.is_some()
    }

    /// Discard the timeline and return the store to the initial state.
    ///
    /// The log is reseeded with a single entry holding the permanently
    /// retained construction-time state, and that state is restored into
    /// the store, notifying its subscribers.
    ///
    /// # Errors
    ///
    /// [`StoreError::ActionInProgress`] when called from inside an action
    /// body; the timeline is left untouched.
    pub fn clear(&self) -> Result<(), StoreError> {
        let initial = {
            let inner = &mut *self.inner.borrow_mut();
            if inner.disposed {
                return Ok(());
            }
            inner.phase = Phase::Applying;
            inner.initial_state.clone()
        };
        let store = self.inner.borrow().store.clone();
        let result = store.restore((*initial).clone());
        let inner = &mut *self.inner.borrow_mut();
        inner.phase = Phase::Idle;
        result?;
        inner.entries = vec![HistoryEntry::initial(initial)];
        inner.cursor = 0;
        Ok(())
    }

    /// Permanently detach from the store.
    ///
    /// Drops the subscription and the timeline; every later operation is
    /// an inert no-op. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.subscription = None;
        let inner = &mut *self.inner.borrow_mut();
        inner.entries.clear();
        inner.cursor = 0;
        inner.disposed = true;
    }

    /// Whether [`Self::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        text: String,
    }

    fn doc(text: &str) -> Doc {
        Doc {
            text: text.to_string(),
        }
    }

    fn append(store: &Store<Doc>, fragment: &str) {
        store
            .action("APPEND", |scope| {
                scope.update(|d| d.text.push_str(fragment));
                Ok(())
            })
            .expect("append action");
    }

    #[test]
    fn new_history_seeds_one_initial_entry() {
        let store = Store::new("h-seed", doc("start")).expect("store");
        let history = History::new(&store, HistoryConfig::default());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.len(), 1);
        assert_eq!(history.current_index(), 0);
        assert_eq!(history.initial_state().text, "start");
        let entry = history.current_entry().expect("initial entry");
        assert!(entry.actions().is_empty());
        assert!(entry.label().is_none());
    }

    #[test]
    fn auto_capture_records_committed_batches() {
        let store = Store::new("h-auto", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        append(&store, "a");
        append(&store, "b");

        assert_eq!(history.len(), 3, "initial entry plus two captures");
        assert_eq!(history.current_index(), 2);
        assert!(history.can_undo());
        assert_eq!(
            history.undo_descriptions(10),
            vec!["APPEND".to_string(), "APPEND".to_string()]
        );
    }

    #[test]
    fn undo_restores_previous_snapshot() {
        let store = Store::new("h-undo", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        append(&store, "a");
        append(&store, "b");

        assert!(history.undo().expect("undo"));
        assert_eq!(store.snapshot().text, "a");
        assert!(history.undo().expect("undo"));
        assert_eq!(store.snapshot().text, "");
        assert!(!history.can_undo());
        assert!(!history.undo().expect("undo at first entry"));
    }

    #[test]
    fn redo_reapplies_undone_snapshot() {
        let store = Store::new("h-redo", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        append(&store, "a");
        history.undo().expect("undo");
        assert!(history.can_redo());

        assert!(history.redo().expect("redo"));
        assert_eq!(store.snapshot().text, "a");
        assert!(!history.can_redo());
        assert!(!history.redo().expect("redo at tip"));
    }

    #[test]
    fn own_restore_is_not_recaptured() {
        let store = Store::new("h-reentry", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        append(&store, "a");
        history.undo().expect("undo");
        history.redo().expect("redo");

        // Time travel must not grow the timeline.
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn capture_after_undo_discards_redo_tail() {
        let store = Store::new("h-branch", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        append(&store, "a");
        append(&store, "b");
        append(&store, "c");
        history.undo().expect("undo");
        history.undo().expect("undo");
        assert_eq!(history.current_index(), 1);

        append(&store, "X");

        assert_eq!(store.snapshot().text, "aX");
        assert_eq!(history.len(), 3);
        assert_eq!(history.current_index(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn max_entries_evicts_oldest() {
        let store = Store::new("h-cap", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::new(3));

        for fragment in ["a", "b", "c", "d", "e"] {
            append(&store, fragment);
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.current_index(), 2);

        // Undoing all the way lands on the oldest surviving entry.
        while history.undo().expect("undo") {}
        assert_eq!(store.snapshot().text, "abc");

        // The permanent initial state outlives the eviction.
        assert_eq!(history.initial_state().text, "");
    }

    #[test]
    fn jump_to_moves_cursor_in_one_restore() {
        let store = Store::new("h-jump", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        for fragment in ["a", "b", "c"] {
            append(&store, fragment);
        }

        assert!(history.jump_to(1).expect("jump"));
        assert_eq!(store.snapshot().text, "a");
        assert_eq!(history.current_index(), 1);
        assert!(history.can_redo());

        assert!(history.jump_to(3).expect("jump"));
        assert_eq!(store.snapshot().text, "abc");

        assert!(!history.jump_to(3).expect("no-op jump"));
        assert!(!history.jump_to(99).expect("out of range"));
        assert_eq!(history.current_index(), 3);
    }

    #[test]
    fn manual_capture_dedupes_unchanged_state() {
        let store = Store::new("h-manual", doc("hello")).expect("store");
        let history = History::new(&store, HistoryConfig::default().with_auto_capture(false));

        assert!(!history.capture(), "unchanged state records nothing");
        append(&store, "!");
        assert!(history.capture());
        assert!(!history.capture(), "second capture of same state");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn capture_labeled_sets_description() {
        let store = Store::new("h-label", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default().with_auto_capture(false));

        append(&store, "draft");
        assert!(history.capture_labeled("first draft"));

        assert_eq!(history.undo_descriptions(1), vec!["first draft".to_string()]);
        let entry = history.current_entry().expect("entry");
        assert_eq!(entry.label(), Some("first draft"));
        assert_eq!(entry.description(), "first draft");
    }

    #[test]
    fn filter_limits_auto_capture() {
        let store = Store::new("h-filter", doc("")).expect("store");
        let config =
            HistoryConfig::default().with_filter(|log| log.iter().any(|r| r.name() == "SAVE"));
        let history = History::new(&store, config);

        append(&store, "a");
        store
            .action_with("SAVE", json!({ "slot": 1 }), |scope| {
                scope.update(|d| d.text.push('!'));
                Ok(())
            })
            .expect("save");

        assert_eq!(history.len(), 2);
        assert_eq!(history.undo_descriptions(1), vec!["SAVE".to_string()]);
    }

    #[test]
    fn auto_capture_toggles_are_idempotent() {
        let store = Store::new("h-toggle", doc("")).expect("store");
        let mut history = History::new(&store, HistoryConfig::default());

        append(&store, "a");
        history.stop_auto_capture();
        history.stop_auto_capture();
        append(&store, "b");
        assert_eq!(history.len(), 2, "capture paused");

        history.start_auto_capture();
        history.start_auto_capture();
        append(&store, "c");
        assert_eq!(history.len(), 3);
        assert!(history.auto_capture());
    }

    #[test]
    fn rolled_back_batches_are_not_captured() {
        let store = Store::new("h-rollback", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        let err = store
            .action("FAIL", |scope| {
                scope.update(|d| d.text.push('x'));
                Err::<(), _>(StoreError::action("FAIL", "boom"))
            })
            .expect_err("fails");
        assert!(!err.is_aborted());

        assert_eq!(history.len(), 1);
    }

    #[test]
    fn clear_restores_the_initial_state() {
        let store = Store::new("h-clear", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        append(&store, "a");
        append(&store, "b");
        history.clear().expect("clear");

        assert_eq!(history.len(), 1, "reseeded with the initial entry");
        assert_eq!(history.current_index(), 0);
        assert!(!history.can_undo());
        assert_eq!(store.snapshot().text, "", "store returned to initial");

        append(&store, "c");
        assert_eq!(history.len(), 2);
        history.undo().expect("undo");
        assert_eq!(store.snapshot().text, "");
    }

    #[test]
    fn clear_survives_entry_eviction() {
        let store = Store::new("h-clear-evicted", doc("origin")).expect("store");
        let history = History::new(&store, HistoryConfig::new(2));

        for fragment in ["1", "2", "3"] {
            append(&store, fragment);
        }
        assert_eq!(history.len(), 2, "initial entry already evicted");

        history.clear().expect("clear");
        assert_eq!(store.snapshot().text, "origin");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn dispose_makes_everything_inert() {
        let store = Store::new("h-dispose", doc("")).expect("store");
        let mut history = History::new(&store, HistoryConfig::default());

        append(&store, "a");
        history.dispose();
        history.dispose();

        assert!(history.is_disposed());
        assert!(history.is_empty());
        assert!(history.current_entry().is_none());
        assert!(!history.undo().expect("inert undo"));
        assert!(!history.redo().expect("inert redo"));
        assert!(!history.capture());
        append(&store, "b");
        assert!(history.is_empty());
        assert_eq!(store.snapshot().text, "ab", "store keeps working");
    }

    #[test]
    fn undo_inside_action_is_refused_and_cursor_kept() {
        let store = Store::new("h-mid-batch", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());
        append(&store, "a");

        store
            .action("OUTER", |_| {
                let err = history.undo().expect_err("mid-batch undo");
                assert!(matches!(err, StoreError::ActionInProgress { .. }));
                Ok(())
            })
            .expect("outer commits");

        assert_eq!(history.current_index(), 1);
        assert!(history.undo().expect("undo afterwards"));
        assert_eq!(store.snapshot().text, "");
    }

    #[test]
    fn undo_notification_reaches_store_subscribers() {
        let store = Store::new("h-notify", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());
        let names = Rc::new(RefCell::new(Vec::new()));
        let names_clone = Rc::clone(&names);
        let _sub = store.subscribe(move |_, _, log| {
            names_clone
                .borrow_mut()
                .extend(log.iter().map(|r| r.name().to_string()));
        });

        append(&store, "a");
        history.undo().expect("undo");

        assert_eq!(
            *names.borrow(),
            vec!["APPEND".to_string(), "HISTORY_RESTORE".to_string()]
        );
    }

    #[test]
    fn entry_metadata_is_recorded() {
        let store = Store::new("h-entry-meta", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());

        store
            .action("OUTER", |scope| {
                scope.action("INNER", |scope| {
                    scope.update(|d| d.text.push('x'));
                    Ok(())
                })
            })
            .expect("action");

        let entry = history.current_entry().expect("entry");
        assert_eq!(entry.actions(), ["OUTER".to_string(), "INNER".to_string()]);
        assert_eq!(entry.state().text, "x");
        assert!(entry.label().is_none());
        assert_eq!(entry.description(), "OUTER+INNER");
        assert!(entry.at().elapsed() < std::time::Duration::from_secs(60));
        assert_eq!(history.entries().len(), 2);
    }

    #[test]
    fn debug_impl_reports_shape() {
        let store = Store::new("h-debug", doc("")).expect("store");
        let history = History::new(&store, HistoryConfig::default());
        append(&store, "a");
        let text = format!("{history:?}");
        assert!(text.contains("History"));
        assert!(text.contains("cursor"));
    }
}
