#![forbid(unsafe_code)]

//! Property tests for [`History`] timeline invariants.
//!
//! Validates:
//! - Random append/undo/redo/jump sequences track a sequential model.
//! - `cursor < len` after every operation.
//! - Entry caps are never exceeded.
//! - Full undo then full redo is the identity on the final state.
//! - Undone-then-captured branches discard their redo tail.

use proptest::prelude::*;

use statehouse_core::Store;
use statehouse_history::{History, HistoryConfig};

// ============================================================================
// Strategy helpers
// ============================================================================

/// Operations that can be performed against a history-backed store.
#[derive(Debug, Clone)]
enum Op {
    Append(char),
    Undo,
    Redo,
    Jump(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => prop::char::range('a', 'z').prop_map(Op::Append),
        2 => Just(Op::Undo),
        2 => Just(Op::Redo),
        1 => (0usize..64).prop_map(Op::Jump),
    ]
}

fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..=max_len)
}

/// Sequential model: the timeline (initial entry included) plus a cursor.
struct Model {
    states: Vec<String>,
    cursor: usize,
}

impl Model {
    fn new() -> Self {
        Self {
            states: vec![String::new()],
            cursor: 0,
        }
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::Append(ch) => {
                let mut next = self.states[self.cursor].clone();
                next.push(*ch);
                self.states.truncate(self.cursor + 1);
                self.states.push(next);
                self.cursor += 1;
            }
            Op::Undo => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                }
            }
            Op::Redo => {
                if self.cursor + 1 < self.states.len() {
                    self.cursor += 1;
                }
            }
            Op::Jump(index) => {
                if *index < self.states.len() {
                    self.cursor = *index;
                }
            }
        }
    }
}

fn apply(store: &Store<String>, history: &History<String>, op: &Op) {
    match op {
        Op::Append(ch) => {
            store
                .action("APPEND", |scope| {
                    scope.update(|s| s.push(*ch));
                    Ok(())
                })
                .expect("append commits");
        }
        Op::Undo => {
            history.undo().expect("undo outside batch");
        }
        Op::Redo => {
            history.redo().expect("redo outside batch");
        }
        Op::Jump(index) => {
            history.jump_to(*index).expect("jump outside batch");
        }
    }
}

// ============================================================================
// Invariant 1: Store state always matches the model at the cursor
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn state_tracks_model(ops in ops_strategy(60)) {
        let store = Store::new("pt-hist-model", String::new()).expect("store");
        let history = History::new(&store, HistoryConfig::unlimited());
        let mut model = Model::new();

        for op in &ops {
            apply(&store, &history, op);
            model.apply(op);
            prop_assert_eq!(&*store.snapshot(), &model.states[model.cursor],
                "diverged after {:?}", op);
            prop_assert_eq!(history.current_index(), model.cursor);
            prop_assert_eq!(history.len(), model.states.len());
            prop_assert_eq!(history.can_undo(), model.cursor > 0);
            prop_assert_eq!(history.can_redo(), model.cursor + 1 < model.states.len());
        }
    }
}

// ============================================================================
// Invariant 2: cursor always addresses an existing entry
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn cursor_stays_in_bounds(ops in ops_strategy(80)) {
        let store = Store::new("pt-hist-bounds", String::new()).expect("store");
        let history = History::new(&store, HistoryConfig::unlimited());

        for op in &ops {
            apply(&store, &history, op);
            prop_assert!(history.current_index() < history.len(),
                "cursor {} past {} entries after {:?}",
                history.current_index(), history.len(), op);
        }
    }
}

// ============================================================================
// Invariant 3: Entry cap is never exceeded
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn entry_cap_always_enforced(
        max_entries in 1usize..20,
        ops in ops_strategy(100)
    ) {
        let store = Store::new("pt-hist-cap", String::new()).expect("store");
        let history = History::new(&store, HistoryConfig::new(max_entries));

        for op in &ops {
            apply(&store, &history, op);
            prop_assert!(history.len() <= max_entries,
                "{} entries exceed cap {} after {:?}",
                history.len(), max_entries, op);
        }
    }
}

// ============================================================================
// Invariant 4: Full undo then full redo restores the final state
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn full_undo_full_redo_is_identity(
        fragments in prop::collection::vec(prop::char::range('a', 'z'), 1..30)
    ) {
        let store = Store::new("pt-hist-identity", String::new()).expect("store");
        let history = History::new(&store, HistoryConfig::unlimited());

        for ch in &fragments {
            store
                .action("APPEND", |scope| {
                    scope.update(|s| s.push(*ch));
                    Ok(())
                })
                .expect("append commits");
        }
        let final_state = store.snapshot();

        while history.undo().expect("undo") {}
        let rewound = store.snapshot();
        prop_assert_eq!(rewound.as_str(), "");

        while history.redo().expect("redo") {}
        prop_assert_eq!(&*store.snapshot(), &*final_state);
        prop_assert_eq!(history.len(), fragments.len() + 1,
            "time travel must not grow the timeline");
    }
}

// ============================================================================
// Invariant 5: Capturing after undo discards the redo tail
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn branch_discards_redo_tail(
        depth in 2usize..20,
        undos in 1usize..19
    ) {
        let store = Store::new("pt-hist-branch", String::new()).expect("store");
        let history = History::new(&store, HistoryConfig::unlimited());

        for _ in 0..depth {
            store
                .action("APPEND", |scope| {
                    scope.update(|s| s.push('x'));
                    Ok(())
                })
                .expect("append commits");
        }

        let undos = undos.min(depth);
        for _ in 0..undos {
            history.undo().expect("undo");
        }

        store
            .action("BRANCH", |scope| {
                scope.update(|s| s.push('B'));
                Ok(())
            })
            .expect("branch commits");

        prop_assert!(!history.can_redo(), "redo tail must be discarded");
        prop_assert_eq!(history.len(), depth - undos + 2);
        prop_assert_eq!(store.snapshot().len(), depth - undos + 1);
        prop_assert!(store.snapshot().ends_with('B'));
    }
}
