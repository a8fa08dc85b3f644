#![forbid(unsafe_code)]

//! Undo/redo history overlay for `statehouse-core` stores.
//!
//! A [`History`] attaches to a [`statehouse_core::Store`] and maintains a
//! timeline of committed snapshots plus a cursor into it. Moving the cursor
//! (undo, redo, jump) restores the corresponding snapshot through the
//! store's restore path, so regular subscribers observe time travel the
//! same way they observe any other change.
//!
//! # Quick Start
//!
//! ```no_run
//! use statehouse_core::Store;
//! use statehouse_history::{History, HistoryConfig};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Doc { text: String }
//!
//! # fn main() -> Result<(), statehouse_core::StoreError> {
//! let store = Store::new("doc", Doc { text: String::new() })?;
//! let history = History::new(&store, HistoryConfig::default());
//!
//! store.action("TYPE", |scope| {
//!     scope.update(|d| d.text.push('a'));
//!     Ok(())
//! })?;
//!
//! assert!(history.can_undo());
//! history.undo()?;
//! assert_eq!(store.snapshot().text, "");
//! # Ok(())
//! # }
//! ```

pub mod history;

pub use history::{History, HistoryConfig, HistoryEntry};
