#![forbid(unsafe_code)]

//! Action log records.
//!
//! Every action invocation in a batch appends one [`ActionRecord`] to the
//! batch log, in call order, root first. Two synthetic record kinds exist
//! alongside named invocations: the `FLUSH` marker that replaces the
//! collapsed pre-flush log, and the `HISTORY_RESTORE` record synthesized
//! by [`Store::restore`](crate::Store::restore).

use std::fmt;

use serde_json::Value;
use web_time::Instant;

/// Log name of the synthetic flush-collapse marker.
pub const FLUSH: &str = "FLUSH";

/// Log name of the synthetic restore record.
pub const HISTORY_RESTORE: &str = "HISTORY_RESTORE";

/// What a log entry describes.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// A named action invocation, recorded before its body ran.
    Invoke {
        /// Action type name (e.g. `"INCREMENT"`).
        name: String,
        /// Action-specific data, if any.
        payload: Option<Value>,
    },
    /// Marker standing in for everything collapsed by a mid-batch flush.
    Flush {
        /// Names of the collapsed records, in their original call order.
        collapsed: Vec<String>,
    },
    /// State replacement through the restore path, bypassing batching.
    HistoryRestore,
}

/// One entry in a batch's ordered action log.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    kind: ActionKind,
    at: Instant,
}

impl ActionRecord {
    pub(crate) fn invoke(name: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: ActionKind::Invoke {
                name: name.into(),
                payload,
            },
            at: Instant::now(),
        }
    }

    pub(crate) fn flush(collapsed: Vec<String>) -> Self {
        Self {
            kind: ActionKind::Flush { collapsed },
            at: Instant::now(),
        }
    }

    pub(crate) fn history_restore() -> Self {
        Self {
            kind: ActionKind::HistoryRestore,
            at: Instant::now(),
        }
    }

    /// The record kind.
    #[must_use]
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Log name: the action type for invocations, [`FLUSH`] or
    /// [`HISTORY_RESTORE`] for synthetic records.
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.kind {
            ActionKind::Invoke { name, .. } => name,
            ActionKind::Flush { .. } => FLUSH,
            ActionKind::HistoryRestore => HISTORY_RESTORE,
        }
    }

    /// Payload of a named invocation, if one was attached.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match &self.kind {
            ActionKind::Invoke { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// Names collapsed into this record, for `FLUSH` markers.
    #[must_use]
    pub fn collapsed(&self) -> Option<&[String]> {
        match &self.kind {
            ActionKind::Flush { collapsed } => Some(collapsed),
            _ => None,
        }
    }

    /// When the record was created.
    #[must_use]
    pub fn at(&self) -> Instant {
        self.at
    }

    /// Whether this is the synthetic flush marker.
    #[must_use]
    pub fn is_flush(&self) -> bool {
        matches!(self.kind, ActionKind::Flush { .. })
    }

    /// Whether this is the synthetic restore record.
    #[must_use]
    pub fn is_history_restore(&self) -> bool {
        matches!(self.kind, ActionKind::HistoryRestore)
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Invoke {
                name,
                payload: Some(payload),
            } => write!(f, "{name}({payload})"),
            ActionKind::Invoke { name, .. } => write!(f, "{name}"),
            ActionKind::Flush { collapsed } => {
                write!(f, "{FLUSH}[{}]", collapsed.join(","))
            }
            ActionKind::HistoryRestore => write!(f, "{HISTORY_RESTORE}"),
        }
    }
}
