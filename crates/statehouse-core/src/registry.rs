#![forbid(unsafe_code)]

//! Process-wide store identity registry.
//!
//! Every store declares a string identifier at construction. The registry
//! maps each identifier to the definition site that first claimed it
//! (`file:line:column`, captured via `#[track_caller]`). Claiming an
//! identifier again from the same site is idempotent, so constructing the
//! same store type repeatedly (in loops, tests, or re-renders) is fine;
//! claiming it from a different site fails, catching two unrelated store
//! definitions colliding on one identifier.
//!
//! Identifiers may not contain `'@'`: that separator joins the identifier
//! and the site tag in diagnostics.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::Location;
use std::sync::{Mutex, OnceLock};

use crate::error::StoreError;

/// Separator joining a store id and its definition-site tag.
pub const SITE_SEPARATOR: char = '@';

static REGISTRY: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();

fn global() -> &'static Mutex<HashMap<String, String>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Render a definition site as a registry tag.
fn site_tag(site: &Location<'_>) -> String {
    format!("{}:{}:{}", site.file(), site.line(), site.column())
}

/// Registration logic over an explicit map, shared by the global entry
/// point and unit tests.
fn register_in(
    map: &mut HashMap<String, String>,
    id: &str,
    site: String,
) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::InvalidStoreId {
            id: id.to_string(),
            reason: "store ids may not be empty",
        });
    }
    if id.contains(SITE_SEPARATOR) {
        return Err(StoreError::InvalidStoreId {
            id: id.to_string(),
            reason: "store ids may not contain '@'",
        });
    }
    match map.entry(id.to_string()) {
        Entry::Occupied(existing) if *existing.get() == site => Ok(()),
        Entry::Occupied(existing) => Err(StoreError::DuplicateStoreId {
            id: id.to_string(),
            first_site: existing.get().clone(),
            second_site: site,
        }),
        Entry::Vacant(slot) => {
            slot.insert(site);
            Ok(())
        }
    }
}

/// Register `id` for the given definition site.
pub(crate) fn register(id: &str, site: &Location<'_>) -> Result<(), StoreError> {
    let mut map = global().lock().unwrap_or_else(|e| e.into_inner());
    register_in(&mut map, id, site_tag(site))
}

/// Clear all registrations.
///
/// Test-isolation hook: call between test runs that intentionally re-claim
/// identifiers from new definition sites. Do not call from tests running
/// in parallel with other store constructions.
pub fn reset() {
    global().lock().unwrap_or_else(|e| e.into_inner()).clear();
}
