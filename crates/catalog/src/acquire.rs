//! RAII acquisition (spec §3 "Ownership and lifecycle", §4.4 `acquire`).
//!
//! `acquire` clones the committed `Arc<E>` and registers the clone with a
//! [`CleanupScope`]; as long as either the caller's clone or the scope's
//! clone is alive, the entry's reference count keeps it alive even if it is
//! later evicted from committed state. Clearing (dropping) the scope drops
//! its clone and returns the strong count to what it was before acquiring.

use std::any::Any;
use std::sync::Arc;

/// A statement-scoped or session-scoped cleanup handle. Dropping it (or
/// calling [`CleanupScope::clear`]) releases every entry acquired against
/// it.
#[derive(Default)]
pub struct CleanupScope {
    held: Vec<Arc<dyn Any + Send + Sync>>,
}

impl CleanupScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Releases every acquisition registered against this scope.
    pub fn clear(&mut self) {
        self.held.clear();
    }

    fn register<E: Send + Sync + 'static>(&mut self, entry: Arc<E>) {
        self.held.push(entry);
    }
}

/// Clones `entry` and registers the clone with `scope`, returning the
/// caller's own clone. The entry is kept alive by whichever of the two
/// clones (the caller's, the scope's) outlives the other.
pub fn acquire<E: Send + Sync + 'static>(entry: &Arc<E>, scope: &mut CleanupScope) -> Arc<E> {
    scope.register(entry.clone());
    entry.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vef_core::{CaseSetting, ExtensionEntry, Semver};

    fn sample() -> Arc<ExtensionEntry> {
        Arc::new(
            ExtensionEntry::new(
                "money",
                Semver::from_components(1, 0, 0, &[], &[]).unwrap(),
                "a".repeat(64),
            )
            .unwrap(),
        )
    }

    #[test]
    fn acquisition_keeps_entry_alive_matches_property_8() {
        let _ = CaseSetting::PreserveCase;
        let committed = sample();
        let baseline = Arc::strong_count(&committed);

        let mut scope = CleanupScope::new();
        let acquired = acquire(&committed, &mut scope);
        assert_eq!(Arc::strong_count(&committed), baseline + 2);

        drop(committed);
        assert_eq!(acquired.extension_name.as_str(), "money");

        drop(acquired);
        scope.clear();
        // Nothing left referencing the entry; no panic, no dangling access.
    }

    #[test]
    fn clearing_scope_restores_pre_acquire_count() {
        let committed = sample();
        let baseline = Arc::strong_count(&committed);
        let mut scope = CleanupScope::new();
        let acquired = acquire(&committed, &mut scope);
        drop(acquired);
        assert_eq!(Arc::strong_count(&committed), baseline + 1);
        scope.clear();
        assert_eq!(Arc::strong_count(&committed), baseline);
    }
}
