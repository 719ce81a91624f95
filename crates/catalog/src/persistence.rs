//! The row-store seam: the host collaborator persistent maps replay their
//! pending operations against (spec §4.4 persistence, §6 system tables).
//!
//! This crate does not implement a row store itself — the host's
//! transactional table storage is explicitly out of scope (spec §1) — it
//! only defines the contract consumed from it.

use std::fmt;

use vef_core::Entry;

#[derive(Debug)]
pub enum RowStoreError {
    Io(String),
    RowNotFound { key: String },
}

impl fmt::Display for RowStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(message) => write!(f, "row store io error: {message}"),
            Self::RowNotFound { key } => write!(f, "row store has no row for key `{key}`"),
        }
    }
}

impl std::error::Error for RowStoreError {}

/// Whether an UPDATE actually changed the row. A row store may report
/// `Unchanged` when the target row already equals the source (spec §4.4
/// idempotency note); that is treated as success, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    Unchanged,
}

/// A host-provided transactional row store with an ordered primary index,
/// backing one persistent [`crate::system_table_map::SystemTableMap`].
pub trait RowStore<E: Entry>: Send + Sync {
    /// Full table scan for [`crate::system_table_map::SystemTableMap::reload_from_table`].
    /// Each element is independent: a row-level error does not abort the
    /// remaining scan.
    fn scan_all(&self) -> Box<dyn Iterator<Item = Result<E, RowStoreError>> + '_>;

    fn insert_row(&self, entry: &E) -> Result<(), RowStoreError>;

    /// Index-lookup by `old_key`, then update in place to `new`'s fields
    /// (including a changed key, if any).
    fn update_row(&self, old_key: &str, new: &E) -> Result<UpdateOutcome, RowStoreError>;

    fn delete_row(&self, key: &str) -> Result<(), RowStoreError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use vef_core::{Entry, Key};

    use super::{RowStore, RowStoreError, UpdateOutcome};
    use crate::pending::EntryKeyStr;

    /// An in-memory stand-in for a host row store, used by unit and
    /// integration tests across the workspace.
    pub struct InMemoryRowStore<E> {
        rows: Mutex<BTreeMap<String, E>>,
        bad_row_count: usize,
    }

    impl<E: Clone> InMemoryRowStore<E> {
        pub fn new() -> Self {
            Self {
                rows: Mutex::new(BTreeMap::new()),
                bad_row_count: 0,
            }
        }

        pub fn new_with_bad_rows(bad_row_count: usize) -> Self {
            Self {
                rows: Mutex::new(BTreeMap::new()),
                bad_row_count,
            }
        }

        pub fn seed(&self, entry: E)
        where
            E: EntryKeyStr,
        {
            self.rows
                .lock()
                .unwrap()
                .insert(entry.key_str().to_string(), entry);
        }

        pub fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl<E: Clone> Default for InMemoryRowStore<E> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<E> RowStore<E> for InMemoryRowStore<E>
    where
        E: Entry + EntryKeyStr + Clone + Send + Sync,
        E::Key: Key,
    {
        fn scan_all(&self) -> Box<dyn Iterator<Item = Result<E, RowStoreError>> + '_> {
            let rows = self.rows.lock().unwrap();
            let mut results: Vec<Result<E, RowStoreError>> =
                rows.values().cloned().map(Ok).collect();
            for index in 0..self.bad_row_count {
                results.push(Err(RowStoreError::Io(format!("synthetic bad row {index}"))));
            }
            Box::new(results.into_iter())
        }

        fn insert_row(&self, entry: &E) -> Result<(), RowStoreError> {
            self.rows
                .lock()
                .unwrap()
                .insert(entry.key_str().to_string(), entry.clone());
            Ok(())
        }

        fn update_row(&self, old_key: &str, new: &E) -> Result<UpdateOutcome, RowStoreError> {
            let mut rows = self.rows.lock().unwrap();
            if !rows.contains_key(old_key) {
                return Err(RowStoreError::RowNotFound {
                    key: old_key.to_string(),
                });
            }
            let unchanged = rows.get(old_key).map(|existing| {
                existing.key_str() == new.key_str()
            });
            rows.remove(old_key);
            rows.insert(new.key_str().to_string(), new.clone());
            Ok(if unchanged == Some(true) {
                UpdateOutcome::Unchanged
            } else {
                UpdateOutcome::Updated
            })
        }

        fn delete_row(&self, key: &str) -> Result<(), RowStoreError> {
            self.rows
                .lock()
                .unwrap()
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| RowStoreError::RowNotFound {
                    key: key.to_string(),
                })
        }
    }
}
