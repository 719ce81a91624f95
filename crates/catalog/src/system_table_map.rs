//! `SystemTableMap<E>` (C4): committed state plus per-transaction pending
//! operations for one entry kind, with optional persistence to a row store.
//!
//! A map never takes its own lock. Its methods take `&self`/`&mut self`,
//! and the only way to obtain those references is through the
//! [`crate::victionary::Victionary`]'s single reader-writer lock — so the
//! "all read operations require the shared lock; all mutating operations
//! require the exclusive lock" rule from spec §4.4 is enforced by the
//! borrow checker rather than by a runtime assertion.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use vef_core::{Entry, Key};

use crate::pending::{EntryKeyStr, PendingLookup, PendingOp, TxnId, lookup_pending};
use crate::persistence::{RowStore, RowStoreError};

/// One entry kind's committed state and every active transaction's pending
/// intents against it.
pub struct SystemTableMap<E: Entry>
where
    E::Key: Key,
{
    committed: BTreeMap<String, Arc<E>>,
    pending: HashMap<TxnId, Vec<PendingOp<E>>>,
    row_store: Option<Box<dyn RowStore<E>>>,
}

impl<E: Entry> SystemTableMap<E>
where
    E: EntryKeyStr,
    E::Key: Key,
{
    /// A memory-only map (spec §4.4: `TypeDescriptors`, `ExtensionDescriptors`,
    /// `TypeContexts`).
    pub fn memory_only() -> Self {
        Self {
            committed: BTreeMap::new(),
            pending: HashMap::new(),
            row_store: None,
        }
    }

    /// A persistent map backed by a host row store (spec §4.4: `Properties`,
    /// `Columns`, `Extensions`).
    pub fn persistent(row_store: Box<dyn RowStore<E>>) -> Self {
        Self {
            committed: BTreeMap::new(),
            pending: HashMap::new(),
            row_store: Some(row_store),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.row_store.is_some()
    }

    // -- reads --------------------------------------------------------

    /// Most recent pending op for `(txn, key)` if any, else the committed
    /// entry.
    pub fn get(&self, txn: TxnId, key: &str) -> Option<Arc<E>> {
        if let Some(ops) = self.pending.get(&txn) {
            match lookup_pending(ops, key) {
                PendingLookup::Present(entry) => return Some(entry),
                PendingLookup::Absent => return None,
                PendingLookup::NotTouched => {}
            }
        }
        self.get_committed(key)
    }

    pub fn get_committed(&self, key: &str) -> Option<Arc<E>> {
        self.committed.get(key).cloned()
    }

    pub fn get_prefix_committed(&self, prefix: &str, range_end: &str) -> Vec<Arc<E>> {
        self.committed
            .range(prefix.to_string()..range_end.to_string())
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn has_prefix_committed(&self, prefix: &str, range_end: &str) -> bool {
        self.committed
            .range(prefix.to_string()..range_end.to_string())
            .next()
            .is_some()
    }

    pub fn all_committed(&self) -> Vec<Arc<E>> {
        self.committed.values().cloned().collect()
    }

    /// Bypasses the pending/commit round trip to insert directly into
    /// committed state. Used only by [`crate::victionary::Victionary`]'s
    /// `acquire_or_create` for memory-only kinds whose creation is not
    /// itself part of a DDL transaction (spec §4.4 `acquire_or_create`).
    pub(crate) fn insert_committed_directly(&mut self, key: String, entry: Arc<E>) {
        self.committed.insert(key, entry);
    }

    pub(crate) fn peek_pending(&self, txn: TxnId) -> &[PendingOp<E>] {
        self.pending.get(&txn).map(Vec::as_slice).unwrap_or(&[])
    }

    // -- pending mutation ----------------------------------------------

    pub fn mark_for_insertion(&mut self, txn: TxnId, entry: Arc<E>) {
        self.pending
            .entry(txn)
            .or_default()
            .push(PendingOp::Insert(entry));
    }

    pub fn mark_for_update(&mut self, txn: TxnId, old_key: Option<String>, new: Arc<E>) {
        self.pending
            .entry(txn)
            .or_default()
            .push(PendingOp::Update { old_key, new });
    }

    pub fn mark_for_deletion(&mut self, txn: TxnId, key: String) {
        self.pending
            .entry(txn)
            .or_default()
            .push(PendingOp::Delete(key));
    }

    // -- commit / rollback ----------------------------------------------

    /// Applies `txn`'s pending ops to committed state in append order and
    /// frees the pending list.
    pub fn commit(&mut self, txn: TxnId) {
        let Some(ops) = self.pending.remove(&txn) else {
            return;
        };
        for op in ops {
            match op {
                PendingOp::Insert(entry) => {
                    self.committed.insert(entry.key_str().to_string(), entry);
                }
                PendingOp::Update { old_key, new } => {
                    let new_key = new.key_str().to_string();
                    if let Some(old_key) = old_key {
                        if old_key != new_key {
                            self.committed.remove(&old_key);
                        }
                    }
                    self.committed.insert(new_key, new);
                }
                PendingOp::Delete(key) => {
                    self.committed.remove(&key);
                }
            }
        }
    }

    /// Discards `txn`'s pending list; committed state is untouched.
    pub fn rollback(&mut self, txn: TxnId) {
        self.pending.remove(&txn);
    }

    // -- persistence (persistent mode only) ------------------------------

    /// Clears and repopulates committed state via a full table scan.
    /// Row-store errors are logged per-row; the map continues loading the
    /// remaining rows.
    pub fn reload_from_table(&mut self) -> Result<(), RowStoreError> {
        let Some(row_store) = self.row_store.as_ref() else {
            return Ok(());
        };
        self.committed.clear();
        for result in row_store.scan_all() {
            match result {
                Ok(entry) => {
                    self.committed.insert(entry.key_str().to_string(), Arc::new(entry));
                }
                Err(error) => {
                    tracing::error!(event = "system_table_map.reload_row_failed", %error);
                }
            }
        }
        Ok(())
    }

    /// Replays `txn`'s pending ops against the row store. Must run before
    /// host commit so row writes land in the same host transaction. Fails
    /// the whole DDL on the first row-store error.
    pub fn write_uncommitted_to_table(&self, txn: TxnId) -> Result<(), RowStoreError> {
        let Some(row_store) = self.row_store.as_ref() else {
            return Ok(());
        };
        let Some(ops) = self.pending.get(&txn) else {
            return Ok(());
        };
        for op in ops {
            match op {
                PendingOp::Insert(entry) => row_store.insert_row(entry)?,
                PendingOp::Update { old_key, new } => {
                    let lookup_key = old_key.clone().unwrap_or_else(|| new.key_str().to_string());
                    row_store.update_row(&lookup_key, new)?;
                }
                PendingOp::Delete(key) => row_store.delete_row(key)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_support::InMemoryRowStore;
    use vef_core::{CaseSetting, ColumnEntry, Semver};

    fn sample_column(table: &str, column: &str) -> Arc<ColumnEntry> {
        Arc::new(
            ColumnEntry::new(
                "shop",
                table,
                column,
                CaseSetting::FoldOnLookup,
                "money",
                Semver::from_components(1, 0, 0, &[], &[]).unwrap(),
                "MONEY",
            )
            .unwrap(),
        )
    }

    #[test]
    fn pending_visibility_matches_property_3() {
        let mut map: SystemTableMap<ColumnEntry> = SystemTableMap::memory_only();
        let txn = TxnId(1);
        let entry = sample_column("orders", "total");
        let key = entry.key_str().to_string();

        map.mark_for_insertion(txn, entry.clone());
        assert_eq!(map.get(txn, &key).as_deref(), Some(entry.as_ref()));
        assert!(map.get_committed(&key).is_none());

        map.commit(txn);
        assert!(map.get_committed(&key).is_some());

        let txn2 = TxnId(2);
        map.mark_for_deletion(txn2, key.clone());
        map.rollback(txn2);
        assert!(map.get_committed(&key).is_some());
    }

    #[test]
    fn per_key_op_ordering_matches_property_4() {
        let mut map: SystemTableMap<ColumnEntry> = SystemTableMap::memory_only();
        let txn = TxnId(1);
        let v1 = sample_column("orders", "total");
        let key = v1.key_str().to_string();
        let v2 = sample_column("orders", "total");
        let v3 = sample_column("orders", "total");

        map.mark_for_insertion(txn, v1);
        map.mark_for_update(txn, None, v2);
        map.mark_for_update(txn, None, v3.clone());
        map.commit(txn);
        assert_eq!(map.get_committed(&key).as_deref(), Some(v3.as_ref()));

        let txn2 = TxnId(2);
        let v4 = sample_column("orders", "total");
        map.mark_for_insertion(txn2, v3.clone());
        map.mark_for_deletion(txn2, key.clone());
        map.mark_for_insertion(txn2, v4.clone());
        map.commit(txn2);
        assert_eq!(map.get_committed(&key).as_deref(), Some(v4.as_ref()));

        let txn3 = TxnId(3);
        map.mark_for_insertion(txn3, v4);
        map.mark_for_update(txn3, None, sample_column("orders", "total"));
        map.mark_for_deletion(txn3, key.clone());
        map.commit(txn3);
        assert!(map.get_committed(&key).is_none());
    }

    #[test]
    fn cross_key_independence_matches_property_5() {
        let mut map: SystemTableMap<ColumnEntry> = SystemTableMap::memory_only();
        let txn = TxnId(1);
        let a = sample_column("orders", "a");
        let b = sample_column("orders", "b");
        map.mark_for_insertion(txn, a.clone());
        assert!(map.get(txn, b.key_str()).is_none());
        assert_eq!(map.get(txn, a.key_str()).as_deref(), Some(a.as_ref()));
    }

    #[test]
    fn transaction_isolation_matches_property_6() {
        let mut map: SystemTableMap<ColumnEntry> = SystemTableMap::memory_only();
        let txn1 = TxnId(1);
        let txn2 = TxnId(2);
        let entry = sample_column("orders", "total");
        map.mark_for_insertion(txn1, entry.clone());
        assert!(map.get(txn2, entry.key_str()).is_none());
        assert!(map.get_committed(entry.key_str()).is_none());
        map.commit(txn1);
        assert!(map.get(txn2, entry.key_str()).is_some());
    }

    #[test]
    fn prefix_scan_matches_property_7() {
        let mut map: SystemTableMap<ColumnEntry> = SystemTableMap::memory_only();
        let txn = TxnId(1);
        for column in ["a", "b", "c"] {
            map.mark_for_insertion(txn, sample_column("orders", column));
        }
        map.mark_for_insertion(txn, sample_column("invoices", "a"));
        map.commit(txn);

        let prefix = vef_core::KeyColumnPrefix::for_table(
            "shop",
            "orders",
            vef_core::CaseSetting::FoldOnLookup,
        )
        .unwrap();
        let matches = map.get_prefix_committed(prefix.as_str(), &prefix.range_end());
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn reload_from_table_logs_and_skips_bad_rows() {
        let store = InMemoryRowStore::<ColumnEntry>::new_with_bad_rows(1);
        let mut map: SystemTableMap<ColumnEntry> = SystemTableMap::persistent(Box::new(store));
        map.reload_from_table().unwrap();
        assert_eq!(map.all_committed().len(), 0);
    }
}
