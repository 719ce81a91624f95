//! The Victionary (C5): the process-singleton catalog composing one map per
//! entry kind, arbitrating locking, driving commit/rollback, and exposing
//! prefix/all queries plus cross-kind helpers.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use vef_core::{CaseSetting, ColumnEntry, ExtensionDescriptor, ExtensionEntry, KeyColumnPrefix,
    KeyExtensionOwnedPrefix, PropertyEntry, TypeContext, TypeDescriptor};

use crate::acquire::{CleanupScope, acquire};
use crate::error::{CatalogError, Result};
use crate::pending::TxnId;
use crate::persistence::RowStore;
use crate::system_table_map::SystemTableMap;

const LOCK_POISONED: &str = "Victionary lock poisoned by a prior panic";

struct CatalogState {
    properties: SystemTableMap<PropertyEntry>,
    columns: SystemTableMap<ColumnEntry>,
    extensions: SystemTableMap<ExtensionEntry>,
    type_descriptors: SystemTableMap<TypeDescriptor>,
    extension_descriptors: SystemTableMap<ExtensionDescriptor>,
    type_contexts: SystemTableMap<TypeContext>,
    initialized: bool,
    /// Extension keys in the order their `ExtensionDescriptor` was
    /// committed, oldest first (spec §9 "teardown unloads all extensions
    /// in reverse registration order").
    registration_order: Vec<String>,
}

/// The process-singleton catalog. Construct one, `bootstrap` it once at
/// startup, then share it behind an `Arc` across sessions.
pub struct Victionary {
    state: RwLock<CatalogState>,
}

impl Victionary {
    pub fn new(
        properties_store: Box<dyn RowStore<PropertyEntry>>,
        columns_store: Box<dyn RowStore<ColumnEntry>>,
        extensions_store: Box<dyn RowStore<ExtensionEntry>>,
    ) -> Self {
        Self {
            state: RwLock::new(CatalogState {
                properties: SystemTableMap::persistent(properties_store),
                columns: SystemTableMap::persistent(columns_store),
                extensions: SystemTableMap::persistent(extensions_store),
                type_descriptors: SystemTableMap::memory_only(),
                extension_descriptors: SystemTableMap::memory_only(),
                type_contexts: SystemTableMap::memory_only(),
                initialized: false,
                registration_order: Vec::new(),
            }),
        }
    }

    /// Loads all three persistent maps from their backing tables. Must run
    /// to completion, single-threaded, before any lookup is served (spec
    /// §4.5 "Initialization").
    pub fn bootstrap(&self) -> Result<()> {
        let mut state = self.state.write().expect(LOCK_POISONED);
        state.properties.reload_from_table()?;
        state.columns.reload_from_table()?;
        state.extensions.reload_from_table()?;
        state.initialized = true;
        tracing::info!(event = "victionary.bootstrap_complete");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().expect(LOCK_POISONED).initialized
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, CatalogState>> {
        let guard = self.state.read().expect(LOCK_POISONED);
        if !guard.initialized {
            return Err(CatalogError::NotInitialized);
        }
        Ok(guard)
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, CatalogState>> {
        let guard = self.state.write().expect(LOCK_POISONED);
        if !guard.initialized {
            return Err(CatalogError::NotInitialized);
        }
        Ok(guard)
    }

    // -- per-kind accessors ------------------------------------------------

    pub fn properties(&self) -> Result<MapView<'_, PropertyEntry>> {
        Ok(MapView {
            guard: self.read_guard()?,
            select: |state| &state.properties,
        })
    }

    pub fn columns(&self) -> Result<MapView<'_, ColumnEntry>> {
        Ok(MapView {
            guard: self.read_guard()?,
            select: |state| &state.columns,
        })
    }

    pub fn extensions(&self) -> Result<MapView<'_, ExtensionEntry>> {
        Ok(MapView {
            guard: self.read_guard()?,
            select: |state| &state.extensions,
        })
    }

    pub fn type_descriptors(&self) -> Result<MapView<'_, TypeDescriptor>> {
        Ok(MapView {
            guard: self.read_guard()?,
            select: |state| &state.type_descriptors,
        })
    }

    pub fn extension_descriptors(&self) -> Result<MapView<'_, ExtensionDescriptor>> {
        Ok(MapView {
            guard: self.read_guard()?,
            select: |state| &state.extension_descriptors,
        })
    }

    pub fn type_contexts(&self) -> Result<MapView<'_, TypeContext>> {
        Ok(MapView {
            guard: self.read_guard()?,
            select: |state| &state.type_contexts,
        })
    }

    /// Write access for a caller that has already taken the Victionary's
    /// write lock conceptually by virtue of calling a mutating path; used by
    /// `vef-loader`'s install/uninstall to mark pending ops on every map
    /// under one held guard.
    pub fn with_write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut VictionaryWriter<'_>) -> Result<T>,
    {
        let mut guard = self.write_guard()?;
        let mut writer = VictionaryWriter { state: &mut guard };
        f(&mut writer)
    }

    // -- cross-map operations -----------------------------------------------

    /// Applies pending ops across every map in the fixed order (spec §4.5):
    /// Properties, Columns, Extensions, TypeDescriptors, ExtensionDescriptors,
    /// TypeContexts.
    pub fn commit_all(&self, txn: TxnId) -> Result<()> {
        let mut state = self.write_guard()?;
        state.properties.commit(txn);
        state.columns.commit(txn);
        state.extensions.commit(txn);
        state.type_descriptors.commit(txn);

        let descriptor_ops = state.extension_descriptors.peek_pending(txn).to_vec();
        state.extension_descriptors.commit(txn);
        apply_registration_order(&mut state.registration_order, &descriptor_ops);

        state.type_contexts.commit(txn);
        Ok(())
    }

    /// Discards pending ops across every map (same fixed order); committed
    /// state is untouched.
    pub fn rollback_all(&self, txn: TxnId) -> Result<()> {
        let mut state = self.write_guard()?;
        state.properties.rollback(txn);
        state.columns.rollback(txn);
        state.extensions.rollback(txn);
        state.type_descriptors.rollback(txn);
        state.extension_descriptors.rollback(txn);
        state.type_contexts.rollback(txn);
        Ok(())
    }

    /// Delegates to every persistent map's `write_uncommitted_to_table`.
    /// Must run inside the same host transaction that performs the DDL
    /// side effects (spec §4.5).
    pub fn write_all_uncommitted(&self, txn: TxnId) -> Result<()> {
        let state = self.write_guard()?;
        state
            .properties
            .write_uncommitted_to_table(txn)
            .map_err(|source| write_uncommitted_error("properties", source))?;
        state
            .columns
            .write_uncommitted_to_table(txn)
            .map_err(|source| write_uncommitted_error("columns", source))?;
        state
            .extensions
            .write_uncommitted_to_table(txn)
            .map_err(|source| write_uncommitted_error("extensions", source))?;
        Ok(())
    }

    pub fn get_custom_columns_for_table(
        &self,
        db: &str,
        table: &str,
        case_setting: CaseSetting,
    ) -> Result<Vec<Arc<ColumnEntry>>> {
        let state = self.read_guard()?;
        let prefix = KeyColumnPrefix::for_table(db, table, case_setting)?;
        Ok(state
            .columns
            .get_prefix_committed(prefix.as_str(), &prefix.range_end()))
    }

    /// Atomically looks up a committed `TypeContext` by key, acquiring it if
    /// present, or builds and inserts one via `factory` if absent (spec
    /// §4.4 `acquire_or_create`). Not part of a DDL transaction: the insert
    /// lands directly in committed state under the write lock.
    pub fn acquire_or_create_type_context<F>(
        &self,
        key: &str,
        scope: &mut CleanupScope,
        factory: F,
    ) -> Result<Arc<TypeContext>>
    where
        F: FnOnce() -> vef_core::Result<TypeContext>,
    {
        let mut state = self.write_guard()?;
        if let Some(existing) = state.type_contexts.get_committed(key) {
            return Ok(acquire(&existing, scope));
        }
        let built = Arc::new(factory()?);
        state
            .type_contexts
            .insert_committed_directly(key.to_string(), built.clone());
        Ok(acquire(&built, scope))
    }

    /// Every owned `TypeContext`/`TypeDescriptor`/`ExtensionDescriptor` for
    /// `extension_name`, for uninstall's reference-count and marking passes.
    pub fn owned_type_contexts(&self, extension_name: &str) -> Result<Vec<Arc<TypeContext>>> {
        let state = self.read_guard()?;
        let prefix = KeyExtensionOwnedPrefix::new(extension_name)?;
        Ok(state
            .type_contexts
            .get_prefix_committed(prefix.as_str(), &prefix.range_end()))
    }

    pub fn owned_type_descriptors(&self, extension_name: &str) -> Result<Vec<Arc<TypeDescriptor>>> {
        let state = self.read_guard()?;
        let prefix = KeyExtensionOwnedPrefix::new(extension_name)?;
        Ok(state
            .type_descriptors
            .get_prefix_committed(prefix.as_str(), &prefix.range_end()))
    }

    pub fn owned_extension_descriptors(
        &self,
        extension_name: &str,
    ) -> Result<Vec<Arc<ExtensionDescriptor>>> {
        let state = self.read_guard()?;
        let prefix = KeyExtensionOwnedPrefix::new(extension_name)?;
        Ok(state
            .extension_descriptors
            .get_prefix_committed(prefix.as_str(), &prefix.range_end()))
    }

    /// Extension descriptors in reverse registration order, for teardown
    /// (spec §9 Design Notes).
    pub fn shutdown_order(&self) -> Result<Vec<Arc<ExtensionDescriptor>>> {
        let state = self.read_guard()?;
        Ok(state
            .registration_order
            .iter()
            .rev()
            .filter_map(|key| state.extension_descriptors.get_committed(key))
            .collect())
    }
}

fn write_uncommitted_error(
    table: &str,
    source: crate::persistence::RowStoreError,
) -> CatalogError {
    CatalogError::WriteUncommitted {
        key: table.to_string(),
        source,
    }
}

fn apply_registration_order(
    order: &mut Vec<String>,
    ops: &[crate::pending::PendingOp<ExtensionDescriptor>],
) {
    use crate::pending::PendingOp;
    use crate::pending::EntryKeyStr;

    for op in ops {
        match op {
            PendingOp::Insert(entry) => {
                let key = entry.key_str().to_string();
                if !order.contains(&key) {
                    order.push(key);
                }
            }
            PendingOp::Delete(key) => {
                order.retain(|existing| existing != key);
            }
            PendingOp::Update { old_key, new } => {
                if let Some(old_key) = old_key {
                    order.retain(|existing| existing != old_key);
                }
                let key = new.key_str().to_string();
                if !order.contains(&key) {
                    order.push(key);
                }
            }
        }
    }
}

/// A read-locked view over one map, returned by the per-kind accessors.
pub struct MapView<'a, E: vef_core::Entry>
where
    E::Key: vef_core::Key,
{
    guard: RwLockReadGuard<'a, CatalogState>,
    select: fn(&CatalogState) -> &SystemTableMap<E>,
}

impl<'a, E: vef_core::Entry> MapView<'a, E>
where
    E: crate::pending::EntryKeyStr,
    E::Key: vef_core::Key,
{
    pub fn get(&self, txn: TxnId, key: &str) -> Option<Arc<E>> {
        (self.select)(&self.guard).get(txn, key)
    }

    pub fn get_committed(&self, key: &str) -> Option<Arc<E>> {
        (self.select)(&self.guard).get_committed(key)
    }

    pub fn all_committed(&self) -> Vec<Arc<E>> {
        (self.select)(&self.guard).all_committed()
    }
}

/// Write access to every map under one held guard, handed to a closure by
/// [`Victionary::with_write`].
pub struct VictionaryWriter<'a> {
    state: &'a mut CatalogState,
}

impl<'a> VictionaryWriter<'a> {
    pub fn properties_mut(&mut self) -> &mut SystemTableMap<PropertyEntry> {
        &mut self.state.properties
    }

    pub fn columns_mut(&mut self) -> &mut SystemTableMap<ColumnEntry> {
        &mut self.state.columns
    }

    pub fn extensions_mut(&mut self) -> &mut SystemTableMap<ExtensionEntry> {
        &mut self.state.extensions
    }

    pub fn type_descriptors_mut(&mut self) -> &mut SystemTableMap<TypeDescriptor> {
        &mut self.state.type_descriptors
    }

    pub fn extension_descriptors_mut(&mut self) -> &mut SystemTableMap<ExtensionDescriptor> {
        &mut self.state.extension_descriptors
    }

    pub fn type_contexts_mut(&mut self) -> &mut SystemTableMap<TypeContext> {
        &mut self.state.type_contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_support::InMemoryRowStore;

    fn empty_victionary() -> Victionary {
        Victionary::new(
            Box::new(InMemoryRowStore::new()),
            Box::new(InMemoryRowStore::new()),
            Box::new(InMemoryRowStore::new()),
        )
    }

    #[test]
    fn lookups_are_rejected_before_bootstrap() {
        let catalog = empty_victionary();
        assert!(catalog.properties().is_err());
    }

    #[test]
    fn bootstrap_then_lookup_succeeds() {
        let catalog = empty_victionary();
        catalog.bootstrap().unwrap();
        assert!(catalog.properties().unwrap().all_committed().is_empty());
    }

    #[test]
    fn commit_all_and_rollback_all_follow_fixed_order_without_panicking() {
        let catalog = empty_victionary();
        catalog.bootstrap().unwrap();
        let txn = TxnId(7);
        catalog
            .with_write(|writer| {
                writer.properties_mut().mark_for_insertion(
                    txn,
                    Arc::new(PropertyEntry::new("schema_version", Some("1".into()), None).unwrap()),
                );
                Ok(())
            })
            .unwrap();
        catalog.commit_all(txn).unwrap();
        assert_eq!(
            catalog
                .properties()
                .unwrap()
                .get_committed("schema_version")
                .unwrap()
                .value,
            Some("1".into())
        );

        let txn2 = TxnId(8);
        catalog
            .with_write(|writer| {
                writer.properties_mut().mark_for_deletion(txn2, "schema_version".to_string());
                Ok(())
            })
            .unwrap();
        catalog.rollback_all(txn2).unwrap();
        assert!(catalog.properties().unwrap().get_committed("schema_version").is_some());
    }
}
