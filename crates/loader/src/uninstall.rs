//! `UNINSTALL EXTENSION` (spec §4.7).

use std::sync::Arc;

use vef_catalog::{TxnId, Victionary};
use vef_core::abi::raw;
use vef_core::abi::HOST_ABI_PROTOCOL_VERSION;
use vef_core::{ColumnEntry, Entry, Key};

use crate::error::{LoaderError, Result};
use crate::lock::{MetadataLockHost, StatementLocks};

/// Drives `UNINSTALL EXTENSION '<name>'` end to end: referential-integrity
/// refusal, marking every owned entry for deletion, persisting, and the
/// explicit unregister/unload teardown of the shared library (spec §4.7
/// "Uninstall").
pub fn uninstall_extension(
    catalog: &Victionary,
    lock_host: &dyn MetadataLockHost,
    txn: TxnId,
    name: &str,
) -> Result<()> {
    let _locks = StatementLocks::acquire(lock_host, name)
        .map_err(|source| LoaderError::Io { path: name.to_string(), source })?;

    let entry = catalog
        .extensions()?
        .all_committed()
        .into_iter()
        .find(|entry| entry.extension_name.as_str().eq_ignore_ascii_case(name))
        .ok_or_else(|| LoaderError::NotInstalled { name: name.to_string() })?;

    if let Some(referencing) = find_referencing_column(catalog, name)? {
        return Err(LoaderError::ReferencedByColumn {
            extension_name: name.to_string(),
            db: referencing.db.as_str().to_string(),
            table: referencing.table.as_str().to_string(),
            column: referencing.column.as_str().to_string(),
        });
    }

    // Every entry here carries two baseline references: the committed map's
    // own `Arc` and the clone this `Vec` holds for inspection. A genuine
    // pin (something acquired it via `acquire()`) adds a third.
    const BASELINE_REFS: usize = 2;

    let owned_type_contexts = catalog.owned_type_contexts(name)?;
    if let Some(pinned) = owned_type_contexts
        .iter()
        .find(|context| Arc::strong_count(context) > BASELINE_REFS)
    {
        return Err(LoaderError::StillPinned {
            extension_name: name.to_string(),
            what: format!("type context `{}`", pinned.type_name),
            use_count: Arc::strong_count(pinned) - BASELINE_REFS,
        });
    }
    let owned_type_descriptors = catalog.owned_type_descriptors(name)?;
    if let Some(pinned) = owned_type_descriptors
        .iter()
        .find(|descriptor| Arc::strong_count(descriptor) > BASELINE_REFS)
    {
        return Err(LoaderError::StillPinned {
            extension_name: name.to_string(),
            what: format!("type descriptor `{}`", pinned.type_name),
            use_count: Arc::strong_count(pinned) - BASELINE_REFS,
        });
    }

    let owned_extension_descriptors = catalog.owned_extension_descriptors(name)?;
    let descriptor_to_unregister = owned_extension_descriptors.first().cloned();

    mark_owned_for_deletion(
        catalog,
        txn,
        entry.extension_name.as_str(),
        &owned_type_contexts,
        &owned_type_descriptors,
        &owned_extension_descriptors,
    )?;

    catalog.write_all_uncommitted(txn)?;

    if let Some(descriptor) = descriptor_to_unregister {
        unregister_functions(&descriptor);
    }

    catalog.commit_all(txn)?;
    tracing::info!(event = "uninstall.succeeded", extension = name);
    Ok(())
}

fn find_referencing_column(catalog: &Victionary, name: &str) -> Result<Option<Arc<ColumnEntry>>> {
    Ok(catalog
        .columns()?
        .all_committed()
        .into_iter()
        .find(|column| column.extension_name.as_str().eq_ignore_ascii_case(name)))
}

#[allow(clippy::too_many_arguments)]
fn mark_owned_for_deletion(
    catalog: &Victionary,
    txn: TxnId,
    canonical_extension_name: &str,
    owned_type_contexts: &[Arc<vef_core::TypeContext>],
    owned_type_descriptors: &[Arc<vef_core::TypeDescriptor>],
    owned_extension_descriptors: &[Arc<vef_core::ExtensionDescriptor>],
) -> Result<()> {
    catalog.with_write(|writer| {
        for context in owned_type_contexts {
            writer.type_contexts_mut().mark_for_deletion(txn, context.key().as_str().to_string());
        }
        for descriptor in owned_type_descriptors {
            writer
                .type_descriptors_mut()
                .mark_for_deletion(txn, descriptor.key().as_str().to_string());
        }
        for descriptor in owned_extension_descriptors {
            writer
                .extension_descriptors_mut()
                .mark_for_deletion(txn, descriptor.key().as_str().to_string());
        }
        writer
            .extensions_mut()
            .mark_for_deletion(txn, vef_core::KeyExtension::new(canonical_extension_name)?.as_str().to_string());
        Ok(())
    })?;
    Ok(())
}

fn unregister_functions(descriptor: &vef_core::ExtensionDescriptor) {
    let mut unregister_arg = raw::UnregisterArg {
        host_protocol_version: HOST_ABI_PROTOCOL_VERSION,
    };
    (descriptor.unregister_fn)(&mut unregister_arg, descriptor.registration.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::test_support::AlwaysGrantLockHost;

    #[test]
    fn uninstall_rejects_unknown_extension() {
        let catalog = Victionary::new(
            Box::new(vef_catalog::persistence::test_support::InMemoryRowStore::new()),
            Box::new(vef_catalog::persistence::test_support::InMemoryRowStore::new()),
            Box::new(vef_catalog::persistence::test_support::InMemoryRowStore::new()),
        );
        catalog.bootstrap().unwrap();
        let result = uninstall_extension(&catalog, &AlwaysGrantLockHost, TxnId(1), "missing");
        assert!(matches!(result, Err(LoaderError::NotInstalled { .. })));
    }
}
