//! `INSTALL EXTENSION` (spec §4.7).

use std::sync::Arc;

use vef_catalog::{TxnId, Victionary};
use vef_core::{CoreError, ExtensionDescriptor, ExtensionEntry, Key, KeyExtension, TypeDescriptor, VefConfig};

use crate::archive::expand_and_read_manifest;
use crate::dynlib::load_and_handshake;
use crate::error::{LoaderError, Result};
use crate::lock::{MetadataLockHost, StatementLocks};

const MAX_NAME_LEN: usize = 64;

/// Validates an extension name against spec §4.7's install-time rule:
/// non-empty, ≤64 characters, starts with a letter, ends with a letter or
/// digit, and contains only `[A-Za-z0-9_-]`.
pub fn validate_extension_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid_name(name, "must be 1-64 characters"));
    }
    let mut chars = name.chars();
    let first = chars.next().expect("checked non-empty above");
    if !first.is_ascii_alphabetic() {
        return Err(invalid_name(name, "must start with a letter"));
    }
    let last = name.chars().next_back().expect("checked non-empty above");
    if !last.is_ascii_alphanumeric() {
        return Err(invalid_name(name, "must end with a letter or digit"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid_name(name, "must contain only letters, digits, `_`, `-`"));
    }
    Ok(())
}

fn invalid_name(name: &str, reason: &str) -> LoaderError {
    LoaderError::Core(CoreError::InvalidIdentifier {
        value: name.to_string(),
        reason: reason.to_string(),
    })
}

/// Drives `INSTALL EXTENSION '<name>'` end to end: name validation, early
/// rejection, archive expansion, the ABI handshake, and the transactional
/// catalog writes, rolling every side effect back on failure.
pub fn install_extension(
    config: &VefConfig,
    catalog: &Victionary,
    lock_host: &dyn MetadataLockHost,
    txn: TxnId,
    name: &str,
) -> Result<()> {
    validate_extension_name(name)?;

    let _locks = StatementLocks::acquire(lock_host, name)
        .map_err(|source| LoaderError::Io { path: name.to_string(), source })?;

    let extension_key = KeyExtension::new(name)?;
    if catalog.extensions()?.get_committed(extension_key.as_str()).is_some() {
        return Err(LoaderError::AlreadyInstalled { name: name.to_string() });
    }

    let archive_path = config.archive_path(name);
    let expanded = expand_and_read_manifest(&archive_path, &config.expanded_dir(), name)?;

    let shared_library_path = expanded.shared_library_path(name);
    let loaded = load_and_handshake(&shared_library_path, name)?;

    if loaded.extension_version.to_string() != expanded.version {
        tracing::warn!(
            event = "install.manifest_version_mismatch",
            extension = name,
            manifest_version = %expanded.version,
            reported_version = %loaded.extension_version,
        );
    }

    let unregister_fn = loaded.unregister_fn;
    let registration = loaded.registration;

    let result = apply_install_writes(catalog, txn, name, &expanded.hash, loaded);
    match result {
        Ok(()) => {
            tracing::info!(event = "install.succeeded", extension = name, hash = %expanded.hash);
            Ok(())
        }
        Err(error) => {
            catalog.rollback_all(txn)?;
            unregister_fn(
                &mut vef_core::abi::raw::UnregisterArg {
                    host_protocol_version: vef_core::abi::HOST_ABI_PROTOCOL_VERSION,
                },
                registration.0,
            );
            tracing::error!(event = "install.failed", extension = name, %error);
            Err(error)
        }
    }
}

fn apply_install_writes(
    catalog: &Victionary,
    txn: TxnId,
    name: &str,
    archive_hash: &str,
    loaded: crate::dynlib::LoadedExtension,
) -> Result<()> {
    let extension_version = loaded.extension_version.clone();
    let library_handle = loaded.library_handle.clone();

    let type_descriptors: Vec<Arc<TypeDescriptor>> =
        loaded.type_descriptors.into_iter().map(Arc::new).collect();

    let descriptor = ExtensionDescriptor::new(
        name,
        extension_version.clone(),
        library_handle,
        loaded.unregister_fn,
        loaded.registration,
        loaded.functions,
    )?;

    catalog.with_write(|writer| {
        for type_descriptor in &type_descriptors {
            writer
                .type_descriptors_mut()
                .mark_for_insertion(txn, type_descriptor.clone());
        }
        writer
            .extension_descriptors_mut()
            .mark_for_insertion(txn, Arc::new(descriptor));

        let entry = ExtensionEntry::new(name, extension_version, archive_hash.to_string())?;
        writer.extensions_mut().mark_for_insertion(txn, Arc::new(entry));
        Ok(())
    })?;

    catalog.write_all_uncommitted(txn)?;
    catalog.commit_all(txn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation_matches_spec_rules() {
        assert!(validate_extension_name("money").is_ok());
        assert!(validate_extension_name("money_v2").is_ok());
        assert!(validate_extension_name("").is_err());
        assert!(validate_extension_name("1money").is_err());
        assert!(validate_extension_name("money_").is_err());
        assert!(validate_extension_name("money!").is_err());
        assert!(validate_extension_name(&"a".repeat(65)).is_err());
    }
}
