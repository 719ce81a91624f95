//! Fixture builders shared by `vef-catalog`/`vef-loader`/`vef-engine`
//! integration tests: a bootstrapped in-memory [`Victionary`] and the
//! [`complex_extension`](crate::complex_extension) sample registered into it
//! without going through a real `.veb` archive or `libloading`.

use std::sync::Arc;

use vef_catalog::acquire::CleanupScope;
use vef_catalog::persistence::test_support::InMemoryRowStore;
use vef_catalog::pending::TxnId;
use vef_catalog::Victionary;
use vef_core::abi::raw::{self, RawTypeKind};
use vef_core::abi::{AbiTypeTag, FunctionSignature};
use vef_core::{ExtensionDescriptor, ExtensionEntry, PersistedLength, RegistrationHandle, TypeDescriptor};

use crate::complex_extension;

/// A freshly bootstrapped catalog backed by empty in-memory row stores.
pub fn bootstrapped_catalog() -> Victionary {
    let catalog = Victionary::new(
        Box::new(InMemoryRowStore::new()),
        Box::new(InMemoryRowStore::new()),
        Box::new(InMemoryRowStore::new()),
    );
    catalog.bootstrap().expect("bootstrap of an empty catalog cannot fail");
    catalog
}

/// What [`install_complex_extension`] registered, so a test can reach the
/// raw registration pointer to call `complex_extension::vef_unregister`
/// itself if it wants to exercise uninstall.
pub struct InstalledComplexExtension {
    pub extension_name: String,
    pub extension_version: vef_core::Semver,
    pub registration: RegistrationHandle,
    pub unregister_fn: vef_core::abi::UnregisterFn,
    pub functions: Vec<FunctionSignature>,
}

/// Registers the `complex_sample` extension (spec §8 properties 11/12)
/// directly into `catalog`'s committed state, skipping the archive/dynlib
/// machinery `vef-loader::install` would otherwise drive. Tests that need to
/// exercise the full install sequence should go through `vef-loader`
/// instead; this is for tests that only care about what comes after install.
pub fn install_complex_extension(catalog: &Victionary) -> InstalledComplexExtension {
    let registration_ptr = complex_extension::vef_register(std::ptr::null());
    let registration = unsafe { &*registration_ptr };
    let extension_name = "complex_sample".to_string();
    let extension_version = vef_core::parse_semver("1.0.0").unwrap();

    let raw_types =
        unsafe { std::slice::from_raw_parts(registration.types, registration.type_count) };
    let type_descriptors: Vec<TypeDescriptor> = raw_types
        .iter()
        .map(|raw_type| {
            let name = unsafe {
                std::str::from_utf8(std::slice::from_raw_parts(
                    raw_type.name_ptr as *const u8,
                    raw_type.name_len,
                ))
                .unwrap()
                .to_string()
            };
            let persisted_length = if raw_type.persisted_length < 0 {
                PersistedLength::Variable
            } else {
                PersistedLength::Fixed(raw_type.persisted_length as u32)
            };
            TypeDescriptor::new(
                &name,
                &extension_name,
                extension_version.clone(),
                persisted_length,
                raw_type.max_decode_buffer_length as u32,
                raw_type.encode,
                raw_type.decode,
                raw_type.compare,
                raw_type.hash,
            )
            .expect("complex_sample's type descriptors are well-formed")
        })
        .collect();

    let raw_functions =
        unsafe { std::slice::from_raw_parts(registration.functions, registration.function_count) };
    let functions: Vec<FunctionSignature> = raw_functions
        .iter()
        .map(|raw_function| {
            let name = unsafe {
                std::str::from_utf8(std::slice::from_raw_parts(
                    raw_function.name_ptr as *const u8,
                    raw_function.name_len,
                ))
                .unwrap()
                .to_string()
            };
            let raw_params = unsafe {
                std::slice::from_raw_parts(raw_function.params, raw_function.param_count)
            };
            let params = raw_params.iter().map(|tag| read_tag(tag)).collect();
            FunctionSignature {
                name,
                params,
                return_type: read_tag(&raw_function.return_type),
                vdf_fn: raw_function.vdf,
                prerun_fn: raw_function.prerun,
                postrun_fn: raw_function.postrun,
            }
        })
        .collect();

    let registration_handle = RegistrationHandle(registration_ptr);
    let descriptor = ExtensionDescriptor::new(
        &extension_name,
        extension_version.clone(),
        Arc::new(()) as Arc<dyn std::any::Any + Send + Sync>,
        complex_extension::vef_unregister,
        registration_handle,
        functions.clone(),
    )
    .expect("complex_sample's descriptor is well-formed");

    let txn = TxnId(1);
    catalog
        .with_write(|writer| {
            for descriptor in &type_descriptors {
                writer
                    .type_descriptors_mut()
                    .mark_for_insertion(txn, Arc::new(descriptor.clone()));
            }
            writer
                .extension_descriptors_mut()
                .mark_for_insertion(txn, Arc::new(descriptor));
            writer.extensions_mut().mark_for_insertion(
                txn,
                Arc::new(
                    ExtensionEntry::new(&extension_name, extension_version.clone(), "0".repeat(64))
                        .expect("complex_sample's extension entry is well-formed"),
                ),
            );
            Ok(())
        })
        .expect("write lock is always available on a fresh catalog");
    catalog.commit_all(txn).expect("commit on a fresh catalog cannot fail");

    InstalledComplexExtension {
        extension_name,
        extension_version,
        registration: registration_handle,
        unregister_fn: complex_extension::vef_unregister,
        functions,
    }
}

fn read_tag(tag: &raw::RawTypeTag) -> AbiTypeTag {
    match tag.kind {
        RawTypeKind::String => AbiTypeTag::String,
        RawTypeKind::Real => AbiTypeTag::Real,
        RawTypeKind::Int => AbiTypeTag::Int,
        RawTypeKind::Custom => {
            let name = unsafe {
                std::str::from_utf8(std::slice::from_raw_parts(
                    tag.custom_name_ptr as *const u8,
                    tag.custom_name_len,
                ))
                .unwrap()
                .to_string()
            };
            AbiTypeTag::Custom(name)
        }
    }
}

/// A no-op [`CleanupScope`] for tests that don't care about pin accounting.
pub fn scratch_scope() -> CleanupScope {
    CleanupScope::new()
}
