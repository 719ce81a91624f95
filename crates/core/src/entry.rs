//! Entry payloads for each catalog entity kind (C3).
//!
//! An entry is `(key, payload)`; the key is immutable once constructed and
//! is always derived from the payload's identifying fields, so there is no
//! way to build an entry whose key disagrees with its own data.

use std::any::Any;
use std::sync::Arc;

use crate::abi::{CompareFn, DecodeFn, EncodeFn, FunctionSignature, HashFn, RegistrationHandle, UnregisterFn};
use crate::error::Result;
use crate::ident::CaseSetting;
use crate::key::{DisplayIdent, KeyColumn, KeyExtension, KeyExtensionDescriptor, KeyProperty,
    KeyTypeContext, KeyTypeDescriptor};
use crate::semver::Semver;

/// Implemented by every entry payload so generic catalog code can fetch the
/// key without matching on the concrete entry type.
pub trait Entry {
    type Key;
    fn key(&self) -> &Self::Key;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    key: KeyProperty,
    name: DisplayIdent,
    pub value: Option<String>,
    pub description: Option<String>,
}

impl PropertyEntry {
    pub fn new(name: &str, value: Option<String>, description: Option<String>) -> Result<Self> {
        let key = KeyProperty::new(name)?;
        Ok(Self {
            key,
            name: DisplayIdent::from_normalized(&crate::ident::normalize_property(name)?),
            value,
            description,
        })
    }

    pub fn name(&self) -> &DisplayIdent {
        &self.name
    }
}

impl Entry for PropertyEntry {
    type Key = KeyProperty;
    fn key(&self) -> &KeyProperty {
        &self.key
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEntry {
    key: KeyColumn,
    pub db: DisplayIdent,
    pub table: DisplayIdent,
    pub column: DisplayIdent,
    pub extension_name: DisplayIdent,
    pub extension_version: Semver,
    pub type_name: DisplayIdent,
}

impl ColumnEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: &str,
        table: &str,
        column: &str,
        case_setting: CaseSetting,
        extension_name: &str,
        extension_version: Semver,
        type_name: &str,
    ) -> Result<Self> {
        let key = KeyColumn::new(db, table, column, case_setting)?;
        Ok(Self {
            key,
            db: DisplayIdent::from_normalized(&crate::ident::normalize_database(db, case_setting)?),
            table: DisplayIdent::from_normalized(&crate::ident::normalize_table(table, case_setting)?),
            column: DisplayIdent::from_normalized(&crate::ident::normalize_column(column)?),
            extension_name: DisplayIdent::from_normalized(&crate::ident::normalize_extension(
                extension_name,
            )?),
            extension_version,
            type_name: DisplayIdent::from_normalized(&crate::ident::normalize_type(type_name)?),
        })
    }

    pub fn references_extension(&self, extension_name: &str, version: &Semver) -> bool {
        self.extension_name.as_str().eq_ignore_ascii_case(extension_name)
            && &self.extension_version == version
    }
}

impl Entry for ColumnEntry {
    type Key = KeyColumn;
    fn key(&self) -> &KeyColumn {
        &self.key
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionEntry {
    key: KeyExtension,
    pub extension_name: DisplayIdent,
    pub extension_version: Semver,
    pub archive_hash: String,
}

impl ExtensionEntry {
    pub fn new(extension_name: &str, extension_version: Semver, archive_hash: String) -> Result<Self> {
        let key = KeyExtension::new(extension_name)?;
        Ok(Self {
            key,
            extension_name: DisplayIdent::from_normalized(&crate::ident::normalize_extension(
                extension_name,
            )?),
            extension_version,
            archive_hash,
        })
    }
}

impl Entry for ExtensionEntry {
    type Key = KeyExtension;
    fn key(&self) -> &KeyExtension {
        &self.key
    }
}

/// Fixed byte size, or variable-length with a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedLength {
    Fixed(u32),
    Variable,
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    key: KeyTypeDescriptor,
    pub type_name: DisplayIdent,
    pub extension_name: DisplayIdent,
    pub extension_version: Semver,
    pub persisted_length: PersistedLength,
    pub max_decode_length: u32,
    pub encode_fn: EncodeFn,
    pub decode_fn: DecodeFn,
    pub compare_fn: CompareFn,
    pub hash_fn: Option<HashFn>,
}

impl TypeDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        type_name: &str,
        extension_name: &str,
        extension_version: Semver,
        persisted_length: PersistedLength,
        max_decode_length: u32,
        encode_fn: EncodeFn,
        decode_fn: DecodeFn,
        compare_fn: CompareFn,
        hash_fn: Option<HashFn>,
    ) -> Result<Self> {
        let key = KeyTypeDescriptor::new(type_name, extension_name, &extension_version)?;
        Ok(Self {
            key,
            type_name: DisplayIdent::from_normalized(&crate::ident::normalize_type(type_name)?),
            extension_name: DisplayIdent::from_normalized(&crate::ident::normalize_extension(
                extension_name,
            )?),
            extension_version,
            persisted_length,
            max_decode_length,
            encode_fn,
            decode_fn,
            compare_fn,
            hash_fn,
        })
    }
}

impl Entry for TypeDescriptor {
    type Key = KeyTypeDescriptor;
    fn key(&self) -> &KeyTypeDescriptor {
        &self.key
    }
}

#[derive(Clone)]
pub struct ExtensionDescriptor {
    key: KeyExtensionDescriptor,
    pub extension_name: DisplayIdent,
    pub extension_version: Semver,
    /// Keeps the loaded shared library (an opaque `libloading::Library` in
    /// `vef-loader`) alive for as long as this descriptor is reachable.
    pub library_handle: Arc<dyn Any + Send + Sync>,
    pub unregister_fn: UnregisterFn,
    /// Passed back to `unregister_fn` verbatim on uninstall (spec §6).
    pub registration: RegistrationHandle,
    pub functions: Vec<FunctionSignature>,
}

impl std::fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("extension_name", &self.extension_name)
            .field("extension_version", &self.extension_version)
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

impl ExtensionDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extension_name: &str,
        extension_version: Semver,
        library_handle: Arc<dyn Any + Send + Sync>,
        unregister_fn: UnregisterFn,
        registration: RegistrationHandle,
        functions: Vec<FunctionSignature>,
    ) -> Result<Self> {
        let key = KeyExtensionDescriptor::new(extension_name, &extension_version)?;
        Ok(Self {
            key,
            extension_name: DisplayIdent::from_normalized(&crate::ident::normalize_extension(
                extension_name,
            )?),
            extension_version,
            library_handle,
            unregister_fn,
            registration,
            functions,
        })
    }
}

impl Entry for ExtensionDescriptor {
    type Key = KeyExtensionDescriptor;
    fn key(&self) -> &KeyExtensionDescriptor {
        &self.key
    }
}

/// A usable instance of a type: a descriptor plus parameters (e.g. a vector
/// dimension), the thing actually attached to columns and expressions.
#[derive(Debug, Clone)]
pub struct TypeContext {
    key: KeyTypeContext,
    pub type_name: DisplayIdent,
    pub extension_name: DisplayIdent,
    pub extension_version: Semver,
    /// Canonical string form of the type's parameters (e.g. `"3"` for a
    /// 3-dimensional vector type); opaque to the catalog, meaningful only to
    /// the type's own encode/decode/compare functions.
    pub parameters: String,
    pub descriptor: Arc<TypeDescriptor>,
}

impl TypeContext {
    pub fn new(
        type_name: &str,
        extension_name: &str,
        extension_version: Semver,
        parameters: String,
        descriptor: Arc<TypeDescriptor>,
    ) -> Result<Self> {
        let key = KeyTypeContext::new(type_name, extension_name, &extension_version, &parameters)?;
        Ok(Self {
            key,
            type_name: DisplayIdent::from_normalized(&crate::ident::normalize_type(type_name)?),
            extension_name: DisplayIdent::from_normalized(&crate::ident::normalize_extension(
                extension_name,
            )?),
            extension_version,
            parameters,
            descriptor,
        })
    }

    /// Two `TypeContext`s are compatible iff they share
    /// `(type_name, extension_name, extension_version)`; parameters do not
    /// affect compatibility (spec §4.8).
    pub fn is_compatible_with(&self, other: &TypeContext) -> bool {
        self.type_name.as_str().eq_ignore_ascii_case(other.type_name.as_str())
            && self.extension_name.as_str().eq_ignore_ascii_case(other.extension_name.as_str())
            && self.extension_version == other.extension_version
    }
}

impl Entry for TypeContext {
    type Key = KeyTypeContext;
    fn key(&self) -> &KeyTypeContext {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_entry_reports_the_extension_it_references() {
        let version = Semver::from_components(1, 0, 0, &[], &[]).unwrap();
        let entry = ColumnEntry::new(
            "shop",
            "orders",
            "total",
            CaseSetting::FoldOnLookup,
            "money",
            version.clone(),
            "MONEY",
        )
        .unwrap();
        assert!(entry.references_extension("money", &version));
        assert!(!entry.references_extension("other", &version));
    }

    #[test]
    fn type_context_compatibility_ignores_parameters() {
        let version = Semver::from_components(1, 0, 0, &[], &[]).unwrap();
        let descriptor = Arc::new(
            TypeDescriptor::new(
                "vector",
                "vecext",
                version.clone(),
                PersistedLength::Variable,
                1024,
                dummy_encode,
                dummy_decode,
                dummy_compare,
                None,
            )
            .unwrap(),
        );
        let a = TypeContext::new(
            "vector",
            "vecext",
            version.clone(),
            "3".to_string(),
            descriptor.clone(),
        )
        .unwrap();
        let b = TypeContext::new("vector", "vecext", version, "8".to_string(), descriptor).unwrap();
        assert!(a.is_compatible_with(&b));
    }

    extern "C" fn dummy_encode(_: *const u8, _: usize, _: *mut u8, _: usize) -> i32 {
        0
    }
    extern "C" fn dummy_decode(_: *const u8, _: usize, _: *mut u8, _: usize) -> i32 {
        0
    }
    extern "C" fn dummy_compare(_: *const u8, _: usize, _: *const u8, _: usize) -> i32 {
        0
    }
}
