//! Identifier normalization, semver, the key/entry model, and the extension
//! ABI layer for the VillageSQL Extension Framework.
//!
//! This crate holds only leaf data types and typed errors; it has no
//! dependency on the catalog, the loader, or the executor-facing hooks that
//! sit above it.

pub mod abi;
pub mod config;
pub mod entry;
pub mod error;
pub mod ident;
pub mod key;
pub mod semver;

pub use abi::{AbiTypeTag, ArgumentValue, CallResult, FunctionSignature, RegistrationHandle};
pub use config::VefConfig;
pub use entry::{
    ColumnEntry, Entry, ExtensionDescriptor, ExtensionEntry, PersistedLength, PropertyEntry,
    TypeContext, TypeDescriptor,
};
pub use error::{Categorized, CoreError, ErrorCategory, Result};
pub use ident::{CaseSetting, MAX_IDENTIFIER_LENGTH, NormalizedIdent};
pub use key::{
    DisplayIdent, Key, KeyColumn, KeyColumnPrefix, KeyExtension, KeyExtensionDescriptor,
    KeyExtensionOwnedPrefix, KeyProperty, KeyTypeContext, KeyTypeDescriptor,
};
pub use semver::{parse as parse_semver, Semver};
