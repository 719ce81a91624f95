//! Type injection layer (C8): attaching `TypeContext`s to executor objects
//! at table open, parse time, literal injection, and assignment (spec
//! §4.8).

use std::sync::Arc;

use vef_catalog::{CleanupScope, Victionary};
use vef_core::{CaseSetting, Key, KeyColumn, KeyExtension, KeyTypeContext, KeyTypeDescriptor, Semver, TypeContext};

use crate::error::{EngineError, Result};

/// A column slot in an opened table: the executor-facing handle a
/// `TypeContext` is attached to (spec §4.8 "Table open").
#[derive(Debug, Default)]
pub struct Field {
    pub name: String,
    pub type_context: Option<Arc<TypeContext>>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_context: None,
        }
    }

    pub fn is_extension_typed(&self) -> bool {
        self.type_context.is_some()
    }
}

/// Runs the table-open hook for one column: looks up its `ColumnEntry`,
/// resolves the `TypeDescriptor`, and acquires a `TypeContext` pinned
/// against `scope` so it cannot be dropped while the table is open (spec
/// §4.8 "Table open"). Leaves `field.type_context` untouched if the column
/// carries no extension type.
pub fn attach_column_type(
    catalog: &Victionary,
    field: &mut Field,
    db: &str,
    table: &str,
    column: &str,
    case_setting: CaseSetting,
    scope: &mut CleanupScope,
) -> Result<()> {
    let key = KeyColumn::new(db, table, column, case_setting)?;
    let Some(column_entry) = catalog.columns()?.get_committed(key.as_str()) else {
        return Ok(());
    };

    let context = resolve_type_context(
        catalog,
        column_entry.type_name.as_str(),
        column_entry.extension_name.as_str(),
        &column_entry.extension_version,
        scope,
    )?;
    field.type_context = Some(context);
    Ok(())
}

/// Resolves a parsed type name — `extension.type` or a bare `type` name
/// searched across every installed extension's types — to a `TypeContext`
/// (spec §4.8 "Parse-tree type resolution"). A bare name matching more than
/// one installed extension's type is ambiguous.
pub fn resolve_type_name(
    catalog: &Victionary,
    qualified_or_bare: &str,
    scope: &mut CleanupScope,
) -> Result<Arc<TypeContext>> {
    if let Some((extension_name, type_name)) = qualified_or_bare.split_once('.') {
        let extension_version = installed_version(catalog, extension_name)?;
        return resolve_type_context(catalog, type_name, extension_name, &extension_version, scope);
    }

    let type_name = qualified_or_bare;
    let extensions = catalog.extensions()?.all_committed();
    let mut matches = Vec::new();
    {
        let type_descriptors = catalog.type_descriptors()?;
        for extension in &extensions {
            let descriptor_key =
                KeyTypeDescriptor::new(type_name, extension.extension_name.as_str(), &extension.extension_version)?;
            if type_descriptors.get_committed(descriptor_key.as_str()).is_some() {
                matches.push(extension.clone());
            }
        }
    }

    match matches.as_slice() {
        [] => Err(EngineError::UnknownTypeName { name: type_name.to_string() }),
        [only] => resolve_type_context(catalog, type_name, only.extension_name.as_str(), &only.extension_version, scope),
        _ => Err(EngineError::AmbiguousTypeName { name: type_name.to_string() }),
    }
}

fn installed_version(catalog: &Victionary, extension_name: &str) -> Result<Semver> {
    let key = KeyExtension::new(extension_name)?;
    catalog
        .extensions()?
        .get_committed(key.as_str())
        .map(|entry| entry.extension_version.clone())
        .ok_or_else(|| EngineError::UnknownTypeName { name: extension_name.to_string() })
}

fn resolve_type_context(
    catalog: &Victionary,
    type_name: &str,
    extension_name: &str,
    extension_version: &Semver,
    scope: &mut CleanupScope,
) -> Result<Arc<TypeContext>> {
    let descriptor_key = KeyTypeDescriptor::new(type_name, extension_name, extension_version)?;
    let descriptor = catalog
        .type_descriptors()?
        .get_committed(descriptor_key.as_str())
        .ok_or_else(|| EngineError::ColumnTypeNotFound {
            db: String::new(),
            table: String::new(),
            column: format!("{extension_name}.{type_name}"),
        })?;

    // Columns carry no parameters of their own in this catalog model; every
    // table-open/parse-time resolution acquires the unparameterised context.
    let context_key = KeyTypeContext::new(type_name, extension_name, extension_version, "")?;
    let type_name = type_name.to_string();
    let extension_name = extension_name.to_string();
    let extension_version = extension_version.clone();
    catalog
        .acquire_or_create_type_context(context_key.as_str(), scope, move || {
            vef_core::TypeContext::new(&type_name, &extension_name, extension_version, String::new(), descriptor)
        })
        .map_err(EngineError::from)
}

/// Attaches `context` to a string literal and replaces its value with the
/// binary form produced by the type's `encode` function (spec §4.8
/// "Literal injection"). An encode failure is `ER_WRONG_VALUE`.
pub fn encode_literal(context: &TypeContext, literal: &str) -> Result<Vec<u8>> {
    let capacity = (context.descriptor.max_decode_length as usize).max(literal.len());
    let mut buffer = vec![0u8; capacity];
    let input = literal.as_bytes();
    let written = (context.descriptor.encode_fn)(input.as_ptr(), input.len(), buffer.as_mut_ptr(), buffer.len());
    if written < 0 {
        return Err(EngineError::WrongValue {
            type_name: context.type_name.as_str().to_string(),
            reason: format!("encode rejected the literal (code {written})"),
        });
    }
    buffer.truncate(written as usize);
    Ok(buffer)
}

/// What is being stored into a typed column, as the assignment-validation
/// hook sees it (spec §4.8 "Assignment to column").
pub enum AssignmentSource<'a> {
    /// An already-encoded value carrying its own `TypeContext`.
    TypedValue { context: &'a TypeContext, bytes: &'a [u8] },
    /// A plain string literal, encoded via the target column's type.
    PlainString(&'a str),
    /// Anything else: a numeric, a row subquery, an unsupported expression.
    Other,
}

/// Validates and converts a value being stored into a typed column,
/// returning the persisted bytes to write (spec §4.8 "Assignment to
/// column").
pub fn validate_assignment(target: &TypeContext, source: AssignmentSource<'_>) -> Result<Vec<u8>> {
    match source {
        AssignmentSource::TypedValue { context, bytes } if context.is_compatible_with(target) => {
            Ok(bytes.to_vec())
        }
        AssignmentSource::TypedValue { context, .. } => Err(EngineError::IncompatibleAssignment {
            column_type: target.type_name.as_str().to_string(),
            value_type: context.type_name.as_str().to_string(),
        }),
        AssignmentSource::PlainString(literal) => encode_literal(target, literal),
        AssignmentSource::Other => Err(EngineError::InvalidAssignmentExpression {
            column_type: target.type_name.as_str().to_string(),
        }),
    }
}

/// The closed set of operation kinds permitted on extension-typed operands
/// (spec §4.8 "Allowed operations").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Equality,
    Ordering,
    Between,
    In,
    Case,
    NullIf,
    Coalesce,
    IsNull,
    IsNotNull,
    ExtensionFunction,
    Other,
}

/// Checks one operation over its operands' `TypeContext`s (`None` for a
/// non-extension-typed operand). Rejects anything outside the closed
/// allowed set with `ER_WRONG_USAGE`, and rejects mixed extension types
/// within the set that requires uniformity.
pub fn check_allowed_operation(kind: OperationKind, operand_contexts: &[Option<&TypeContext>]) -> Result<()> {
    let typed: Vec<&TypeContext> = operand_contexts.iter().filter_map(|context| *context).collect();
    if typed.is_empty() {
        return Ok(());
    }

    match kind {
        OperationKind::IsNull | OperationKind::IsNotNull | OperationKind::ExtensionFunction => Ok(()),
        OperationKind::Equality
        | OperationKind::Ordering
        | OperationKind::Between
        | OperationKind::In
        | OperationKind::Case
        | OperationKind::NullIf
        | OperationKind::Coalesce => {
            let first = typed[0];
            if typed.iter().all(|context| context.is_compatible_with(first)) {
                Ok(())
            } else {
                Err(EngineError::MixedOperandTypes { type_name: first.type_name.as_str().to_string() })
            }
        }
        OperationKind::Other => Err(EngineError::UnsupportedOperation {
            type_name: typed[0].type_name.as_str().to_string(),
        }),
    }
}

/// Compares two persisted-byte values of the same `TypeContext` using the
/// type's `compare` function, ascending. Callers apply reverse order
/// themselves (spec §4.8 "Comparison and sorting").
pub fn compare_values(context: &TypeContext, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    let result = (context.descriptor.compare_fn)(a.as_ptr(), a.len(), b.as_ptr(), b.len());
    result.cmp(&0)
}

/// Hashes a persisted-byte value using the type's `hash` function if
/// provided, else a binary hash of the bytes (spec §4.8: types that cannot
/// guarantee encode canonicalises equal values to identical bytes must
/// supply a `hash`).
pub fn hash_value(context: &TypeContext, bytes: &[u8]) -> u64 {
    match context.descriptor.hash_fn {
        Some(hash_fn) => hash_fn(bytes.as_ptr(), bytes.len()),
        None => {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            bytes.hash(&mut hasher);
            hasher.finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vef_catalog::persistence::test_support::InMemoryRowStore;
    use vef_core::{ColumnEntry, ExtensionEntry, PersistedLength, TypeDescriptor};

    fn bootstrapped_catalog() -> Victionary {
        let catalog = Victionary::new(
            Box::new(InMemoryRowStore::new()),
            Box::new(InMemoryRowStore::new()),
            Box::new(InMemoryRowStore::new()),
        );
        catalog.bootstrap().unwrap();
        catalog
    }

    extern "C" fn dummy_encode(input: *const u8, input_len: usize, out: *mut u8, out_len: usize) -> i32 {
        if input_len > out_len {
            return -1;
        }
        unsafe { std::ptr::copy_nonoverlapping(input, out, input_len) };
        input_len as i32
    }
    extern "C" fn dummy_decode(_: *const u8, _: usize, _: *mut u8, _: usize) -> i32 {
        0
    }
    extern "C" fn dummy_compare(a: *const u8, a_len: usize, b: *const u8, b_len: usize) -> i32 {
        let a = unsafe { std::slice::from_raw_parts(a, a_len) };
        let b = unsafe { std::slice::from_raw_parts(b, b_len) };
        match a.cmp(b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    }

    fn install_money(catalog: &Victionary) {
        let version = Semver::from_components(1, 0, 0, &[], &[]).unwrap();
        let descriptor = Arc::new(
            TypeDescriptor::new(
                "money",
                "money_ext",
                version.clone(),
                PersistedLength::Fixed(8),
                64,
                dummy_encode,
                dummy_decode,
                dummy_compare,
                None,
            )
            .unwrap(),
        );
        let txn = vef_catalog::TxnId(1);
        catalog
            .with_write(|writer| {
                writer.type_descriptors_mut().mark_for_insertion(txn, descriptor);
                writer.extensions_mut().mark_for_insertion(
                    txn,
                    Arc::new(ExtensionEntry::new("money_ext", version, "a".repeat(64)).unwrap()),
                );
                Ok(())
            })
            .unwrap();
        catalog.commit_all(txn).unwrap();
    }

    #[test]
    fn table_open_attaches_context_for_extension_typed_column() {
        let catalog = bootstrapped_catalog();
        install_money(&catalog);

        let version = Semver::from_components(1, 0, 0, &[], &[]).unwrap();
        let column = Arc::new(
            ColumnEntry::new(
                "shop",
                "orders",
                "total",
                CaseSetting::FoldOnLookup,
                "money_ext",
                version,
                "money",
            )
            .unwrap(),
        );
        let txn = vef_catalog::TxnId(2);
        catalog
            .with_write(|writer| {
                writer.columns_mut().mark_for_insertion(txn, column);
                Ok(())
            })
            .unwrap();
        catalog.commit_all(txn).unwrap();

        let mut field = Field::new("total");
        let mut scope = CleanupScope::new();
        attach_column_type(
            &catalog,
            &mut field,
            "shop",
            "orders",
            "total",
            CaseSetting::FoldOnLookup,
            &mut scope,
        )
        .unwrap();
        assert!(field.is_extension_typed());
        assert_eq!(field.type_context.unwrap().type_name.as_str(), "money");
    }

    #[test]
    fn non_extension_column_is_left_untouched() {
        let catalog = bootstrapped_catalog();
        let mut field = Field::new("id");
        let mut scope = CleanupScope::new();
        attach_column_type(&catalog, &mut field, "shop", "orders", "id", CaseSetting::FoldOnLookup, &mut scope)
            .unwrap();
        assert!(!field.is_extension_typed());
    }

    #[test]
    fn bare_type_name_resolves_to_its_sole_installed_extension() {
        let catalog = bootstrapped_catalog();
        install_money(&catalog);
        let mut scope = CleanupScope::new();
        let context = resolve_type_name(&catalog, "money", &mut scope).unwrap();
        assert_eq!(context.extension_name.as_str(), "money_ext");
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let catalog = bootstrapped_catalog();
        let mut scope = CleanupScope::new();
        assert!(matches!(
            resolve_type_name(&catalog, "nonesuch", &mut scope),
            Err(EngineError::UnknownTypeName { .. })
        ));
    }

    #[test]
    fn check_allowed_operation_rejects_mixed_and_other() {
        let catalog = bootstrapped_catalog();
        install_money(&catalog);
        let mut scope = CleanupScope::new();
        let context = resolve_type_name(&catalog, "money", &mut scope).unwrap();

        assert!(check_allowed_operation(OperationKind::Equality, &[Some(&context), Some(&context)]).is_ok());
        assert!(matches!(
            check_allowed_operation(OperationKind::Other, &[Some(&context)]),
            Err(EngineError::UnsupportedOperation { .. })
        ));
    }
}
