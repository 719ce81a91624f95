//! Identifier normalization (C1).
//!
//! Every entity kind that appears in a [`crate::key::Key`] goes through one
//! of the functions here before it is used for lookup or ordering. The
//! original form is always retained for display; only the normalized form is
//! used as a catalog key. Normalization must be byte-for-byte identical for
//! equal-by-rule inputs across platforms, so folding uses `str::to_lowercase`
//! (Unicode tables baked into the standard library) rather than any
//! locale-dependent collation.

use crate::error::{CoreError, Result};

/// Maximum identifier length, in Unicode scalar values (spec §3).
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Process-wide identifier case-folding mode for database and table names
/// (spec §3, mirrors `lower_case_table_names`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSetting {
    /// Mode 0: store and compare exactly as given.
    PreserveCase,
    /// Mode 1: fold to lower on the way in; the folded form is also the
    /// display form.
    FoldOnStore,
    /// Mode 2: keep the original display form, but fold to lower for the
    /// normalized lookup key.
    FoldOnLookup,
}

impl CaseSetting {
    /// Parses the raw integer value read from process configuration.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PreserveCase),
            1 => Some(Self::FoldOnStore),
            2 => Some(Self::FoldOnLookup),
            _ => None,
        }
    }
}

/// An identifier's display form alongside its normalized catalog key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIdent {
    display: String,
    normalized: String,
}

impl NormalizedIdent {
    /// The form to show back to the user (original casing, except under
    /// [`CaseSetting::FoldOnStore`] where storage itself is lowercased).
    pub fn display(&self) -> &str {
        &self.display
    }

    /// The canonical key used for catalog lookup and ordering.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

fn fold_lower(value: &str) -> String {
    value.to_lowercase()
}

fn check_length(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CoreError::InvalidIdentifier {
            value: value.to_string(),
            reason: "identifier must not be empty".to_string(),
        });
    }
    if value.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(CoreError::InvalidIdentifier {
            value: value.to_string(),
            reason: format!("identifier exceeds {MAX_IDENTIFIER_LENGTH} code points"),
        });
    }
    Ok(())
}

/// Normalizes a column, extension, type, or property identifier. These
/// kinds are always case-folded regardless of the process-wide setting.
fn normalize_always_folded(value: &str) -> Result<NormalizedIdent> {
    check_length(value)?;
    Ok(NormalizedIdent {
        display: value.to_string(),
        normalized: fold_lower(value),
    })
}

pub fn normalize_column(value: &str) -> Result<NormalizedIdent> {
    normalize_always_folded(value)
}

pub fn normalize_extension(value: &str) -> Result<NormalizedIdent> {
    normalize_always_folded(value)
}

pub fn normalize_type(value: &str) -> Result<NormalizedIdent> {
    normalize_always_folded(value)
}

pub fn normalize_property(value: &str) -> Result<NormalizedIdent> {
    normalize_always_folded(value)
}

/// Normalizes a database identifier under the process-wide [`CaseSetting`].
pub fn normalize_database(value: &str, setting: CaseSetting) -> Result<NormalizedIdent> {
    normalize_db_or_table(value, setting)
}

/// Normalizes a table identifier under the process-wide [`CaseSetting`].
pub fn normalize_table(value: &str, setting: CaseSetting) -> Result<NormalizedIdent> {
    normalize_db_or_table(value, setting)
}

fn normalize_db_or_table(value: &str, setting: CaseSetting) -> Result<NormalizedIdent> {
    check_length(value)?;
    match setting {
        CaseSetting::PreserveCase => Ok(NormalizedIdent {
            display: value.to_string(),
            normalized: value.to_string(),
        }),
        CaseSetting::FoldOnStore => {
            let folded = fold_lower(value);
            Ok(NormalizedIdent {
                display: folded.clone(),
                normalized: folded,
            })
        }
        CaseSetting::FoldOnLookup => Ok(NormalizedIdent {
            display: value.to_string(),
            normalized: fold_lower(value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_folded_kinds_lowercase_regardless_of_setting() {
        let a = normalize_column("Foo_Bar").unwrap();
        let b = normalize_column("foo_bar").unwrap();
        assert_eq!(a.normalized(), b.normalized());
        assert_eq!(a.display(), "Foo_Bar");
    }

    #[test]
    fn preserve_case_keeps_display_and_normalized_distinct_by_case() {
        let a = normalize_table("Orders", CaseSetting::PreserveCase).unwrap();
        let b = normalize_table("orders", CaseSetting::PreserveCase).unwrap();
        assert_ne!(a.normalized(), b.normalized());
    }

    #[test]
    fn fold_on_store_lowercases_display_too() {
        let ident = normalize_table("Orders", CaseSetting::FoldOnStore).unwrap();
        assert_eq!(ident.display(), "orders");
        assert_eq!(ident.normalized(), "orders");
    }

    #[test]
    fn fold_on_lookup_keeps_display_but_folds_key() {
        let ident = normalize_table("Orders", CaseSetting::FoldOnLookup).unwrap();
        assert_eq!(ident.display(), "Orders");
        assert_eq!(ident.normalized(), "orders");
    }

    #[test]
    fn fold_on_lookup_and_fold_on_store_collide_on_the_same_key() {
        let lookup = normalize_table("Orders", CaseSetting::FoldOnLookup).unwrap();
        let store = normalize_table("ORDERS", CaseSetting::FoldOnStore).unwrap();
        assert_eq!(lookup.normalized(), store.normalized());
    }

    #[test]
    fn rejects_identifiers_over_the_length_limit() {
        let too_long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(normalize_extension(&too_long).is_err());
    }

    #[test]
    fn rejects_empty_identifiers() {
        assert!(normalize_extension("").is_err());
    }

    #[test]
    fn from_raw_rejects_unknown_modes() {
        assert!(CaseSetting::from_raw(3).is_none());
        assert_eq!(CaseSetting::from_raw(0), Some(CaseSetting::PreserveCase));
    }
}
