//! Key objects for each catalog entity kind (C3).
//!
//! Every key bundles the original component strings (for display/error
//! messages) with a precomputed normalized string used for lookup and
//! ordering. Components are joined with a NUL byte, the smallest possible
//! byte value, so that a prefix's normalized form always sorts immediately
//! before any key that extends it — turning prefix scans into the ordered
//! range `[prefix, prefix_upper_bound)`.

use std::fmt;

use crate::ident::{CaseSetting, NormalizedIdent, normalize_column, normalize_database,
    normalize_extension, normalize_property, normalize_table, normalize_type};
use crate::error::Result;
use crate::semver::Semver;

const DELIMITER: char = '\u{0}';

/// Implemented by every `Key_K` type. Keys compare and order purely on
/// [`Key::as_str`], never on the preserved original components.
pub trait Key: fmt::Debug + Clone + Eq + Ord {
    fn as_str(&self) -> &str;
}

/// Computes the exclusive upper bound of an ordered-range prefix scan: the
/// given prefix with its last byte incremented. Used by every
/// `KeyPrefix::range_end` below.
pub fn increment_last_byte(prefix: &str) -> String {
    let mut bytes = prefix.as_bytes().to_vec();
    for index in (0..bytes.len()).rev() {
        if bytes[index] != 0xFF {
            bytes[index] += 1;
            bytes.truncate(index + 1);
            // The incremented byte may not land on a UTF-8 boundary; that's
            // fine, callers only use this string as an ordered range bound,
            // never re-decode it.
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    // All bytes were 0xFF (never happens for our normalized keys): there is
    // no finite upper bound, so the caller should scan to the end instead.
    String::new()
}

macro_rules! normalized_key {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name {
            normalized: String,
        }

        impl Key for $name {
            fn as_str(&self) -> &str {
                &self.normalized
            }
        }
    };
}

normalized_key!(KeyProperty);

impl KeyProperty {
    pub fn new(name: &str) -> Result<Self> {
        let ident = normalize_property(name)?;
        Ok(Self {
            normalized: ident.normalized().to_string(),
        })
    }
}

normalized_key!(KeyExtension);

impl KeyExtension {
    pub fn new(extension_name: &str) -> Result<Self> {
        let ident = normalize_extension(extension_name)?;
        Ok(Self {
            normalized: ident.normalized().to_string(),
        })
    }
}

normalized_key!(KeyColumn);

impl KeyColumn {
    pub fn new(db: &str, table: &str, column: &str, case_setting: CaseSetting) -> Result<Self> {
        let db_ident = normalize_database(db, case_setting)?;
        let table_ident = normalize_table(table, case_setting)?;
        let column_ident = normalize_column(column)?;
        Ok(Self {
            normalized: join(&[
                db_ident.normalized(),
                table_ident.normalized(),
                column_ident.normalized(),
            ]),
        })
    }
}

/// Prefix over all columns of one table, or of every table in one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumnPrefix {
    normalized: String,
}

impl KeyColumnPrefix {
    pub fn for_table(db: &str, table: &str, case_setting: CaseSetting) -> Result<Self> {
        let db_ident = normalize_database(db, case_setting)?;
        let table_ident = normalize_table(table, case_setting)?;
        Ok(Self {
            normalized: join(&[db_ident.normalized(), table_ident.normalized(), ""]),
        })
    }

    pub fn for_database(db: &str, case_setting: CaseSetting) -> Result<Self> {
        let db_ident = normalize_database(db, case_setting)?;
        Ok(Self {
            normalized: format!("{}{DELIMITER}", db_ident.normalized()),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn range_end(&self) -> String {
        increment_last_byte(&self.normalized)
    }
}

normalized_key!(KeyTypeDescriptor);

impl KeyTypeDescriptor {
    pub fn new(type_name: &str, extension_name: &str, version: &Semver) -> Result<Self> {
        let type_ident = normalize_type(type_name)?;
        let ext_ident = normalize_extension(extension_name)?;
        Ok(Self {
            normalized: join(&[ext_ident.normalized(), type_ident.normalized(), &version.to_string()]),
        })
    }
}

normalized_key!(KeyExtensionDescriptor);

impl KeyExtensionDescriptor {
    pub fn new(extension_name: &str, version: &Semver) -> Result<Self> {
        let ext_ident = normalize_extension(extension_name)?;
        Ok(Self {
            normalized: join(&[ext_ident.normalized(), &version.to_string()]),
        })
    }
}

/// Prefix over every `ExtensionDescriptor`/`TypeDescriptor`/`TypeContext`
/// version owned by one extension, used during uninstall to mark every
/// owned descriptor for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExtensionOwnedPrefix {
    normalized: String,
}

impl KeyExtensionOwnedPrefix {
    pub fn new(extension_name: &str) -> Result<Self> {
        let ext_ident = normalize_extension(extension_name)?;
        Ok(Self {
            normalized: format!("{}{DELIMITER}", ext_ident.normalized()),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn range_end(&self) -> String {
        increment_last_byte(&self.normalized)
    }
}

normalized_key!(KeyTypeContext);

impl KeyTypeContext {
    pub fn new(
        type_name: &str,
        extension_name: &str,
        version: &Semver,
        parameters: &str,
    ) -> Result<Self> {
        let type_ident = normalize_type(type_name)?;
        let ext_ident = normalize_extension(extension_name)?;
        Ok(Self {
            normalized: join(&[
                ext_ident.normalized(),
                type_ident.normalized(),
                &version.to_string(),
                parameters,
            ]),
        })
    }
}

fn join(components: &[&str]) -> String {
    components.join(&DELIMITER.to_string())
}

/// Holds both the display form and the contribution to a normalized key for
/// a single identifier component, so entry payloads can expose the original
/// casing back to callers without re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayIdent {
    display: String,
}

impl DisplayIdent {
    pub fn from_normalized(ident: &NormalizedIdent) -> Self {
        Self {
            display: ident.display().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }
}

impl fmt::Display for DisplayIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_prefix_bounds_an_ordered_range() {
        let prefix = KeyColumnPrefix::for_table("db", "t", CaseSetting::FoldOnLookup).unwrap();
        let in_range = KeyColumn::new("db", "t", "c", CaseSetting::FoldOnLookup).unwrap();
        let out_of_range = KeyColumn::new("db", "t2", "c", CaseSetting::FoldOnLookup).unwrap();

        let start = prefix.as_str().to_string();
        let end = prefix.range_end();

        assert!(in_range.as_str() >= start.as_str() && in_range.as_str() < end.as_str());
        assert!(!(out_of_range.as_str() >= start.as_str() && out_of_range.as_str() < end.as_str()));
    }

    #[test]
    fn increment_last_byte_extends_past_all_children() {
        let prefix = "abc\u{0}";
        let bound = increment_last_byte(prefix);
        assert!("abc\u{0}zzz" < bound.as_str());
        assert!(bound.as_str() <= "abd");
    }

    #[test]
    fn keys_order_by_normalized_string() {
        let a = KeyExtension::new("aardvark").unwrap();
        let b = KeyExtension::new("zebra").unwrap();
        assert!(a < b);
    }
}
