//! Process-wide configuration (spec §6 "Process-level configuration",
//! expanded with the ambient settings the loader and VDF layer need).

use std::path::PathBuf;

use crate::ident::CaseSetting;

/// Read once at startup; callers assume it does not change mid-statement
/// (spec §4.1).
#[derive(Debug, Clone)]
pub struct VefConfig {
    /// Base directory for `.veb` archives and the `_expanded/` cache.
    pub veb_dir: PathBuf,
    /// Process-wide identifier case-folding mode for database/table names.
    pub case_setting: CaseSetting,
    /// ABI protocol version this host build speaks (spec §4.6 step 5).
    pub abi_protocol_version: u32,
    /// Forwarded to MDL acquisition (spec §5 "Cancellation & timeouts").
    pub lock_wait_timeout: std::time::Duration,
    /// Extension-raised error messages are truncated to this many bytes
    /// before being surfaced as warnings (spec §4.9, `ER_UDF_ERROR`).
    pub max_extension_error_message_len: usize,
}

impl VefConfig {
    pub fn new(veb_dir: impl Into<PathBuf>, case_setting: CaseSetting) -> Self {
        Self {
            veb_dir: veb_dir.into(),
            case_setting,
            abi_protocol_version: crate::abi::HOST_ABI_PROTOCOL_VERSION,
            lock_wait_timeout: std::time::Duration::from_secs(50),
            max_extension_error_message_len: 512,
        }
    }

    pub fn expanded_dir(&self) -> PathBuf {
        self.veb_dir.join("_expanded")
    }

    pub fn archive_path(&self, extension_name: &str) -> PathBuf {
        self.veb_dir.join(format!("{extension_name}.veb"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_is_rooted_in_veb_dir() {
        let config = VefConfig::new("/var/lib/villagesql/veb", CaseSetting::FoldOnLookup);
        assert_eq!(
            config.archive_path("vec"),
            std::path::Path::new("/var/lib/villagesql/veb/vec.veb")
        );
        assert_eq!(
            config.expanded_dir(),
            std::path::Path::new("/var/lib/villagesql/veb/_expanded")
        );
    }
}
