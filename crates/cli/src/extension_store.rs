//! A file-backed [`RowStore`] for the `Extensions` persistent table.
//!
//! The CLI is a short-lived process, not a long-running host: each
//! invocation needs the committed extension list to survive between runs, so
//! `status` after `install` sees what was just installed. One line per
//! extension (`name\tversion\thash`) is simple enough not to need a real
//! embedded database, matching how the reference workspace's own bootstrap
//! CLI keeps its state as plain text rather than reaching for a store it
//! doesn't otherwise need.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use vef_catalog::pending::EntryKeyStr;
use vef_catalog::{RowStore, RowStoreError, UpdateOutcome};
use vef_core::ExtensionEntry;

pub struct FileExtensionStore {
    path: PathBuf,
    rows: Mutex<BTreeMap<String, ExtensionEntry>>,
}

impl FileExtensionStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut rows = BTreeMap::new();
        if let Ok(contents) = fs::read_to_string(&path) {
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let entry = parse_line(line)?;
                rows.insert(entry.key_str().to_string(), entry);
            }
        }
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    fn flush(&self, rows: &BTreeMap<String, ExtensionEntry>) -> Result<(), RowStoreError> {
        let mut contents = String::new();
        for entry in rows.values() {
            contents.push_str(&format_line(entry));
            contents.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| RowStoreError::Io(error.to_string()))?;
        }
        fs::write(&self.path, contents).map_err(|error| RowStoreError::Io(error.to_string()))
    }
}

fn format_line(entry: &ExtensionEntry) -> String {
    format!(
        "{}\t{}\t{}",
        entry.extension_name.as_str(),
        entry.extension_version,
        entry.archive_hash
    )
}

fn parse_line(line: &str) -> anyhow::Result<ExtensionEntry> {
    let mut parts = line.splitn(3, '\t');
    let name = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("malformed extension store line: {line}"))?;
    let version = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("malformed extension store line: {line}"))?;
    let hash = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("malformed extension store line: {line}"))?;
    let version = vef_core::parse_semver(version)?;
    Ok(ExtensionEntry::new(name, version, hash.to_string())?)
}

impl RowStore<ExtensionEntry> for FileExtensionStore {
    fn scan_all(&self) -> Box<dyn Iterator<Item = Result<ExtensionEntry, RowStoreError>> + '_> {
        let rows = self.rows.lock().unwrap();
        let snapshot: Vec<_> = rows.values().cloned().map(Ok).collect();
        Box::new(snapshot.into_iter())
    }

    fn insert_row(&self, entry: &ExtensionEntry) -> Result<(), RowStoreError> {
        let mut rows = self.rows.lock().unwrap();
        rows.insert(entry.key_str().to_string(), entry.clone());
        self.flush(&rows)
    }

    fn update_row(&self, old_key: &str, new: &ExtensionEntry) -> Result<UpdateOutcome, RowStoreError> {
        let mut rows = self.rows.lock().unwrap();
        if !rows.contains_key(old_key) {
            return Err(RowStoreError::RowNotFound { key: old_key.to_string() });
        }
        rows.remove(old_key);
        rows.insert(new.key_str().to_string(), new.clone());
        self.flush(&rows)?;
        Ok(UpdateOutcome::Updated)
    }

    fn delete_row(&self, key: &str) -> Result<(), RowStoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.remove(key).is_none() {
            return Err(RowStoreError::RowNotFound { key: key.to_string() });
        }
        self.flush(&rows)
    }
}

pub fn extensions_file(state_dir: &Path) -> PathBuf {
    state_dir.join("extensions.tsv")
}
