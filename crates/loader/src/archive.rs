//! Archive hashing, expansion, and manifest parsing (spec §4.6 steps 1-3),
//! plus the startup orphan-expansion sweep.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{LoaderError, Result};

#[derive(Debug, Deserialize)]
struct ManifestFile {
    name: String,
    version: String,
}

/// The parsed `manifest.json`, plus the SHA-256 hash of the archive it came
/// from and the directory it was expanded into.
#[derive(Debug, Clone)]
pub struct ExpandedArchive {
    pub extension_name: String,
    pub version: String,
    pub hash: String,
    pub expanded_dir: PathBuf,
}

impl ExpandedArchive {
    pub fn shared_library_path(&self, extension_name: &str) -> PathBuf {
        self.expanded_dir
            .join("lib")
            .join(format!("{extension_name}{}", std::env::consts::DLL_SUFFIX))
    }
}

/// Computes the archive's SHA-256 as a 64-character lowercase hex string
/// (spec §4.6 step 1).
pub fn hash_archive(archive_path: &Path) -> Result<String> {
    let mut file = fs::File::open(archive_path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoaderError::ArchiveNotFound {
                path: archive_path.display().to_string(),
            }
        } else {
            LoaderError::Io {
                path: archive_path.display().to_string(),
                source,
            }
        }
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(|source| LoaderError::Io {
            path: archive_path.display().to_string(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Expands `archive_path` into `{expanded_root}/{name}/{hash}/`, reusing the
/// directory if it already exists (spec §4.6 step 2), then reads and parses
/// its manifest (spec §4.6 step 3).
pub fn expand_and_read_manifest(
    archive_path: &Path,
    expanded_root: &Path,
    name: &str,
) -> Result<ExpandedArchive> {
    let hash = hash_archive(archive_path)?;
    let expanded_dir = expanded_root.join(name).join(&hash);

    if !expanded_dir.is_dir() {
        expand_archive(archive_path, &expanded_dir)?;
    }

    let manifest = read_manifest(&expanded_dir)?;
    Ok(ExpandedArchive {
        extension_name: manifest.name,
        version: manifest.version,
        hash,
        expanded_dir,
    })
}

fn expand_archive(archive_path: &Path, destination: &Path) -> Result<()> {
    let staging = destination.with_extension("partial");
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|source| LoaderError::Io {
            path: staging.display().to_string(),
            source,
        })?;
    }
    fs::create_dir_all(&staging).map_err(|source| LoaderError::Io {
        path: staging.display().to_string(),
        source,
    })?;

    let file = fs::File::open(archive_path).map_err(|source| LoaderError::Io {
        path: archive_path.display().to_string(),
        source,
    })?;
    let mut archive = tar::Archive::new(file);
    archive.unpack(&staging).map_err(|source| LoaderError::MalformedArchive {
        path: archive_path.display().to_string(),
        reason: source.to_string(),
    })?;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|source| LoaderError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    fs::rename(&staging, destination).map_err(|source| LoaderError::Io {
        path: destination.display().to_string(),
        source,
    })?;
    Ok(())
}

fn read_manifest(expanded_dir: &Path) -> Result<ManifestFile> {
    let manifest_path = expanded_dir.join("manifest.json");
    let raw = fs::read_to_string(&manifest_path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoaderError::MissingArchiveEntry {
                path: expanded_dir.display().to_string(),
                entry: "manifest.json".to_string(),
            }
        } else {
            LoaderError::Io {
                path: manifest_path.display().to_string(),
                source,
            }
        }
    })?;
    serde_json::from_str(&raw).map_err(|source| LoaderError::MalformedManifest {
        path: manifest_path.display().to_string(),
        reason: source.to_string(),
    })
}

/// Deletes every `{expanded_root}/{name}/{hash}` directory whose
/// `(name, hash)` is not in `installed`, to garbage-collect stale
/// expansions from crashed or rolled-back installs (spec §4.6 "Orphan
/// cleanup").
pub fn sweep_orphaned_expansions(
    expanded_root: &Path,
    installed: &[(String, String)],
) -> Result<usize> {
    let mut removed = 0;
    let Ok(name_entries) = fs::read_dir(expanded_root) else {
        return Ok(0);
    };
    for name_entry in name_entries.flatten() {
        let name_dir = name_entry.path();
        if !name_dir.is_dir() {
            continue;
        }
        let Some(extension_name) = name_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(hash_entries) = fs::read_dir(&name_dir) else {
            continue;
        };
        for hash_entry in hash_entries.flatten() {
            let hash_dir = hash_entry.path();
            if !hash_dir.is_dir() {
                continue;
            }
            let Some(hash) = hash_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_installed = installed
                .iter()
                .any(|(installed_name, installed_hash)| {
                    installed_name.eq_ignore_ascii_case(extension_name) && installed_hash == hash
                });
            if !is_installed {
                if let Err(source) = fs::remove_dir_all(&hash_dir) {
                    tracing::error!(
                        event = "archive.orphan_sweep_failed",
                        path = %hash_dir.display(),
                        %source,
                    );
                    continue;
                }
                tracing::info!(event = "archive.orphan_removed", path = %hash_dir.display());
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_archive(dir: &Path, name: &str, version: &str) -> PathBuf {
        let archive_path = dir.join(format!("{name}.veb"));
        let file = fs::File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(file);

        let manifest = format!(r#"{{"name":"{name}","version":"{version}"}}"#);
        let mut header = tar::Header::new_gnu();
        header.set_size(manifest.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "manifest.json", manifest.as_bytes())
            .unwrap();

        let lib_contents = b"not a real shared library";
        let lib_name = format!("lib/{name}{}", std::env::consts::DLL_SUFFIX);
        let mut lib_header = tar::Header::new_gnu();
        lib_header.set_size(lib_contents.len() as u64);
        lib_header.set_mode(0o755);
        lib_header.set_cksum();
        builder
            .append_data(&mut lib_header, lib_name, &lib_contents[..])
            .unwrap();

        builder.finish().unwrap();
        archive_path
    }

    #[test]
    fn hash_is_deterministic_and_stable_length() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_test_archive(dir.path(), "money", "1.0.0");
        let hash_a = hash_archive(&archive).unwrap();
        let hash_b = hash_archive(&archive).unwrap();
        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.len(), 64);
        assert!(hash_a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn expand_then_reuse_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_test_archive(dir.path(), "money", "1.2.3");
        let expanded_root = dir.path().join("_expanded");

        let first = expand_and_read_manifest(&archive, &expanded_root, "money").unwrap();
        assert_eq!(first.extension_name, "money");
        assert_eq!(first.version, "1.2.3");
        assert!(first.expanded_dir.join("manifest.json").is_file());

        let second = expand_and_read_manifest(&archive, &expanded_root, "money").unwrap();
        assert_eq!(first.expanded_dir, second.expanded_dir);
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn missing_manifest_is_a_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bad.veb");
        let file = fs::File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(file);
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "lib/.keep", &b""[..]).unwrap();
        builder.finish().unwrap();

        let expanded_root = dir.path().join("_expanded");
        let result = expand_and_read_manifest(&archive_path, &expanded_root, "bad");
        assert!(matches!(result, Err(LoaderError::MissingArchiveEntry { .. })));
    }

    #[test]
    fn sweep_removes_only_non_installed_hash_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let expanded_root = dir.path().join("_expanded");
        fs::create_dir_all(expanded_root.join("money/keep")).unwrap();
        fs::create_dir_all(expanded_root.join("money/orphan")).unwrap();

        let removed = sweep_orphaned_expansions(
            &expanded_root,
            &[("money".to_string(), "keep".to_string())],
        )
        .unwrap();

        assert_eq!(removed, 1);
        assert!(expanded_root.join("money/keep").is_dir());
        assert!(!expanded_root.join("money/orphan").exists());
    }
}
