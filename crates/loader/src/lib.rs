//! Archive expansion, dynamic library loading, and the install/uninstall
//! protocol (C6/C7) for the VillageSQL Extension Framework.

pub mod archive;
pub mod dynlib;
pub mod error;
pub mod install;
pub mod lock;
pub mod uninstall;

pub use archive::{hash_archive, sweep_orphaned_expansions, ExpandedArchive};
pub use dynlib::{load_and_handshake, LoadedExtension};
pub use error::{LoaderError, Result};
pub use install::{install_extension, validate_extension_name};
pub use lock::{LockGuard, MetadataLockHost, StatementLocks};
pub use uninstall::uninstall_extension;
