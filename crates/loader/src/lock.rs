//! The host-provided lock seam install/uninstall acquire before touching the
//! Victionary (spec §4.7 step 1-2, §5 "Host metadata locks").
//!
//! This crate does not implement locking itself — the host's global-read,
//! backup, and metadata-lock subsystems are out of scope (spec §1) — it only
//! defines the contract consumed from them and a RAII guard for release.

/// Acquired for the duration of one install/uninstall statement.
pub trait MetadataLockHost: Send + Sync {
    /// Shared lock refusing the operation under read-only mode.
    fn acquire_global_read_lock(&self) -> std::io::Result<Box<dyn LockGuard>>;
    /// Shared lock respecting backup fences.
    fn acquire_backup_lock(&self) -> std::io::Result<Box<dyn LockGuard>>;
    /// Exclusive metadata lock on one extension name, serialising
    /// install/uninstall against each other and against DDL referencing the
    /// same extension (spec §5 lock ordering: table X before extension S).
    fn acquire_extension_exclusive_lock(
        &self,
        extension_name: &str,
    ) -> std::io::Result<Box<dyn LockGuard>>;
}

/// Releases the held lock when dropped.
pub trait LockGuard: Send {}

/// All three locks install/uninstall must hold for their duration (spec
/// §4.7 steps 1-2).
pub struct StatementLocks {
    _global_read: Box<dyn LockGuard>,
    _backup: Box<dyn LockGuard>,
    _extension_exclusive: Box<dyn LockGuard>,
}

impl StatementLocks {
    pub fn acquire(host: &dyn MetadataLockHost, extension_name: &str) -> std::io::Result<Self> {
        Ok(Self {
            _global_read: host.acquire_global_read_lock()?,
            _backup: host.acquire_backup_lock()?,
            _extension_exclusive: host.acquire_extension_exclusive_lock(extension_name)?,
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::{LockGuard, MetadataLockHost};

    struct NoopGuard;
    impl LockGuard for NoopGuard {}

    /// A lock host that always grants every lock immediately, for tests
    /// that exercise install/uninstall without a real host.
    pub struct AlwaysGrantLockHost;

    impl MetadataLockHost for AlwaysGrantLockHost {
        fn acquire_global_read_lock(&self) -> std::io::Result<Box<dyn LockGuard>> {
            Ok(Box::new(NoopGuard))
        }

        fn acquire_backup_lock(&self) -> std::io::Result<Box<dyn LockGuard>> {
            Ok(Box::new(NoopGuard))
        }

        fn acquire_extension_exclusive_lock(
            &self,
            _extension_name: &str,
        ) -> std::io::Result<Box<dyn LockGuard>> {
            Ok(Box::new(NoopGuard))
        }
    }
}
