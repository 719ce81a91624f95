//! Per-transaction pending operations (spec §4.4).

use std::sync::Arc;

/// Identifies one host transaction handle; the key under which pending
/// operations are grouped in every [`crate::system_table_map::SystemTableMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

/// One append-ordered intent against a map's committed state.
#[derive(Debug)]
pub enum PendingOp<E> {
    Insert(Arc<E>),
    /// `old_key` is `Some` only when the entry's own key changed; `new`
    /// always carries the post-update entry (and therefore its own key).
    Update {
        old_key: Option<String>,
        new: Arc<E>,
    },
    Delete(String),
}

impl<E> Clone for PendingOp<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Insert(entry) => Self::Insert(entry.clone()),
            Self::Update { old_key, new } => Self::Update {
                old_key: old_key.clone(),
                new: new.clone(),
            },
            Self::Delete(key) => Self::Delete(key.clone()),
        }
    }
}

/// The outcome of scanning a transaction's pending list backward for the
/// most recent operation touching a key.
pub(crate) enum PendingLookup<E> {
    /// The most recent op leaves the entry present with this value.
    Present(Arc<E>),
    /// The most recent op leaves the key absent (an explicit delete, or an
    /// update that moved the entry away from this key).
    Absent,
    /// No pending op touches this key; fall back to committed state.
    NotTouched,
}

pub(crate) fn lookup_pending<E: EntryKeyStr>(ops: &[PendingOp<E>], key: &str) -> PendingLookup<E> {
    for op in ops.iter().rev() {
        match op {
            PendingOp::Insert(entry) if entry_key(entry) == key => {
                return PendingLookup::Present(entry.clone());
            }
            PendingOp::Update { new, .. } if entry_key(new) == key => {
                return PendingLookup::Present(new.clone());
            }
            PendingOp::Update {
                old_key: Some(old_key),
                ..
            } if old_key == key => {
                return PendingLookup::Absent;
            }
            PendingOp::Delete(deleted_key) if deleted_key == key => {
                return PendingLookup::Absent;
            }
            _ => {}
        }
    }
    PendingLookup::NotTouched
}

fn entry_key<E>(entry: &Arc<E>) -> &str
where
    E: EntryKeyStr,
{
    entry.key_str()
}

/// Bridges `vef_core::Entry`'s associated-key type to the plain `&str`
/// form every map and pending op is keyed by.
pub trait EntryKeyStr {
    fn key_str(&self) -> &str;
}

impl<E> EntryKeyStr for E
where
    E: vef_core::Entry,
    E::Key: vef_core::Key,
{
    fn key_str(&self) -> &str {
        self.key().as_str()
    }
}
