//! Typed errors for `vef-core`, and the shared error-category taxonomy
//! (spec §7) that every downstream crate's own error type implements.

use thiserror::Error;

/// The three error categories from spec §7. Each downstream crate's error
/// enum implements [`Categorized`] so a caller at the statement boundary can
/// apply the fixed policy for each category without matching on variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invariant violation, serialization error, logic bug: logged with a
    /// structured tag, propagated up, and translated into a generic
    /// "check error log" message if nothing more specific was set.
    Internal,
    /// Bad input, type mismatch, missing entity, refused uninstall: raised
    /// at the statement boundary naming the offending identifier.
    User,
    /// A failure during `write_all_uncommitted` or equivalent: triggers
    /// full statement rollback through the host transaction hooks.
    Transactional,
}

/// Implemented by every crate-local error enum so category-based policy can
/// be applied uniformly at the statement boundary.
pub trait Categorized {
    fn category(&self) -> ErrorCategory;
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier `{value}`: {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("invalid semantic version `{value}`: {reason}")]
    InvalidSemver { value: String, reason: String },
}

impl Categorized for CoreError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidIdentifier { .. } | Self::InvalidSemver { .. } => ErrorCategory::User,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
