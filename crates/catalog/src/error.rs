use thiserror::Error;
use vef_core::{Categorized, ErrorCategory};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog is not initialized; reload_from_table has not completed")]
    NotInitialized,

    #[error("out of memory while inserting into the catalog")]
    OutOfMemory,

    #[error("row store failed during write_uncommitted_to_table for key `{key}`: {source}")]
    WriteUncommitted {
        key: String,
        #[source]
        source: crate::persistence::RowStoreError,
    },

    #[error(transparent)]
    Core(#[from] vef_core::CoreError),
}

impl Categorized for CatalogError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::NotInitialized => ErrorCategory::User,
            Self::OutOfMemory => ErrorCategory::Internal,
            Self::WriteUncommitted { .. } => ErrorCategory::Transactional,
            Self::Core(inner) => inner.category(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
