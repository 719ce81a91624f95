use thiserror::Error;
use vef_core::{Categorized, ErrorCategory};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("archive not found at `{path}`")]
    ArchiveNotFound { path: String },

    #[error("archive `{path}` is not a valid tar archive: {reason}")]
    MalformedArchive { path: String, reason: String },

    #[error("archive `{path}` is missing required entry `{entry}`")]
    MissingArchiveEntry { path: String, entry: String },

    #[error("archive `{path}` contains {count} shared libraries under lib/, expected exactly one")]
    AmbiguousSharedLibrary { path: String, count: usize },

    #[error("manifest.json in `{path}` is missing or malformed: {reason}")]
    MalformedManifest { path: String, reason: String },

    #[error("archive hash mismatch for extension `{extension_name}`: recorded `{recorded}`, on-disk `{actual}`")]
    HashMismatch {
        extension_name: String,
        recorded: String,
        actual: String,
    },

    #[error("failed to open shared library for extension `{extension_name}`: {reason}")]
    LibraryOpenFailed {
        extension_name: String,
        reason: String,
    },

    #[error("extension `{extension_name}` shared library is missing the `{symbol}` symbol")]
    MissingSymbol {
        extension_name: String,
        symbol: String,
    },

    #[error(
        "extension `{extension_name}` ABI protocol mismatch: host speaks {host_version}, extension speaks {extension_version}"
    )]
    AbiProtocolMismatch {
        extension_name: String,
        host_version: u32,
        extension_version: u32,
    },

    #[error("extension `{expected}` registered under the wrong name `{reported}`")]
    NameMismatch { expected: String, reported: String },

    #[error("extension `{extension_name}` declares an invalid type descriptor `{type_name}`: {reason}")]
    InvalidTypeDescriptor {
        extension_name: String,
        type_name: String,
        reason: String,
    },

    #[error(
        "extension `{extension_name}` declares an invalid function descriptor `{function_name}`: {reason}"
    )]
    InvalidFunctionDescriptor {
        extension_name: String,
        function_name: String,
        reason: String,
    },

    #[error("extension name `{name}` is already installed")]
    AlreadyInstalled { name: String },

    #[error("extension `{name}` is not installed")]
    NotInstalled { name: String },

    #[error(
        "cannot uninstall extension `{extension_name}`: column `{db}`.`{table}`.`{column}` still references it"
    )]
    ReferencedByColumn {
        extension_name: String,
        db: String,
        table: String,
        column: String,
    },

    #[error("cannot uninstall extension `{extension_name}`: `{what}` is still pinned (use-count {use_count})")]
    StillPinned {
        extension_name: String,
        what: String,
        use_count: usize,
    },

    #[error("io error at `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] vef_catalog::CatalogError),

    #[error(transparent)]
    Core(#[from] vef_core::CoreError),
}

impl Categorized for LoaderError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::ArchiveNotFound { .. }
            | Self::MalformedArchive { .. }
            | Self::MissingArchiveEntry { .. }
            | Self::AmbiguousSharedLibrary { .. }
            | Self::MalformedManifest { .. }
            | Self::LibraryOpenFailed { .. }
            | Self::MissingSymbol { .. }
            | Self::AbiProtocolMismatch { .. }
            | Self::NameMismatch { .. }
            | Self::InvalidTypeDescriptor { .. }
            | Self::InvalidFunctionDescriptor { .. }
            | Self::AlreadyInstalled { .. }
            | Self::NotInstalled { .. }
            | Self::ReferencedByColumn { .. }
            | Self::StillPinned { .. } => ErrorCategory::User,
            Self::HashMismatch { .. } | Self::Io { .. } => ErrorCategory::Internal,
            Self::Catalog(inner) => inner.category(),
            Self::Core(inner) => inner.category(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
