use thiserror::Error;
use vef_core::{Categorized, ErrorCategory};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("column `{db}`.`{table}`.`{column}` references an uninstalled or incoherent type")]
    ColumnTypeNotFound { db: String, table: String, column: String },

    #[error("unknown type `{name}`")]
    UnknownTypeName { name: String },

    #[error("type `{name}` is ambiguous across more than one installed extension")]
    AmbiguousTypeName { name: String },

    #[error("invalid value for type `{type_name}`: {reason}")]
    WrongValue { type_name: String, reason: String },

    #[error("cannot assign a `{value_type}` value to a `{column_type}` column")]
    IncompatibleAssignment { column_type: String, value_type: String },

    #[error("expression is not assignable to extension-typed column `{column_type}`")]
    InvalidAssignmentExpression { column_type: String },

    #[error("operands of type `{type_name}` do not all share the same extension type")]
    MixedOperandTypes { type_name: String },

    #[error("operation is not permitted on extension-typed value of type `{type_name}`")]
    UnsupportedOperation { type_name: String },

    #[error("extension-typed values are not permitted in prepared statements")]
    PreparedStatementRejected,

    #[error("extension-typed values are not permitted in triggers")]
    TriggerRejected,

    #[error("extension-typed values are not permitted in stored routines")]
    StoredRoutineRejected,

    #[error("argument does not match declared parameter type `{declared}`")]
    ArgumentTypeMismatch { declared: String },

    #[error("extension function `{function}` failed to initialize")]
    CantInitializeUdf { function: String },

    #[error(transparent)]
    Core(#[from] vef_core::CoreError),

    #[error(transparent)]
    Catalog(#[from] vef_catalog::CatalogError),
}

impl Categorized for EngineError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::ColumnTypeNotFound { .. } => ErrorCategory::Internal,
            Self::Core(inner) => inner.category(),
            Self::Catalog(inner) => inner.category(),
            _ => ErrorCategory::User,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
