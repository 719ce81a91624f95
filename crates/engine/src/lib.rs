//! Type injection and the VDF call convention (C8/C9) for the VillageSQL
//! Extension Framework: the bridge between a generic executor and
//! extension-defined types and functions.

pub mod error;
pub mod host_hooks;
pub mod typeinject;
pub mod vdf;

pub use error::{EngineError, Result};
pub use host_hooks::{propagate_to_temp_table, reject_in_prepared_statement, reject_in_stored_routine, reject_in_trigger};
pub use typeinject::{
    attach_column_type, check_allowed_operation, compare_values, encode_literal, hash_value, resolve_type_name,
    validate_assignment, AssignmentSource, Field, OperationKind,
};
pub use vdf::{fix_field, RawArgument, VdfCall};
