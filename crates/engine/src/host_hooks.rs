//! Statement-lifecycle hooks beyond table-open and parse time: prepared
//! statements, triggers, stored routines, and temp-table propagation (spec
//! §4.8 "Prepared statements and session-bound contexts", "Temporary-table
//! propagation").

use std::sync::Arc;

use vef_catalog::CleanupScope;
use vef_core::TypeContext;

use crate::error::{EngineError, Result};

/// Rejects extension-typed values used as a prepared-statement INSERT/UPDATE
/// target, or found in a post-parse walk of `WHERE`/`JOIN`/`ORDER BY`.
/// Releases every acquisition held in `scope` on the failing path so a
/// rejected prepare leaves nothing pinned.
pub fn reject_in_prepared_statement(is_extension_typed: bool, scope: &mut CleanupScope) -> Result<()> {
    if is_extension_typed {
        scope.clear();
        return Err(EngineError::PreparedStatementRejected);
    }
    Ok(())
}

/// Rejects extension-typed values inside a trigger body.
pub fn reject_in_trigger(is_extension_typed: bool) -> Result<()> {
    if is_extension_typed {
        return Err(EngineError::TriggerRejected);
    }
    Ok(())
}

/// Rejects extension-typed values inside a stored routine body.
pub fn reject_in_stored_routine(is_extension_typed: bool) -> Result<()> {
    if is_extension_typed {
        return Err(EngineError::StoredRoutineRejected);
    }
    Ok(())
}

/// Copies a source column's `TypeContext` to a temp-table column, acquiring
/// it independently against the temp table's own memory-scope so the
/// source table's scope can be released without invalidating the copy
/// (spec §4.8 "Temporary-table propagation").
pub fn propagate_to_temp_table(source_context: &Arc<TypeContext>, temp_table_scope: &mut CleanupScope) -> Arc<TypeContext> {
    vef_catalog::acquire(source_context, temp_table_scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepared_statement_rejection_clears_the_scope() {
        let mut scope = CleanupScope::new();
        let result = reject_in_prepared_statement(true, &mut scope);
        assert!(matches!(result, Err(EngineError::PreparedStatementRejected)));
        assert_eq!(scope.held_count(), 0);
    }

    #[test]
    fn trigger_and_routine_allow_plain_values() {
        assert!(reject_in_trigger(false).is_ok());
        assert!(reject_in_stored_routine(false).is_ok());
        assert!(reject_in_trigger(true).is_err());
        assert!(reject_in_stored_routine(true).is_err());
    }
}
