//! VDF call convention (C9): fix-fields, pre-run, per-row calls, post-run,
//! and result-buffer management (spec §4.9).

use std::sync::Arc;

use vef_core::abi::{raw, AbiTypeTag, ArgumentValue, CallResult, FunctionSignature};
use vef_core::TypeContext;

use crate::error::{EngineError, Result};
use crate::typeinject::encode_literal;

/// One call-site argument as the fix-fields phase sees it, before
/// conversion against the declared signature (spec §4.9 step 1).
pub enum RawArgument {
    Null,
    TypedValue { context: Arc<TypeContext>, bytes: Vec<u8> },
    StringLiteral(String),
    Real(f64),
    Int(i64),
    Other,
}

/// Converts one call-site argument against its declared parameter type. A
/// string-literal constant against a declared custom type is implicitly
/// encoded via that type's `encode` function; anything else that does not
/// match is rejected (spec §4.9 step 1 "fix-fields").
pub fn fix_field(
    declared: &AbiTypeTag,
    argument: RawArgument,
    resolve_custom: impl FnOnce(&str) -> Result<Arc<TypeContext>>,
) -> Result<ArgumentValue> {
    match (declared, argument) {
        (_, RawArgument::Null) => Ok(ArgumentValue::Null),
        (AbiTypeTag::Custom(name), RawArgument::TypedValue { context, bytes })
            if context.type_name.as_str().eq_ignore_ascii_case(name) =>
        {
            Ok(ArgumentValue::Binary(bytes))
        }
        (AbiTypeTag::Custom(name), RawArgument::StringLiteral(literal)) => {
            let context = resolve_custom(name)?;
            Ok(ArgumentValue::Binary(encode_literal(&context, &literal)?))
        }
        (AbiTypeTag::String, RawArgument::StringLiteral(literal)) => Ok(ArgumentValue::String(literal)),
        (AbiTypeTag::Real, RawArgument::Real(value)) => Ok(ArgumentValue::Real(value)),
        (AbiTypeTag::Int, RawArgument::Int(value)) => Ok(ArgumentValue::Int(value)),
        (declared, _) => Err(EngineError::ArgumentTypeMismatch { declared: declared.to_string() }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VdfState {
    Initialized,
    Active,
    Finalized,
}

/// Drives one extension function's calls for a statement, enforcing the
/// state machine from spec §4.9: `initialized → fix-fields (optional
/// prerun) → active (0..N row calls) → cleanup (optional postrun) →
/// finalized`. Any error transition runs `postrun` if `prerun` ran, then
/// finalizes; `Drop` guarantees this even on an early return.
pub struct VdfCall<'a> {
    signature: &'a FunctionSignature,
    context: raw::VdfCallContext,
    state: VdfState,
    ran_prerun: bool,
}

impl<'a> VdfCall<'a> {
    pub fn new(signature: &'a FunctionSignature) -> Self {
        Self {
            signature,
            context: raw::VdfCallContext::empty(),
            state: VdfState::Initialized,
            ran_prerun: false,
        }
    }

    /// The result-buffer size the extension requested during pre-run, if
    /// any override was made (spec §4.9 step 2).
    pub fn requested_buffer_size(&self) -> usize {
        self.context.requested_buffer_size
    }

    /// Runs pre-run if the extension declared one. A non-zero return code
    /// surfaces as `ER_CANT_INITIALIZE_UDF` and finalizes the call without
    /// ever entering `active` (spec §4.9 step 2).
    pub fn prerun(&mut self) -> Result<()> {
        if let Some(prerun_fn) = self.signature.prerun_fn {
            self.ran_prerun = true;
            let code = prerun_fn(&mut self.context);
            if code != 0 {
                self.finish();
                return Err(EngineError::CantInitializeUdf { function: self.signature.name.clone() });
            }
        }
        self.state = VdfState::Active;
        Ok(())
    }

    /// Invokes the function for one row. `out_buffer` is the caller-owned
    /// growable buffer the extension may write into; the extension may
    /// instead point to its own memory via an alternate buffer, valid until
    /// the next call or post-run (spec §4.9 step 3).
    pub fn call_row(&mut self, args: &[raw::AbiValue], out_buffer: &mut Vec<u8>, max_error_len: usize) -> Result<CallResult> {
        if self.state == VdfState::Initialized {
            self.state = VdfState::Active;
        }

        let mut result = raw::AbiResult {
            kind: raw::AbiResultKind::Null,
            value_kind: raw::AbiValueKind::Int,
            out_ptr: out_buffer.as_mut_ptr(),
            out_len: out_buffer.len(),
            written_len: 0,
            alternate_ptr: std::ptr::null(),
            alternate_len: 0,
            real: 0.0,
            int: 0,
            error_ptr: std::ptr::null(),
            error_len: 0,
        };

        let code = (self.signature.vdf_fn)(&mut self.context, args.as_ptr(), args.len(), &mut result);

        if code != 0 || matches!(result.kind, raw::AbiResultKind::Error) {
            return Ok(CallResult::Error(read_error_message(&result, max_error_len)));
        }

        match result.kind {
            raw::AbiResultKind::Null => Ok(CallResult::Null),
            raw::AbiResultKind::Value => Ok(CallResult::Value(read_value(&result, out_buffer))),
            raw::AbiResultKind::Error => unreachable!("handled above"),
        }
    }

    /// Runs post-run if declared, then finalizes. Idempotent: calling it
    /// more than once (or letting `Drop` call it after an explicit call)
    /// never runs post-run twice.
    pub fn finish(&mut self) {
        if self.state != VdfState::Finalized {
            if self.ran_prerun {
                if let Some(postrun_fn) = self.signature.postrun_fn {
                    postrun_fn(&mut self.context);
                }
            }
            self.state = VdfState::Finalized;
        }
    }
}

impl Drop for VdfCall<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

fn read_value(result: &raw::AbiResult, out_buffer: &[u8]) -> ArgumentValue {
    match result.value_kind {
        raw::AbiValueKind::Real => ArgumentValue::Real(result.real),
        raw::AbiValueKind::Int => ArgumentValue::Int(result.int),
        raw::AbiValueKind::String | raw::AbiValueKind::Binary => {
            let bytes = if !result.alternate_ptr.is_null() {
                unsafe { std::slice::from_raw_parts(result.alternate_ptr, result.alternate_len) }.to_vec()
            } else {
                let written = result.written_len.min(out_buffer.len());
                out_buffer[..written].to_vec()
            };
            if result.value_kind == raw::AbiValueKind::String {
                ArgumentValue::String(String::from_utf8_lossy(&bytes).into_owned())
            } else {
                ArgumentValue::Binary(bytes)
            }
        }
    }
}

/// Truncates an extension-reported error message to `max_len` bytes before
/// it is surfaced as a warning (spec §4.9, `ER_UDF_ERROR`).
fn read_error_message(result: &raw::AbiResult, max_len: usize) -> String {
    if result.error_ptr.is_null() || result.error_len == 0 {
        return "extension function failed".to_string();
    }
    let len = result.error_len.min(max_len);
    let bytes = unsafe { std::slice::from_raw_parts(result.error_ptr as *const u8, len) };
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn prerun_ok(_: *mut raw::VdfCallContext) -> i32 {
        0
    }
    extern "C" fn prerun_fails(_: *mut raw::VdfCallContext) -> i32 {
        1
    }
    extern "C" fn postrun_noop(_: *mut raw::VdfCallContext) {}

    extern "C" fn vdf_returns_int(
        _ctx: *mut raw::VdfCallContext,
        _args: *const raw::AbiValue,
        _len: usize,
        out: *mut raw::AbiResult,
    ) -> i32 {
        unsafe {
            (*out).kind = raw::AbiResultKind::Value;
            (*out).value_kind = raw::AbiValueKind::Int;
            (*out).int = 42;
        }
        0
    }

    extern "C" fn vdf_returns_error(
        _ctx: *mut raw::VdfCallContext,
        _args: *const raw::AbiValue,
        _len: usize,
        out: *mut raw::AbiResult,
    ) -> i32 {
        const MESSAGE: &[u8] = b"boom";
        unsafe {
            (*out).kind = raw::AbiResultKind::Error;
            (*out).error_ptr = MESSAGE.as_ptr() as *const std::os::raw::c_char;
            (*out).error_len = MESSAGE.len();
        }
        0
    }

    fn signature(vdf_fn: vef_core::abi::VdfFn, prerun: Option<vef_core::abi::PrerunFn>) -> FunctionSignature {
        FunctionSignature {
            name: "f".to_string(),
            params: vec![],
            return_type: AbiTypeTag::Int,
            vdf_fn,
            prerun_fn: prerun,
            postrun_fn: Some(postrun_noop),
        }
    }

    #[test]
    fn successful_row_call_returns_int_value() {
        let signature = signature(vdf_returns_int, Some(prerun_ok));
        let mut call = VdfCall::new(&signature);
        call.prerun().unwrap();
        let mut buffer = Vec::new();
        let result = call.call_row(&[], &mut buffer, 256).unwrap();
        assert!(matches!(result, CallResult::Value(ArgumentValue::Int(42))));
        call.finish();
    }

    #[test]
    fn prerun_failure_surfaces_cant_initialize_and_finalizes() {
        let signature = signature(vdf_returns_int, Some(prerun_fails));
        let mut call = VdfCall::new(&signature);
        let result = call.prerun();
        assert!(matches!(result, Err(EngineError::CantInitializeUdf { .. })));
    }

    #[test]
    fn row_error_is_truncated_to_max_len() {
        let signature = signature(vdf_returns_error, None);
        let mut call = VdfCall::new(&signature);
        let mut buffer = Vec::new();
        let result = call.call_row(&[], &mut buffer, 2).unwrap();
        match result {
            CallResult::Error(message) => assert_eq!(message, "bo"),
            _ => panic!("expected an error result"),
        }
    }
}
