//! The extension ABI (spec §6): the C-linkage struct layer extensions are
//! built against, plus the safe, owned Rust types the rest of the crate
//! works with once a registration has been validated.
//!
//! Everything in the `raw` submodule is `#[repr(C)]` and crosses the FFI
//! boundary exactly as declared here; nothing else in this crate
//! constructs or reads those types except the loader's handshake code.

use std::fmt;

/// `encode(input, input_len, out, out_len) -> bytes_written_or_negative_error`
pub type EncodeFn = extern "C" fn(*const u8, usize, *mut u8, usize) -> i32;
/// `decode(input, input_len, out, out_len) -> bytes_written_or_negative_error`
pub type DecodeFn = extern "C" fn(*const u8, usize, *mut u8, usize) -> i32;
/// `compare(a, a_len, b, b_len) -> -1 | 0 | 1`
pub type CompareFn = extern "C" fn(*const u8, usize, *const u8, usize) -> i32;
/// `hash(bytes, len) -> u64`
pub type HashFn = extern "C" fn(*const u8, usize) -> u64;

pub type VdfFn = extern "C" fn(*mut raw::VdfCallContext, *const raw::AbiValue, usize, *mut raw::AbiResult) -> i32;
pub type PrerunFn = extern "C" fn(*mut raw::VdfCallContext) -> i32;
pub type PostrunFn = extern "C" fn(*mut raw::VdfCallContext);
pub type UnregisterFn = extern "C" fn(*mut raw::UnregisterArg, *mut raw::Registration);
pub type RegisterFn = extern "C" fn(*const raw::RegisterArg) -> *mut raw::Registration;

/// The ABI protocol version this host build speaks (spec §4.6 step 5).
pub const HOST_ABI_PROTOCOL_VERSION: u32 = 1;

/// A declared argument or return type for an extension function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiTypeTag {
    String,
    Real,
    Int,
    Custom(String),
}

impl fmt::Display for AbiTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "STRING"),
            Self::Real => write!(f, "REAL"),
            Self::Int => write!(f, "INT"),
            Self::Custom(name) => write!(f, "CUSTOM({name})"),
        }
    }
}

/// An extension function's signature plus its call-convention entry points,
/// owned after validation (spec §4.8/§4.9).
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<AbiTypeTag>,
    pub return_type: AbiTypeTag,
    pub vdf_fn: VdfFn,
    pub prerun_fn: Option<PrerunFn>,
    pub postrun_fn: Option<PostrunFn>,
}

/// A value passed to an extension function for one row (spec §6 "per-row
/// argument marshalling").
#[derive(Debug, Clone)]
pub enum ArgumentValue {
    Null,
    String(String),
    Binary(Vec<u8>),
    Real(f64),
    Int(i64),
}

/// What an extension produced for one row (spec §6 "per-row result").
#[derive(Debug, Clone)]
pub enum CallResult {
    Value(ArgumentValue),
    Null,
    Error(String),
}

/// The `#[repr(C)]` wire layer. Types here are constructed only by an
/// extension's shared library and read only by `vef-loader`'s handshake
/// code; the rest of the workspace never sees them directly.
pub mod raw {
    use std::ffi::c_void;
    use std::os::raw::c_char;

    #[repr(C)]
    pub struct RegisterArg {
        pub host_protocol_version: u32,
    }

    #[repr(C)]
    pub struct UnregisterArg {
        pub host_protocol_version: u32,
    }

    #[repr(C)]
    pub struct Registration {
        pub protocol_version: u32,
        pub extension_name_ptr: *const c_char,
        pub extension_name_len: usize,
        pub extension_version_ptr: *const c_char,
        pub extension_version_len: usize,
        pub type_count: usize,
        pub types: *const TypeDescriptorRaw,
        pub function_count: usize,
        pub functions: *const FunctionDescriptorRaw,
        /// Optional extension-owned callback, opaque to the host (spec
        /// §4.6 step 5: "Any optional callback pointer may be null").
        pub callback: *mut c_void,
    }

    #[repr(C)]
    pub struct TypeDescriptorRaw {
        pub name_ptr: *const c_char,
        pub name_len: usize,
        /// Fixed byte size, or -1 for variable-length.
        pub persisted_length: i64,
        pub max_decode_buffer_length: usize,
        pub encode: super::EncodeFn,
        pub decode: super::DecodeFn,
        pub compare: super::CompareFn,
        pub hash: Option<super::HashFn>,
    }

    #[repr(C)]
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub enum RawTypeKind {
        String = 0,
        Real = 1,
        Int = 2,
        Custom = 3,
    }

    #[repr(C)]
    pub struct RawTypeTag {
        pub kind: RawTypeKind,
        pub custom_name_ptr: *const c_char,
        pub custom_name_len: usize,
    }

    #[repr(C)]
    pub struct FunctionDescriptorRaw {
        pub name_ptr: *const c_char,
        pub name_len: usize,
        pub param_count: usize,
        pub params: *const RawTypeTag,
        pub return_type: RawTypeTag,
        pub vdf: super::VdfFn,
        pub prerun: Option<super::PrerunFn>,
        pub postrun: Option<super::PostrunFn>,
    }

    #[repr(C)]
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub enum AbiValueKind {
        String = 0,
        Binary = 1,
        Real = 2,
        Int = 3,
    }

    #[repr(C)]
    pub struct AbiValue {
        pub is_null: bool,
        pub kind: AbiValueKind,
        pub bytes_ptr: *const u8,
        pub bytes_len: usize,
        pub real: f64,
        pub int: i64,
    }

    #[repr(C)]
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub enum AbiResultKind {
        Value = 0,
        Null = 1,
        Error = 2,
    }

    /// Per-row result record (spec §6, §4.9 step 3). `out_ptr`/`out_len`
    /// describe the caller-provided buffer; an extension may instead
    /// populate `alternate_ptr`/`alternate_len` to return a pointer to its
    /// own memory, valid until the next per-row call or post-run.
    #[repr(C)]
    pub struct AbiResult {
        pub kind: AbiResultKind,
        pub value_kind: AbiValueKind,
        pub out_ptr: *mut u8,
        pub out_len: usize,
        pub written_len: usize,
        pub alternate_ptr: *const u8,
        pub alternate_len: usize,
        pub real: f64,
        pub int: i64,
        pub error_ptr: *const c_char,
        pub error_len: usize,
    }

    /// Opaque per-statement handle threaded through prerun/vdf/postrun,
    /// carrying whatever private state the extension allocated in prerun
    /// plus the host's requested-buffer-size override channel.
    #[repr(C)]
    pub struct VdfCallContext {
        pub user_data: *mut c_void,
        pub requested_buffer_size: usize,
    }
}

impl raw::VdfCallContext {
    pub fn empty() -> Self {
        Self {
            user_data: std::ptr::null_mut(),
            requested_buffer_size: 0,
        }
    }
}

/// The extension-owned registration pointer returned by `vef_register`,
/// retained so uninstall can pass the exact same pointer back to
/// `vef_unregister` (spec §6). Opaque outside `vef-loader`'s handshake and
/// teardown code.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationHandle(pub *mut raw::Registration);

// The pointee is freed only by `vef_unregister`, called explicitly by
// vef-loader's uninstall path under the Victionary write lock; nothing
// dereferences it from another thread concurrently.
unsafe impl Send for RegistrationHandle {}
unsafe impl Sync for RegistrationHandle {}
