//! Dynamic library loading and the ABI handshake (spec §4.6 steps 4-6).
//!
//! Extensions are opened with the platform's local-symbol / lazy-binding
//! flags so their symbols never leak into the host's global namespace,
//! mirroring how native extension loaders keep plugin code from colliding
//! with the embedder.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use libloading::Library;
use vef_core::abi::raw::{self, RawTypeKind};
use vef_core::abi::{AbiTypeTag, FunctionSignature, HOST_ABI_PROTOCOL_VERSION};
use vef_core::{PersistedLength, RegistrationHandle, TypeDescriptor};
use vef_core::Semver;

use crate::error::{LoaderError, Result};

const REGISTER_SYMBOL: &[u8] = b"vef_register\0";
const UNREGISTER_SYMBOL: &[u8] = b"vef_unregister\0";

/// Function names reserved for host built-ins. Spec §9 leaves the
/// behaviour for a name collision undefined and recommends refusing
/// registration; this is that refusal's closed set.
const RESERVED_FUNCTION_NAMES: &[&str] =
    &["count", "sum", "avg", "min", "max", "length", "concat", "coalesce", "cast", "convert"];

/// A shared library opened and handshaken against the ABI, with its
/// declared types and functions converted to owned, safe Rust values.
///
/// Teardown is explicit, not RAII: `install.rs` folds this into an
/// `ExtensionDescriptor` and `uninstall.rs` later calls `unregister_fn` with
/// `registration` at the precise point spec §4.7 calls for, then drops
/// `library_handle` to unload the library. There is deliberately no `Drop`
/// impl here that would call `vef_unregister` at an unspecified time.
pub struct LoadedExtension {
    /// Keeps the library mapped for as long as anything derived from it
    /// (descriptors, function pointers) is reachable.
    pub library_handle: Arc<dyn Any + Send + Sync>,
    pub extension_name: String,
    pub extension_version: Semver,
    pub type_descriptors: Vec<TypeDescriptor>,
    pub functions: Vec<FunctionSignature>,
    pub unregister_fn: vef_core::abi::UnregisterFn,
    pub registration: RegistrationHandle,
}

/// Opens `path`, performs the ABI handshake, and validates the result
/// against `expected_name` (spec §4.6 steps 4-6).
pub fn load_and_handshake(path: &Path, expected_name: &str) -> Result<LoadedExtension> {
    let library = unsafe {
        open_with_local_symbols(path).map_err(|reason| LoaderError::LibraryOpenFailed {
            extension_name: expected_name.to_string(),
            reason,
        })?
    };

    let register: libloading::Symbol<vef_core::abi::RegisterFn> = unsafe {
        library
            .get(REGISTER_SYMBOL)
            .map_err(|_| LoaderError::MissingSymbol {
                extension_name: expected_name.to_string(),
                symbol: "vef_register".to_string(),
            })?
    };
    let unregister: libloading::Symbol<vef_core::abi::UnregisterFn> = unsafe {
        library
            .get(UNREGISTER_SYMBOL)
            .map_err(|_| LoaderError::MissingSymbol {
                extension_name: expected_name.to_string(),
                symbol: "vef_unregister".to_string(),
            })?
    };
    let unregister_fn = *unregister;

    let register_arg = raw::RegisterArg {
        host_protocol_version: HOST_ABI_PROTOCOL_VERSION,
    };
    let registration_ptr = register(&register_arg);
    if registration_ptr.is_null() {
        return Err(LoaderError::LibraryOpenFailed {
            extension_name: expected_name.to_string(),
            reason: "vef_register returned a null registration".to_string(),
        });
    }

    let registration = unsafe { &*registration_ptr };
    if registration.protocol_version != HOST_ABI_PROTOCOL_VERSION {
        unregister_now(unregister_fn, registration_ptr);
        return Err(LoaderError::AbiProtocolMismatch {
            extension_name: expected_name.to_string(),
            host_version: HOST_ABI_PROTOCOL_VERSION,
            extension_version: registration.protocol_version,
        });
    }

    let reported_name = unsafe { read_str(registration.extension_name_ptr, registration.extension_name_len) };
    let reported_name = match reported_name {
        Ok(name) => name,
        Err(reason) => {
            unregister_now(unregister_fn, registration_ptr);
            return Err(LoaderError::LibraryOpenFailed {
                extension_name: expected_name.to_string(),
                reason,
            });
        }
    };
    if !reported_name.eq_ignore_ascii_case(expected_name) {
        unregister_now(unregister_fn, registration_ptr);
        return Err(LoaderError::NameMismatch {
            expected: expected_name.to_string(),
            reported: reported_name,
        });
    }

    let reported_version =
        match unsafe { read_str(registration.extension_version_ptr, registration.extension_version_len) } {
            Ok(value) => value,
            Err(reason) => {
                unregister_now(unregister_fn, registration_ptr);
                return Err(LoaderError::LibraryOpenFailed {
                    extension_name: expected_name.to_string(),
                    reason,
                });
            }
        };
    let extension_version = match vef_core::parse_semver(&reported_version) {
        Ok(version) => version,
        Err(source) => {
            unregister_now(unregister_fn, registration_ptr);
            return Err(source.into());
        }
    };

    let type_descriptors = match unsafe {
        convert_type_descriptors(registration, expected_name, &extension_version)
    } {
        Ok(types) => types,
        Err(error) => {
            unregister_now(unregister_fn, registration_ptr);
            return Err(error);
        }
    };

    let functions = match unsafe { convert_function_descriptors(registration, expected_name) } {
        Ok(functions) => functions,
        Err(error) => {
            unregister_now(unregister_fn, registration_ptr);
            return Err(error);
        }
    };

    Ok(LoadedExtension {
        library_handle: Arc::new(library),
        extension_name: reported_name,
        extension_version,
        type_descriptors,
        functions,
        unregister_fn,
        registration: RegistrationHandle(registration_ptr),
    })
}

fn unregister_now(unregister_fn: vef_core::abi::UnregisterFn, registration_ptr: *mut raw::Registration) {
    let mut unregister_arg = raw::UnregisterArg {
        host_protocol_version: HOST_ABI_PROTOCOL_VERSION,
    };
    unregister_fn(&mut unregister_arg, registration_ptr);
}

#[cfg(unix)]
unsafe fn open_with_local_symbols(path: &Path) -> std::result::Result<Library, String> {
    let flags = libloading::os::unix::RTLD_NOW | libloading::os::unix::RTLD_LOCAL;
    libloading::os::unix::Library::open(Some(path), flags)
        .map(Library::from)
        .map_err(|error| error.to_string())
}

#[cfg(not(unix))]
unsafe fn open_with_local_symbols(path: &Path) -> std::result::Result<Library, String> {
    Library::new(path).map_err(|error| error.to_string())
}

unsafe fn read_str(ptr: *const std::os::raw::c_char, len: usize) -> std::result::Result<String, String> {
    if ptr.is_null() {
        return Err("unexpected null string pointer in registration".to_string());
    }
    let bytes = std::slice::from_raw_parts(ptr as *const u8, len);
    std::str::from_utf8(bytes)
        .map(ToString::to_string)
        .map_err(|error| format!("invalid UTF-8 in registration string: {error}"))
}

unsafe fn read_type_tag(tag: &raw::RawTypeTag) -> std::result::Result<AbiTypeTag, String> {
    match tag.kind {
        RawTypeKind::String => Ok(AbiTypeTag::String),
        RawTypeKind::Real => Ok(AbiTypeTag::Real),
        RawTypeKind::Int => Ok(AbiTypeTag::Int),
        RawTypeKind::Custom => {
            let name = read_str(tag.custom_name_ptr, tag.custom_name_len)?;
            Ok(AbiTypeTag::Custom(name))
        }
    }
}

unsafe fn convert_type_descriptors(
    registration: &raw::Registration,
    extension_name: &str,
    extension_version: &Semver,
) -> Result<Vec<TypeDescriptor>> {
    let raw_types = if registration.type_count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(registration.types, registration.type_count)
    };

    let mut descriptors = Vec::with_capacity(raw_types.len());
    for raw_type in raw_types {
        let name = read_str(raw_type.name_ptr, raw_type.name_len).map_err(|reason| {
            LoaderError::InvalidTypeDescriptor {
                extension_name: extension_name.to_string(),
                type_name: "<unreadable>".to_string(),
                reason,
            }
        })?;

        let persisted_length = if raw_type.persisted_length < 0 {
            PersistedLength::Variable
        } else {
            PersistedLength::Fixed(raw_type.persisted_length as u32)
        };

        let descriptor = TypeDescriptor::new(
            &name,
            extension_name,
            extension_version.clone(),
            persisted_length,
            raw_type.max_decode_buffer_length as u32,
            raw_type.encode,
            raw_type.decode,
            raw_type.compare,
            raw_type.hash,
        )
        .map_err(|source| LoaderError::InvalidTypeDescriptor {
            extension_name: extension_name.to_string(),
            type_name: name.clone(),
            reason: source.to_string(),
        })?;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

unsafe fn convert_function_descriptors(
    registration: &raw::Registration,
    extension_name: &str,
) -> Result<Vec<FunctionSignature>> {
    let raw_functions = if registration.function_count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(registration.functions, registration.function_count)
    };

    let mut functions = Vec::with_capacity(raw_functions.len());
    for raw_function in raw_functions {
        let name = read_str(raw_function.name_ptr, raw_function.name_len).map_err(|reason| {
            LoaderError::InvalidFunctionDescriptor {
                extension_name: extension_name.to_string(),
                function_name: "<unreadable>".to_string(),
                reason,
            }
        })?;

        if RESERVED_FUNCTION_NAMES.iter().any(|reserved| reserved.eq_ignore_ascii_case(&name)) {
            return Err(LoaderError::InvalidFunctionDescriptor {
                extension_name: extension_name.to_string(),
                function_name: name,
                reason: "collides with a host built-in function name".to_string(),
            });
        }

        let raw_params = if raw_function.param_count == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(raw_function.params, raw_function.param_count)
        };
        let mut params = Vec::with_capacity(raw_params.len());
        for raw_param in raw_params {
            let tag = read_type_tag(raw_param).map_err(|reason| LoaderError::InvalidFunctionDescriptor {
                extension_name: extension_name.to_string(),
                function_name: name.clone(),
                reason,
            })?;
            params.push(tag);
        }
        let return_type = read_type_tag(&raw_function.return_type).map_err(|reason| {
            LoaderError::InvalidFunctionDescriptor {
                extension_name: extension_name.to_string(),
                function_name: name.clone(),
                reason,
            }
        })?;

        functions.push(FunctionSignature {
            name,
            params,
            return_type,
            vdf_fn: raw_function.vdf,
            prerun_fn: raw_function.prerun,
            postrun_fn: raw_function.postrun,
        });
    }
    Ok(functions)
}
