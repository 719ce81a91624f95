//! A reference extension exposing a `COMPLEX` type and a `SIGNEDZERO` type
//! through the real ABI entry points (spec §8 properties 11 and 12).
//!
//! In a real deployment this module would be its own `cdylib` crate,
//! packaged into a `.veb` archive and loaded via `libloading`. Exposing the
//! same `extern "C" fn vef_register`/`vef_unregister` pair as plain
//! functions here lets `vef-engine`/`vef-loader` integration tests exercise
//! the identical registration structure in-process, without a real dynamic
//! library on disk.

use std::os::raw::c_char;

use vef_core::abi::raw::{self, RawTypeKind};

const EXTENSION_NAME: &[u8] = b"complex_sample";
const EXTENSION_VERSION: &[u8] = b"1.0.0";

const COMPLEX_TYPE_NAME: &[u8] = b"complex";
const SIGNEDZERO_TYPE_NAME: &[u8] = b"signedzero";
const COMPLEX_ADD_NAME: &[u8] = b"complex_add";
const COMPLEX_REAL_NAME: &[u8] = b"complex_real";

/// Everything the returned `Registration` points into. Boxed once and
/// stashed in `Registration::callback`; `vef_unregister` reconstructs and
/// drops it, freeing every owned buffer in one place.
struct RegistrationData {
    complex_add_params: Vec<raw::RawTypeTag>,
    complex_real_params: Vec<raw::RawTypeTag>,
    type_descriptors: Vec<raw::TypeDescriptorRaw>,
    function_descriptors: Vec<raw::FunctionDescriptorRaw>,
}

fn custom_tag(name: &'static [u8]) -> raw::RawTypeTag {
    raw::RawTypeTag {
        kind: RawTypeKind::Custom,
        custom_name_ptr: name.as_ptr() as *const c_char,
        custom_name_len: name.len(),
    }
}

fn real_tag() -> raw::RawTypeTag {
    raw::RawTypeTag {
        kind: RawTypeKind::Real,
        custom_name_ptr: std::ptr::null(),
        custom_name_len: 0,
    }
}

/// Builds the registration and returns the pointer the ABI's
/// `vef_register` hands back. Ignores `arg`'s requested protocol version:
/// this reference extension only ever speaks the one the host build
/// defines.
pub extern "C" fn vef_register(_arg: *const raw::RegisterArg) -> *mut raw::Registration {
    let complex_add_params = vec![custom_tag(COMPLEX_TYPE_NAME), custom_tag(COMPLEX_TYPE_NAME)];
    let complex_real_params = vec![custom_tag(COMPLEX_TYPE_NAME)];

    let type_descriptors = vec![
        raw::TypeDescriptorRaw {
            name_ptr: COMPLEX_TYPE_NAME.as_ptr() as *const c_char,
            name_len: COMPLEX_TYPE_NAME.len(),
            persisted_length: 16,
            max_decode_buffer_length: 64,
            encode: encode_complex,
            decode: decode_complex,
            compare: compare_complex,
            hash: None,
        },
        raw::TypeDescriptorRaw {
            name_ptr: SIGNEDZERO_TYPE_NAME.as_ptr() as *const c_char,
            name_len: SIGNEDZERO_TYPE_NAME.len(),
            persisted_length: 8,
            max_decode_buffer_length: 32,
            encode: encode_signedzero,
            decode: decode_signedzero,
            compare: compare_signedzero,
            hash: Some(hash_signedzero),
        },
    ];

    let mut data = Box::new(RegistrationData {
        complex_add_params,
        complex_real_params,
        type_descriptors,
        function_descriptors: Vec::new(),
    });

    data.function_descriptors = vec![
        raw::FunctionDescriptorRaw {
            name_ptr: COMPLEX_ADD_NAME.as_ptr() as *const c_char,
            name_len: COMPLEX_ADD_NAME.len(),
            param_count: data.complex_add_params.len(),
            params: data.complex_add_params.as_ptr(),
            return_type: custom_tag(COMPLEX_TYPE_NAME),
            vdf: complex_add,
            prerun: None,
            postrun: None,
        },
        raw::FunctionDescriptorRaw {
            name_ptr: COMPLEX_REAL_NAME.as_ptr() as *const c_char,
            name_len: COMPLEX_REAL_NAME.len(),
            param_count: data.complex_real_params.len(),
            params: data.complex_real_params.as_ptr(),
            return_type: real_tag(),
            vdf: complex_real,
            prerun: None,
            postrun: None,
        },
    ];

    let registration = Box::new(raw::Registration {
        protocol_version: vef_core::abi::HOST_ABI_PROTOCOL_VERSION,
        extension_name_ptr: EXTENSION_NAME.as_ptr() as *const c_char,
        extension_name_len: EXTENSION_NAME.len(),
        extension_version_ptr: EXTENSION_VERSION.as_ptr() as *const c_char,
        extension_version_len: EXTENSION_VERSION.len(),
        type_count: data.type_descriptors.len(),
        types: data.type_descriptors.as_ptr(),
        function_count: data.function_descriptors.len(),
        functions: data.function_descriptors.as_ptr(),
        callback: Box::into_raw(data) as *mut std::ffi::c_void,
    });

    Box::into_raw(registration)
}

/// Frees the registration and every buffer it pointed into (spec §6
/// `vef_unregister`: "frees all extension-owned memory from
/// registration").
pub extern "C" fn vef_unregister(_arg: *mut raw::UnregisterArg, registration: *mut raw::Registration) {
    if registration.is_null() {
        return;
    }
    unsafe {
        let registration = Box::from_raw(registration);
        if !registration.callback.is_null() {
            drop(Box::from_raw(registration.callback as *mut RegistrationData));
        }
    }
}

fn parse_complex(bytes: &[u8]) -> Option<(f64, f64)> {
    let text = std::str::from_utf8(bytes).ok()?;
    let trimmed = text.trim().trim_start_matches('(').trim_end_matches(')');
    let (re, im) = trimmed.split_once(',')?;
    Some((re.trim().parse().ok()?, im.trim().parse().ok()?))
}

extern "C" fn encode_complex(input: *const u8, input_len: usize, out: *mut u8, out_len: usize) -> i32 {
    if out_len < 16 {
        return -1;
    }
    let Some((re, im)) = parse_complex(unsafe { std::slice::from_raw_parts(input, input_len) }) else {
        return -1;
    };
    unsafe {
        std::ptr::copy_nonoverlapping(re.to_le_bytes().as_ptr(), out, 8);
        std::ptr::copy_nonoverlapping(im.to_le_bytes().as_ptr(), out.add(8), 8);
    }
    16
}

extern "C" fn decode_complex(input: *const u8, input_len: usize, out: *mut u8, out_len: usize) -> i32 {
    if input_len < 16 {
        return -1;
    }
    let bytes = unsafe { std::slice::from_raw_parts(input, input_len) };
    let re = f64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let im = f64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let text = format!("({re},{im})");
    if text.len() > out_len {
        return -1;
    }
    unsafe { std::ptr::copy_nonoverlapping(text.as_ptr(), out, text.len()) };
    text.len() as i32
}

extern "C" fn compare_complex(a: *const u8, a_len: usize, b: *const u8, b_len: usize) -> i32 {
    if a_len < 16 || b_len < 16 {
        return 0;
    }
    let a = unsafe { std::slice::from_raw_parts(a, a_len) };
    let b = unsafe { std::slice::from_raw_parts(b, b_len) };
    let a_re = f64::from_le_bytes(a[0..8].try_into().unwrap());
    let a_im = f64::from_le_bytes(a[8..16].try_into().unwrap());
    let b_re = f64::from_le_bytes(b[0..8].try_into().unwrap());
    let b_im = f64::from_le_bytes(b[8..16].try_into().unwrap());
    match (a_re, a_im).partial_cmp(&(b_re, b_im)) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Greater) => 1,
        _ => 0,
    }
}

extern "C" fn encode_signedzero(input: *const u8, input_len: usize, out: *mut u8, out_len: usize) -> i32 {
    if out_len < 8 {
        return -1;
    }
    let text = match std::str::from_utf8(unsafe { std::slice::from_raw_parts(input, input_len) }) {
        Ok(text) => text,
        Err(_) => return -1,
    };
    let Ok(value) = text.trim().parse::<f64>() else {
        return -1;
    };
    // Preserves the sign of zero exactly: this is the type property 12's
    // "hash override" scenario needs (encode does NOT canonicalise it away).
    unsafe { std::ptr::copy_nonoverlapping(value.to_le_bytes().as_ptr(), out, 8) };
    8
}

extern "C" fn decode_signedzero(input: *const u8, input_len: usize, out: *mut u8, out_len: usize) -> i32 {
    if input_len < 8 {
        return -1;
    }
    let bytes = unsafe { std::slice::from_raw_parts(input, input_len) };
    let value = f64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let text = value.to_string();
    if text.len() > out_len {
        return -1;
    }
    unsafe { std::ptr::copy_nonoverlapping(text.as_ptr(), out, text.len()) };
    text.len() as i32
}

extern "C" fn compare_signedzero(a: *const u8, a_len: usize, b: *const u8, b_len: usize) -> i32 {
    if a_len < 8 || b_len < 8 {
        return 0;
    }
    let a = f64::from_le_bytes(unsafe { std::slice::from_raw_parts(a, a_len) }[0..8].try_into().unwrap());
    let b = f64::from_le_bytes(unsafe { std::slice::from_raw_parts(b, b_len) }[0..8].try_into().unwrap());
    // IEEE 754 equality treats -0.0 == 0.0, matching spec §8 property 12
    // ("compare treats them as equal").
    match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Greater) => 1,
        _ => 0,
    }
}

extern "C" fn hash_signedzero(bytes: *const u8, len: usize) -> u64 {
    use std::hash::{Hash, Hasher};
    if len < 8 {
        return 0;
    }
    let mut value = f64::from_le_bytes(unsafe { std::slice::from_raw_parts(bytes, len) }[0..8].try_into().unwrap());
    if value == 0.0 {
        value = 0.0; // canonicalises -0.0 to +0.0 before hashing
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.to_bits().hash(&mut hasher);
    hasher.finish()
}

extern "C" fn complex_add(
    _ctx: *mut raw::VdfCallContext,
    args: *const raw::AbiValue,
    args_len: usize,
    out: *mut raw::AbiResult,
) -> i32 {
    if args_len < 2 {
        return -1;
    }
    let args = unsafe { std::slice::from_raw_parts(args, args_len) };
    let Some(a) = read_complex_arg(&args[0]) else { return -1 };
    let Some(b) = read_complex_arg(&args[1]) else { return -1 };
    let sum = (a.0 + b.0, a.1 + b.1);

    unsafe {
        let result = &mut *out;
        if result.out_len < 16 {
            return -1;
        }
        std::ptr::copy_nonoverlapping(sum.0.to_le_bytes().as_ptr(), result.out_ptr, 8);
        std::ptr::copy_nonoverlapping(sum.1.to_le_bytes().as_ptr(), result.out_ptr.add(8), 8);
        result.kind = raw::AbiResultKind::Value;
        result.value_kind = raw::AbiValueKind::Binary;
        result.written_len = 16;
    }
    0
}

extern "C" fn complex_real(
    _ctx: *mut raw::VdfCallContext,
    args: *const raw::AbiValue,
    args_len: usize,
    out: *mut raw::AbiResult,
) -> i32 {
    if args_len < 1 {
        return -1;
    }
    let args = unsafe { std::slice::from_raw_parts(args, args_len) };
    let Some((re, _)) = read_complex_arg(&args[0]) else { return -1 };
    unsafe {
        let result = &mut *out;
        result.kind = raw::AbiResultKind::Value;
        result.value_kind = raw::AbiValueKind::Real;
        result.real = re;
    }
    0
}

fn read_complex_arg(value: &raw::AbiValue) -> Option<(f64, f64)> {
    if value.is_null || value.bytes_len < 16 {
        return None;
    }
    let bytes = unsafe { std::slice::from_raw_parts(value.bytes_ptr, value.bytes_len) };
    Some((
        f64::from_le_bytes(bytes[0..8].try_into().ok()?),
        f64::from_le_bytes(bytes[8..16].try_into().ok()?),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_unregister_round_trips_without_leaking_or_crashing() {
        let registration_ptr = vef_register(std::ptr::null());
        assert!(!registration_ptr.is_null());
        let registration = unsafe { &*registration_ptr };
        assert_eq!(registration.type_count, 2);
        assert_eq!(registration.function_count, 2);

        let mut unregister_arg = raw::UnregisterArg { host_protocol_version: vef_core::abi::HOST_ABI_PROTOCOL_VERSION };
        vef_unregister(&mut unregister_arg, registration_ptr);
    }

    #[test]
    fn complex_encode_decode_round_trips() {
        let mut encoded = vec![0u8; 16];
        let written = encode_complex(b"(1,2)".as_ptr(), 5, encoded.as_mut_ptr(), encoded.len());
        assert_eq!(written, 16);

        let mut decoded = vec![0u8; 64];
        let decoded_len = decode_complex(encoded.as_ptr(), encoded.len(), decoded.as_mut_ptr(), decoded.len());
        assert!(decoded_len > 0);
        let text = std::str::from_utf8(&decoded[..decoded_len as usize]).unwrap();
        assert_eq!(text, "(1,2)");
    }

    #[test]
    fn compare_complex_orders_by_real_then_imaginary() {
        let mut a = vec![0u8; 16];
        let mut b = vec![0u8; 16];
        encode_complex(b"(1,2)".as_ptr(), 5, a.as_mut_ptr(), a.len());
        encode_complex(b"(1,3)".as_ptr(), 5, b.as_mut_ptr(), b.len());
        assert_eq!(compare_complex(a.as_ptr(), a.len(), b.as_ptr(), b.len()), -1);
    }

    #[test]
    fn signedzero_hash_canonicalises_negative_zero_but_compare_already_treats_it_equal() {
        let mut negative = vec![0u8; 8];
        let mut positive = vec![0u8; 8];
        encode_signedzero(b"-0.0".as_ptr(), 4, negative.as_mut_ptr(), 8);
        encode_signedzero(b"0.0".as_ptr(), 3, positive.as_mut_ptr(), 8);
        assert_ne!(negative, positive, "encode must preserve the sign bit");

        assert_eq!(compare_signedzero(negative.as_ptr(), 8, positive.as_ptr(), 8), 0);
        assert_eq!(
            hash_signedzero(negative.as_ptr(), 8),
            hash_signedzero(positive.as_ptr(), 8)
        );
    }
}
