//! Covers spec §8 properties 11 and 12 end-to-end against a real registered
//! extension (`vef-testkit`'s `complex_sample`), exercising type injection
//! (C8) and the VDF calling convention (C9) together the way a SQL executor
//! would at table-open, literal-injection, comparison, and per-row call
//! time.

use vef_catalog::{CleanupScope, TxnId};
use vef_core::{CaseSetting, ColumnEntry};
use vef_engine::typeinject::{
    attach_column_type, check_allowed_operation, compare_values, encode_literal, hash_value, resolve_type_name,
    validate_assignment, AssignmentSource, Field, OperationKind,
};
use vef_engine::vdf::VdfCall;
use vef_core::abi::{raw, CallResult};
use vef_testkit::{bootstrapped_catalog, install_complex_extension};

fn encode(context: &vef_core::TypeContext, literal: &str) -> Vec<u8> {
    encode_literal(context, literal).unwrap()
}

fn binary_arg(bytes: &[u8]) -> raw::AbiValue {
    raw::AbiValue {
        is_null: false,
        kind: raw::AbiValueKind::Binary,
        bytes_ptr: bytes.as_ptr(),
        bytes_len: bytes.len(),
        real: 0.0,
        int: 0,
    }
}

#[test]
fn complex_column_round_trips_through_table_open_literal_injection_ordering_and_vdf_calls() {
    let catalog = bootstrapped_catalog();
    let installed = install_complex_extension(&catalog);

    let column = std::sync::Arc::new(
        ColumnEntry::new(
            "shop",
            "points",
            "c",
            CaseSetting::FoldOnLookup,
            &installed.extension_name,
            installed.extension_version.clone(),
            "complex",
        )
        .unwrap(),
    );
    let txn = TxnId(2);
    catalog
        .with_write(|writer| {
            writer.columns_mut().mark_for_insertion(txn, column);
            Ok(())
        })
        .unwrap();
    catalog.commit_all(txn).unwrap();

    // Table open attaches the context the rest of this test reuses.
    let mut field = Field::new("c");
    let mut scope = CleanupScope::new();
    attach_column_type(&catalog, &mut field, "shop", "points", "c", CaseSetting::FoldOnLookup, &mut scope).unwrap();
    assert!(field.is_extension_typed());
    let context = field.type_context.unwrap();

    // Bare-name resolution (no other installed extension declares "complex").
    let resolved = resolve_type_name(&catalog, "complex", &mut scope).unwrap();
    assert_eq!(resolved.type_name.as_str(), "complex");

    // Literal injection: "(1,2)" becomes the 16-byte persisted form.
    let one_two = encode(&context, "(1,2)");
    assert_eq!(one_two.len(), 16);

    // Assignment to the column validates and stores the same persisted bytes.
    let assigned = validate_assignment(&context, AssignmentSource::PlainString("(1,2)")).unwrap();
    assert_eq!(assigned, one_two);

    // `c + 1` is not in the closed allowed-operation set for extension types.
    assert!(matches!(
        check_allowed_operation(OperationKind::Other, &[Some(&context)]),
        Err(vef_engine::error::EngineError::UnsupportedOperation { .. })
    ));

    // `ORDER BY c` uses the type's own comparison, real part first.
    let one_three = encode(&context, "(1,3)");
    assert_eq!(compare_values(&context, &one_two, &one_three), std::cmp::Ordering::Less);

    // complex_real(c) is a real-row VDF call returning the real component.
    let complex_real = installed.functions.iter().find(|f| f.name == "complex_real").unwrap();
    let mut call = VdfCall::new(complex_real);
    call.prerun().unwrap();
    let mut out_buffer = Vec::new();
    let args = [binary_arg(&one_two)];
    let result = call.call_row(&args, &mut out_buffer, 256).unwrap();
    match result {
        CallResult::Value(vef_core::abi::ArgumentValue::Real(value)) => assert_eq!(value, 1.0),
        other => panic!("expected a real result, got {other:?}"),
    }
    call.finish();

    // complex_add(c, c) sums both components, returned as the 16-byte form.
    let complex_add = installed.functions.iter().find(|f| f.name == "complex_add").unwrap();
    let mut call = VdfCall::new(complex_add);
    call.prerun().unwrap();
    let mut out_buffer = vec![0u8; 16];
    let args = [binary_arg(&one_two), binary_arg(&one_two)];
    let result = call.call_row(&args, &mut out_buffer, 256).unwrap();
    match result {
        CallResult::Value(vef_core::abi::ArgumentValue::Binary(sum)) => {
            let re = f64::from_le_bytes(sum[0..8].try_into().unwrap());
            let im = f64::from_le_bytes(sum[8..16].try_into().unwrap());
            assert_eq!((re, im), (2.0, 4.0));
        }
        other => panic!("expected a binary result, got {other:?}"),
    }
    call.finish();
}

#[test]
fn signedzero_hash_override_groups_negative_and_positive_zero_while_compare_already_treats_them_equal() {
    let catalog = bootstrapped_catalog();
    install_complex_extension(&catalog);

    let mut scope = CleanupScope::new();
    let context = resolve_type_name(&catalog, "signedzero", &mut scope).unwrap();

    let negative = encode(&context, "-0.0");
    let positive = encode(&context, "0.0");
    assert_ne!(negative, positive, "encode preserves the sign bit");

    assert_eq!(compare_values(&context, &negative, &positive), std::cmp::Ordering::Equal);
    assert_eq!(hash_value(&context, &negative), hash_value(&context, &positive));
}
