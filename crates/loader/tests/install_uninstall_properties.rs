//! Covers spec §8 properties 9 and 10 against a real registered extension
//! (`vef-testkit`'s `complex_sample`), without driving a real `.veb` archive
//! through `libloading` — `vef_loader::uninstall_extension` is exercised
//! exactly as `install.rs`'s own writes would leave the catalog.

use std::sync::Arc;

use vef_catalog::TxnId;
use vef_core::{CaseSetting, ColumnEntry};
use vef_loader::lock::test_support::AlwaysGrantLockHost;
use vef_loader::uninstall_extension;
use vef_loader::LoaderError;
use vef_testkit::{bootstrapped_catalog, install_complex_extension};

#[test]
fn install_then_uninstall_round_trips_and_clears_every_owned_entry() {
    let catalog = bootstrapped_catalog();
    let installed = install_complex_extension(&catalog);

    assert!(catalog
        .extensions()
        .unwrap()
        .all_committed()
        .iter()
        .any(|entry| entry.extension_name.as_str().eq_ignore_ascii_case(&installed.extension_name)
            && entry.archive_hash == "0".repeat(64)));
    assert_eq!(
        catalog.owned_type_descriptors(&installed.extension_name).unwrap().len(),
        2
    );

    uninstall_extension(&catalog, &AlwaysGrantLockHost, TxnId(2), &installed.extension_name).unwrap();

    assert!(catalog
        .extensions()
        .unwrap()
        .all_committed()
        .iter()
        .all(|entry| !entry.extension_name.as_str().eq_ignore_ascii_case(&installed.extension_name)));
    assert!(catalog
        .owned_type_descriptors(&installed.extension_name)
        .unwrap()
        .is_empty());
    assert!(catalog
        .owned_extension_descriptors(&installed.extension_name)
        .unwrap()
        .is_empty());
}

#[test]
fn uninstall_is_refused_while_a_column_still_references_the_extension() {
    let catalog = bootstrapped_catalog();
    let installed = install_complex_extension(&catalog);

    let column = Arc::new(
        ColumnEntry::new(
            "shop",
            "samples",
            "value",
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

    let result = uninstall_extension(&catalog, &AlwaysGrantLockHost, TxnId(3), &installed.extension_name);
    match result {
        Err(LoaderError::ReferencedByColumn { db, table, column, .. }) => {
            assert_eq!(db, "shop");
            assert_eq!(table, "samples");
            assert_eq!(column, "value");
        }
        other => panic!("expected ReferencedByColumn, got {other:?}"),
    }

    // Committed state is unchanged: the extension is still installed.
    assert!(catalog
        .extensions()
        .unwrap()
        .all_committed()
        .iter()
        .any(|entry| entry.extension_name.as_str().eq_ignore_ascii_case(&installed.extension_name)));
}
