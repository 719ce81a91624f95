//! `vef`: a thin administrative CLI for installing, uninstalling, and
//! listing VillageSQL extensions without a full SQL host driving the
//! `INSTALL`/`UNINSTALL EXTENSION` grammar (which is explicitly out of
//! scope for this workspace).
//!
//! This is the one binary in the workspace allowed to use `anyhow`/`miette`;
//! every library crate below it classifies its own errors with `thiserror`
//! and the shared [`vef_core::Categorized`] taxonomy instead.

mod extension_store;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use vef_catalog::persistence::test_support::InMemoryRowStore;
use vef_catalog::{TxnId, Victionary};
use vef_core::{CaseSetting, VefConfig};
use vef_loader::install::install_extension;
use vef_loader::lock::test_support::AlwaysGrantLockHost;
use vef_loader::uninstall::uninstall_extension;

use extension_store::{extensions_file, FileExtensionStore};

/// Administrative interface to the VillageSQL Extension Framework catalog.
#[derive(Parser)]
#[command(name = "vef", version, about)]
struct Cli {
    /// Directory holding `<name>.veb` archives and the `_expanded/` cache.
    #[arg(long, global = true, default_value = "./veb")]
    veb_dir: PathBuf,

    /// Directory holding this CLI's own persisted state (the Extensions
    /// table; Properties and Columns are out of scope for a tool with no
    /// DDL grammar to populate them).
    #[arg(long, global = true, default_value = "./veb/_state")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install an extension from `<veb-dir>/<name>.veb`.
    Install { name: String },
    /// Uninstall a previously installed extension.
    Uninstall { name: String },
    /// List installed extensions, their versions, and archive hashes.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = VefConfig::new(cli.veb_dir, CaseSetting::FoldOnLookup);
    let extension_store = FileExtensionStore::open(extensions_file(&cli.state_dir))
        .into_diagnostic()
        .wrap_err("opening the extension state file")?;

    let catalog = Victionary::new(
        Box::new(InMemoryRowStore::new()),
        Box::new(InMemoryRowStore::new()),
        Box::new(extension_store),
    );
    catalog
        .bootstrap()
        .into_diagnostic()
        .wrap_err("bootstrapping the catalog from persisted state")?;

    let lock_host = AlwaysGrantLockHost;

    match cli.command {
        Command::Install { name } => {
            install_extension(&config, &catalog, &lock_host, TxnId(1), &name)
                .into_diagnostic()
                .wrap_err_with(|| format!("installing extension `{name}`"))?;
            println!("installed `{name}`");
        }
        Command::Uninstall { name } => {
            uninstall_extension(&catalog, &lock_host, TxnId(1), &name)
                .into_diagnostic()
                .wrap_err_with(|| format!("uninstalling extension `{name}`"))?;
            println!("uninstalled `{name}`");
        }
        Command::Status => {
            let extensions = catalog
                .extensions()
                .into_diagnostic()
                .wrap_err("reading the Extensions table")?
                .all_committed();
            if extensions.is_empty() {
                println!("no extensions installed");
            }
            for extension in extensions {
                println!(
                    "{}\t{}\t{}",
                    extension.extension_name.as_str(),
                    extension.extension_version,
                    extension.archive_hash
                );
            }
        }
    }

    Ok(())
}
