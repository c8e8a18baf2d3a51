// ABOUTME: Entry point for the changeset binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs ledger and package build commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use changeset_builder::{
    BuildOutcome, BuildReport, BuildRequest, BuilderConfig, CancelFlag, CatalogResolver,
    ChangeRecorder, CommitMode, PackageBuilder,
};
use changeset_core::{ChangeKind, EntityKind, default_package_name};
use changeset_store::{ChangeLedger, SqliteLedger};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input};
use is_terminal::IsTerminal;

/// Changeset - records entity changes and packages them for delivery
#[derive(Parser, Debug)]
#[command(name = "changeset")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Package every pending change into <name>.xml and clear the ledger
    Build {
        /// Package name (prompted for on a terminal when omitted)
        name: Option<String>,

        /// Use the timestamp name without prompting
        #[arg(long, conflicts_with = "name")]
        default: bool,

        /// Fail instead of overwriting an existing package
        #[arg(long)]
        no_clobber: bool,

        /// Clear the whole ledger on commit, including changes made mid-build
        #[arg(long)]
        truncate: bool,
    },

    /// List pending changes
    Status {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a change, as the host's save and delete hooks would
    Record {
        /// Entity kind (content-type, data-type, template, stylesheet, macro, partial-view)
        kind: EntityKind,

        /// Entity name
        name: String,

        /// Record a deletion instead of a save
        #[arg(long)]
        deleted: bool,
    },

    /// Drop one pending change without packaging it
    Forget { kind: EntityKind, name: String },

    /// Drop every pending change
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("changeset=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = BuilderConfig::from_env()?;
    tracing::debug!("using ledger at {}", config.ledger_path.display());

    match cli.command {
        Commands::Build {
            name,
            default,
            no_clobber,
            truncate,
        } => build(config, name, default, no_clobber, truncate).await,
        Commands::Status { json } => status(&config, json),
        Commands::Record {
            kind,
            name,
            deleted,
        } => record(&config, kind, &name, deleted),
        Commands::Forget { kind, name } => forget(&config, kind, &name),
        Commands::Clear { yes } => clear(&config, yes),
    }
}

fn open_ledger(config: &BuilderConfig) -> anyhow::Result<Arc<SqliteLedger>> {
    let ledger = SqliteLedger::open_with_table(&config.ledger_path, &config.table)
        .with_context(|| format!("opening ledger at {}", config.ledger_path.display()))?;
    Ok(Arc::new(ledger))
}

fn load_catalog(path: &Path) -> anyhow::Result<CatalogResolver> {
    CatalogResolver::load(path).with_context(|| {
        format!(
            "a catalog of live entities is required to build; set CHANGESET_CATALOG or create {}",
            path.display()
        )
    })
}

async fn build(
    config: BuilderConfig,
    name: Option<String>,
    use_default: bool,
    no_clobber: bool,
    truncate: bool,
) -> anyhow::Result<()> {
    let ledger = open_ledger(&config)?;
    if ledger.is_empty()? {
        println!("No changes have been made. Nothing has been written to disk.");
        return Ok(());
    }

    let resolver = load_catalog(&config.catalog_path)?;
    let name = resolve_name(name, use_default, std::io::stdin().is_terminal())?;

    let mut options = config.build_options();
    options.no_clobber |= no_clobber;
    if truncate {
        options.commit_mode = CommitMode::Truncate;
    }

    let builder = PackageBuilder::new(ledger, Arc::new(resolver), options);
    let cancel = CancelFlag::new();
    let request = BuildRequest {
        name,
        cancel: cancel.clone(),
    };

    let mut task = tokio::task::spawn_blocking(move || builder.build(request));
    let result = tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupt received; cancelling build");
            cancel.cancel();
            task.await?
        }
    };

    match result {
        Ok(BuildOutcome::NoChanges) => {
            println!("No changes have been made. Nothing has been written to disk.");
            Ok(())
        }
        Ok(BuildOutcome::Built(report)) => {
            print_report(&report);
            Ok(())
        }
        Err(e) if !e.ledger_untouched() => {
            eprintln!(
                "The package was written but pending changes were not cleared. \
                 Deliver it, then run `changeset clear` before building again."
            );
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// The package name for a build; `None` means the timestamp default. The
/// operator is only prompted on an interactive terminal.
fn resolve_name(
    name: Option<String>,
    use_default: bool,
    interactive: bool,
) -> anyhow::Result<Option<String>> {
    match name {
        Some(name) => Ok(Some(name)),
        None if use_default || !interactive => Ok(None),
        None => prompt_name().map(Some),
    }
}

fn prompt_name() -> anyhow::Result<String> {
    let name: String = Input::new()
        .with_prompt("Package name")
        .default(default_package_name())
        .interact_text()?;
    Ok(name)
}

fn print_report(report: &BuildReport) {
    println!(
        "All changes have been packaged as '{}' at {}.",
        report.package_name,
        report.artifact_path.display()
    );
    for (kind, count) in &report.sections {
        println!("  {:<14} {}", kind.label(), count);
    }
    for gap in &report.unresolved {
        println!("  skipped {} '{}': no longer exists", gap.kind, gap.name);
    }
    for deletion in &report.noted_deletions {
        println!(
            "  skipped {} '{}': deleted, remove it on the target by hand",
            deletion.kind, deletion.name
        );
    }
    for record in &report.unpackaged {
        println!("  skipped {} '{}': not packaged", record.kind, record.name);
    }
    println!(
        "Next: run the delivery tool against {}.",
        report.manifest_path.display()
    );
}

fn status(config: &BuilderConfig, json: bool) -> anyhow::Result<()> {
    let records = open_ledger(config)?.read_all()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No pending changes.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{:<14} {:<8} {}  {}",
            record.kind.label(),
            record.change_kind.label(),
            record.change_date.format("%Y-%m-%d %H:%M:%S"),
            record.name
        );
    }
    println!("{} pending change(s).", records.len());
    Ok(())
}

fn record(
    config: &BuilderConfig,
    kind: EntityKind,
    name: &str,
    deleted: bool,
) -> anyhow::Result<()> {
    let change_kind = if deleted {
        ChangeKind::Deleted
    } else {
        ChangeKind::Saved
    };

    let recorder = ChangeRecorder::new(open_ledger(config)?);
    match recorder.record(kind, name, change_kind)? {
        Some(record) => println!(
            "Recorded {} {} '{}'.",
            record.change_kind, record.kind, record.name
        ),
        None => println!("Ignored: entity name is blank."),
    }
    Ok(())
}

fn forget(config: &BuilderConfig, kind: EntityKind, name: &str) -> anyhow::Result<()> {
    if open_ledger(config)?.forget(kind, name)? {
        println!("Forgot pending change to {} '{}'.", kind, name);
    } else {
        println!("No pending change to {} '{}'.", kind, name);
    }
    Ok(())
}

fn clear(config: &BuilderConfig, yes: bool) -> anyhow::Result<()> {
    if !yes {
        if !std::io::stdin().is_terminal() {
            bail!("refusing to clear pending changes without --yes");
        }
        let confirmed = Confirm::new()
            .with_prompt("Drop every pending change?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Nothing cleared.");
            return Ok(());
        }
    }

    let removed = open_ledger(config)?.clear()?;
    println!("Cleared {} pending change(s).", removed);
    Ok(())
}
