use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;

use crate::commands::ExitStatus;

mod commands;
mod logging;
mod printer;

#[derive(Parser)]
#[command(name = "ams-compose", author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,

    /// The project root containing `ams-compose.yaml`.
    #[arg(global = true, long, default_value = ".", env = "AMS_COMPOSE_PROJECT_ROOT")]
    project_root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold an `ams-compose.yaml` manifest in the project root.
    Init,
    /// Reconcile the project against the manifest, offline where possible.
    Install(ReconcileArgs),
    /// Reconcile with a remote probe, following moved branches and tags.
    Update(ReconcileArgs),
    /// Render the lock file's entries.
    List,
    /// Verify installed libraries against their recorded checksums.
    Validate,
    /// Prune unreferenced mirrors and remove orphaned libraries.
    Clean,
    /// Emit the manifest schema as JSON Schema.
    Schema,
}

#[derive(Args)]
struct ReconcileArgs {
    /// Restrict the run to these library names.
    name: Vec<String>,

    /// Reinstall even when the lock file says nothing changed.
    #[arg(long)]
    force: bool,
}

async fn inner() -> Result<ExitStatus> {
    let cli = Cli::parse();

    logging::setup_logging(if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    })?;

    let printer = if cli.quiet {
        printer::Printer::Quiet
    } else if cli.verbose {
        printer::Printer::Verbose
    } else {
        printer::Printer::Default
    };

    let project_root = cli.project_root;
    match cli.command {
        Commands::Init => commands::init(&project_root, printer),
        Commands::Install(args) => {
            commands::reconcile(&project_root, args.name, args.force, false, printer).await
        }
        Commands::Update(args) => {
            commands::reconcile(&project_root, args.name, args.force, true, printer).await
        }
        Commands::List => commands::list(&project_root, printer),
        Commands::Validate => commands::validate(&project_root, printer),
        Commands::Clean => commands::clean(&project_root, printer),
        Commands::Schema => commands::schema(printer),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match inner().await {
        Ok(status) => status.into(),
        Err(err) => {
            let mut causes = err.chain();
            anstream::eprintln!(
                "{}: {}",
                "error".red().bold(),
                causes.next().map(|cause| cause.to_string()).unwrap_or_default()
            );
            for cause in causes {
                anstream::eprintln!("  {}: {cause}", "Caused by".red().bold());
            }
            ExitStatus::Error.into()
        }
    }
}
