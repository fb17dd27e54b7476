mod commands;
mod project;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use project::Project;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sky")]
#[command(about = "Declare a cluster in KDL, apply it, read back its addresses and keys", long_about = None)]
struct Cli {
    /// Project root (default: search upward for skyflow.kdl)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// ssh-keygen binary used to generate and check key pairs
    #[arg(
        long,
        global = true,
        env = "SKYFLOW_SSH_KEYGEN",
        default_value = "ssh-keygen",
        hide_default_value = true
    )]
    ssh_keygen: String,

    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `settings` block
#[derive(Args, Debug, Clone, Default)]
pub struct ConcurrencyArgs {
    /// Apply independent resources concurrently
    #[arg(long, env = "SKYFLOW_PARALLEL")]
    pub parallel: bool,

    /// Maximum resources in flight with --parallel
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_concurrency: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update every declared resource and print the outputs
    Apply {
        #[command(flatten)]
        concurrency: ConcurrencyArgs,
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show what apply would change
    Preview,
    /// Delete every resource recorded in state
    Destroy {
        /// Delete without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Check the topology without touching any resource
    Validate,
    /// Print the outputs of the last apply
    Outputs {
        /// Print as JSON
        #[arg(long)]
        json: bool,
        /// Print sensitive values in clear text
        #[arg(long)]
        show_secrets: bool,
    },
    /// Write a sample skyflow.kdl into the current directory
    Init {
        /// Overwrite an existing skyflow.kdl
        #[arg(long)]
        force: bool,
    },
    /// Show version information
    Version,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries outputs; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that need no project
    match &cli.command {
        Commands::Version => {
            println!("skyflow {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Init { force } => {
            let dir = match &cli.project {
                Some(dir) => dir.clone(),
                None => std::env::current_dir()?,
            };
            return commands::init::handle(&dir, *force);
        }
        _ => {}
    }

    let project = match Project::load(cli.project.as_deref(), cli.ssh_keygen.clone()) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Apply { concurrency, yes } => {
            commands::apply::handle(project, &concurrency, yes).await?;
        }
        Commands::Preview => {
            commands::preview::handle(&project).await?;
        }
        Commands::Destroy { yes } => {
            commands::destroy::handle(&project, yes).await?;
        }
        Commands::Validate => {
            commands::validate::handle(&project)?;
        }
        Commands::Outputs { json, show_secrets } => {
            commands::outputs::handle(&project, json, show_secrets).await?;
        }
        Commands::Init { .. } | Commands::Version => {
            unreachable!("handled before project loading");
        }
    }

    Ok(())
}
