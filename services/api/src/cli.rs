use crate::demo::{run_catalog_check, run_demo, CatalogCheckArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use skillgate::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "skillgate",
    about = "Serve and demonstrate the learning progress and gating engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a learner through the demo course and print each step
    Demo(DemoArgs),
    /// Inspect course catalog files
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Validate a catalog file and print a per-course summary
    Check(CatalogCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Course catalog JSON file (overrides LEARNING_CATALOG_PATH)
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// Learner profiles to create at startup (repeatable)
    #[arg(long = "learner")]
    pub(crate) learners: Vec<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Catalog {
            command: CatalogCommand::Check(args),
        } => run_catalog_check(args),
    }
}
