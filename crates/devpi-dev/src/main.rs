use std::process::ExitCode;
use std::time::Instant;

use anstream::eprintln;
use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::debug;

use devpi_logging::Level;

use crate::seed::SeedArgs;
use crate::seeds::SeedsArgs;
use crate::serve::ServeArgs;

mod seed;
mod seeds;
mod serve;

#[derive(Parser)]
#[command(name = "devpi-dev", about = "Run a seeded devpi server for local development")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Show debug messages, with timestamps.
    #[arg(global = true, short, long)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start a server with a user and index, and keep it running until interrupted.
    Serve(ServeArgs),
    /// List the devpi-server versions that have a seed archive.
    Seeds(SeedsArgs),
    /// Create the seed archive for the installed devpi-server with `devpi-init`.
    Seed(SeedArgs),
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve(args) => serve::serve(args),
        Command::Seeds(args) => seeds::seeds(&args),
        Command::Seed(args) => seed::seed(&args).map(drop),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::Verbose
    } else {
        Level::Default
    };
    if let Err(err) = devpi_logging::setup_logging(level) {
        eprintln!("{}: {err:#}", "error".red().bold());
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    let result = run(cli);
    debug!("Took {}ms", start.elapsed().as_millis());
    if let Err(err) = result {
        eprintln!("{}", "devpi-dev failed".red().bold());
        for err in err.chain() {
            eprintln!("  {}: {}", "Caused by".red().bold(), err);
        }
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
