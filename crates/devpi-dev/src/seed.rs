use std::path::PathBuf;

use anstream::println;
use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;

use devpi_fixture::{EnvironmentOptions, Executables, bundled_seed_dir, create_seed_archive};
use devpi_static::EnvVars;

#[derive(Parser)]
pub(crate) struct SeedArgs {
    /// The directory holding `python`, `devpi-server` and `devpi-init`.
    #[arg(long)]
    bin_dir: Option<PathBuf>,
    /// The directory to write `db-<version>.zip` to.
    #[arg(long, env = EnvVars::DEVPI_FIXTURE_SEED_DIR)]
    seed_dir: Option<PathBuf>,
}

/// Create the seed archive for the installed devpi-server with `devpi-init`.
pub(crate) fn seed(args: &SeedArgs) -> Result<PathBuf> {
    let env = EnvironmentOptions::new()?;
    let executables = Executables::find(args.bin_dir.as_deref(), &env)?;
    let seed_dir = args.seed_dir.clone().unwrap_or_else(bundled_seed_dir);
    let (version, archive) = create_seed_archive(&executables, &seed_dir)
        .context("Failed to create a seed archive")?;
    println!(
        "{} {}",
        version.bold(),
        archive.display().to_string().dimmed()
    );
    Ok(archive)
}
