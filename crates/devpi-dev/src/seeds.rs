use std::path::PathBuf;

use anstream::println;
use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;

use devpi_fixture::{SeedArchives, bundled_seed_dir};
use devpi_static::EnvVars;

#[derive(Parser)]
pub(crate) struct SeedsArgs {
    /// The directory containing `db-<version>.zip` seed archives.
    #[arg(long, env = EnvVars::DEVPI_FIXTURE_SEED_DIR)]
    seed_dir: Option<PathBuf>,
}

pub(crate) fn seeds(args: &SeedsArgs) -> Result<()> {
    let seed_dir = args.seed_dir.clone().unwrap_or_else(bundled_seed_dir);
    let archives = SeedArchives::discover(&seed_dir)?;
    if archives.is_empty() {
        println!(
            "No seed archives in `{}`",
            seed_dir.display().to_string().dimmed()
        );
        return Ok(());
    }
    for version in archives.versions() {
        let path = archives.resolve(version)?;
        println!("{} {}", version.bold(), path.display().to_string().dimmed());
    }
    Ok(())
}
