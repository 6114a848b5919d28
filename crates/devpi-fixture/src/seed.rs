//! Seed archives: pre-initialized server data directories, keyed by devpi-server version.
//!
//! A freshly created devpi-server goes online on first boot to set up its root index. Starting
//! from a seed archive avoids that, which is what makes offline mode work. From devpi-server 6
//! on, `devpi-init` creates the data directory instead, and [`create_seed_archive`] zips its
//! output into a new seed archive.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, trace};

use crate::Error;
use crate::settings::Executables;

const SEED_PREFIX: &str = "db-";
const SEED_SUFFIX: &str = ".zip";

/// The seed directory shipped with this crate.
pub fn bundled_seed_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data")
}

/// The file name of the seed archive for `version`, e.g., `db-6.2.0.zip`.
pub fn seed_file_name(version: &str) -> String {
    format!("{SEED_PREFIX}{version}{SEED_SUFFIX}")
}

/// A mapping from devpi-server version to the seed archive for that version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedArchives(BTreeMap<String, PathBuf>);

impl SeedArchives {
    /// Collect the `db-<version>.zip` files in `dir`.
    ///
    /// A missing directory yields an empty mapping; other files in the directory are ignored.
    pub fn discover(dir: &Path) -> Result<Self, Error> {
        let entries = match fs_err::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No seed directory at `{}`", dir.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut archives = Self::default();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(version) = file_name
                .to_str()
                .and_then(|name| name.strip_prefix(SEED_PREFIX))
                .and_then(|name| name.strip_suffix(SEED_SUFFIX))
                .filter(|version| !version.is_empty())
            else {
                trace!("Ignoring `{}` in seed directory", entry.path().display());
                continue;
            };
            archives.insert(version, entry.path());
        }
        debug!(
            "Found {} seed archive(s) in `{}`",
            archives.0.len(),
            dir.display()
        );
        Ok(archives)
    }

    pub fn insert(&mut self, version: impl Into<String>, path: impl Into<PathBuf>) {
        self.0.insert(version.into(), path.into());
    }

    pub fn get(&self, version: &str) -> Option<&Path> {
        self.0.get(version).map(PathBuf::as_path)
    }

    /// The archive for exactly `version`, or [`Error::UnsupportedVersion`].
    pub fn resolve(&self, version: &str) -> Result<&Path, Error> {
        self.get(version).ok_or_else(|| Error::UnsupportedVersion {
            version: version.to_string(),
            available: self.versions().map(ToString::to_string).collect(),
        })
    }

    /// The versions with a seed archive, in sorted order.
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extract the version from the output of `devpi-server --version`.
///
/// Depending on the release, devpi-server prints either the bare version or the version
/// prefixed with the distribution name.
pub(crate) fn parse_server_version(output: &str) -> Option<&str> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    let word = line.split_whitespace().last()?;
    let version = word.strip_prefix("devpi-server-").unwrap_or(word);
    Some(version).filter(|version| version.starts_with(|c: char| c.is_ascii_digit()))
}

/// Ask the installed devpi-server for its version.
pub fn query_server_version(executables: &Executables) -> Result<String, Error> {
    let output = Command::new(&executables.python)
        .arg(&executables.server)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .map_err(|err| Error::ServerVersionSpawn {
            executable: executables.server.clone(),
            err,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = output
        .status
        .success()
        .then(|| parse_server_version(&stdout))
        .flatten()
        .ok_or_else(|| Error::ServerVersion {
            executable: executables.server.clone(),
            output: format!("{stdout}{}", String::from_utf8_lossy(&output.stderr)),
        })?;
    debug!("Installed devpi-server version: {version}");
    Ok(version.to_string())
}

/// Create a server data directory at `server_dir` with `<python> <devpi-init> --serverdir`.
pub fn init_server_dir(executables: &Executables, server_dir: &Path) -> Result<(), Error> {
    info!("Initializing server data in `{}`", server_dir.display());
    let output = Command::new(&executables.python)
        .arg(&executables.init)
        .arg("--serverdir")
        .arg(server_dir)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| Error::InitSpawn {
            executable: executables.init.clone(),
            err,
        })?;

    if !output.status.success() {
        return Err(Error::Init {
            executable: executables.init.clone(),
            status: output.status,
            output: format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(())
}

/// Write `db-<version>.zip` for the installed devpi-server to `seed_dir`, from a data directory
/// created by `devpi-init`.
///
/// Returns the version and the path of the new archive. An existing archive for the same
/// version is replaced.
pub fn create_seed_archive(
    executables: &Executables,
    seed_dir: &Path,
) -> Result<(String, PathBuf), Error> {
    let version = query_server_version(executables)?;
    let temp = tempfile::tempdir()?;
    let server_dir = temp.path().join("server");
    init_server_dir(executables, &server_dir)?;

    fs_err::create_dir_all(seed_dir)?;
    let archive = seed_dir.join(seed_file_name(&version));
    let files = devpi_extract::zip_dir(&server_dir, &archive).map_err(|err| Error::Archive {
        path: archive.clone(),
        err,
    })?;
    info!(
        "Wrote seed archive for devpi-server {version} ({files} files) to `{}`",
        archive.display()
    );
    Ok((version, archive))
}
