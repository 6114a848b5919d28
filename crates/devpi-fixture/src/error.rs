use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use itertools::Itertools;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    TestServer(#[from] devpi_test_server::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to extract seed data from `{}`", path.display())]
    Extract {
        path: PathBuf,
        #[source]
        err: devpi_extract::Error,
    },
    #[error("Failed to write seed archive `{}`", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        err: devpi_extract::Error,
    },
    #[error("Failed to run `{}`", executable.display())]
    InitSpawn {
        executable: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("`{}` failed ({status}):\n{output}", executable.display())]
    Init {
        executable: PathBuf,
        status: ExitStatus,
        output: String,
    },
    #[error("Invalid value for `{name}`: `{value}`")]
    InvalidEnvironment { name: &'static str, value: String },
    #[error(
        "Could not find `devpi-server`; set `DEVPI_FIXTURE_BIN_DIR` or activate a virtual environment with devpi-server installed"
    )]
    MissingServer,
    #[error("Failed to query the devpi-server version with `{}`", executable.display())]
    ServerVersionSpawn {
        executable: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("Unexpected output from `{} --version`: {output:?}", executable.display())]
    ServerVersion { executable: PathBuf, output: String },
    #[error(
        "No seed archive is bundled for devpi-server {version} (available: {})",
        display_versions(.available)
    )]
    UnsupportedVersion {
        version: String,
        available: Vec<String>,
    },
    #[error("Failed to run `{}`", executable.display())]
    ClientSpawn {
        executable: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("`devpi {args}` failed ({status})\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    Client {
        args: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    #[error("Failed to parse the output of `devpi {args}` as JSON")]
    Json {
        args: String,
        #[source]
        err: serde_json::Error,
    },
}

fn display_versions(versions: &[String]) -> String {
    if versions.is_empty() {
        "none".to_string()
    } else {
        versions.iter().join(", ")
    }
}
