use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use itertools::Itertools;
use tracing::{debug, info};

use crate::Error;

/// The `devpi` command-line client, bound to a client configuration directory.
///
/// Every invocation runs the client as a subprocess with its output piped back, so the
/// caller's own stdout is never touched.
#[derive(Debug, Clone)]
pub struct DevpiClient {
    executable: PathBuf,
    client_dir: PathBuf,
}

impl DevpiClient {
    pub fn new(executable: impl Into<PathBuf>, client_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            client_dir: client_dir.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn client_dir(&self) -> &Path {
        &self.client_dir
    }

    /// A [`Command`] running `devpi <args> --clientdir <client_dir>`.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.executable);
        command
            .args(args)
            .arg("--clientdir")
            .arg(&self.client_dir)
            .stdin(Stdio::null());
        command
    }

    /// Run `devpi <args> --clientdir <client_dir>` and return what it wrote to stdout.
    ///
    /// A non-zero exit status is an [`Error::Client`] carrying both output streams.
    pub fn api<I, S>(&self, args: I) -> Result<String, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args = args
            .into_iter()
            .map(|arg| arg.as_ref().to_owned())
            .collect::<Vec<_>>();
        let command_line = args.iter().map(|arg| arg.to_string_lossy()).join(" ");
        info!("devpi {command_line} --clientdir {}", self.client_dir.display());

        let output = self
            .command(&args)
            .output()
            .map_err(|err| Error::ClientSpawn {
                executable: self.executable.clone(),
                err,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.trim().is_empty() {
            debug!("devpi {command_line} stderr:\n{}", stderr.trim_end());
        }

        if !output.status.success() {
            return Err(Error::Client {
                args: command_line,
                status: output.status,
                stdout,
                stderr,
            });
        }
        Ok(stdout)
    }

    /// Run the client and parse its output as JSON, e.g., for `getjson`.
    pub fn api_json<I, S>(&self, args: I) -> Result<serde_json::Value, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args = args
            .into_iter()
            .map(|arg| arg.as_ref().to_owned())
            .collect::<Vec<_>>();
        let stdout = self.api(&args)?;
        serde_json::from_str(&stdout).map_err(|err| Error::Json {
            args: args.iter().map(|arg| arg.to_string_lossy()).join(" "),
            err,
        })
    }
}
