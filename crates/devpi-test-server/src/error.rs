use std::io;
use std::process::ExitStatus;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to create the server workspace")]
    Workspace(#[source] io::Error),
    #[error("Failed to allocate a free port on `{hostname}`")]
    Port {
        hostname: String,
        #[source]
        err: io::Error,
    },
    #[error("The server command line is empty")]
    EmptyCommand,
    #[error("Failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        err: io::Error,
    },
    #[error("The server is already running (pid {0})")]
    AlreadyRunning(u32),
    #[error("The server exited before it was ready ({status})\n--- server log ---\n{log}")]
    Exited { status: ExitStatus, log: String },
    #[error("The server did not answer at {uri} within {}s\n--- server log ---\n{log}", .timeout.as_secs())]
    NotReady {
        uri: String,
        timeout: Duration,
        log: String,
    },
    #[error("Failed to build the readiness client")]
    Client(#[source] reqwest::Error),
}
