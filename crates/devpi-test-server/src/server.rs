use std::ffi::OsString;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use itertools::Itertools;
use tracing::{debug, info, instrument, trace, warn};

use crate::{Error, Workspace};

/// The hostname used when none is configured.
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";

/// How long [`TestServer::launch`] waits for the server to answer by default.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the server is polled while waiting for it to become ready.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How many trailing lines of the server log are attached to startup errors.
const LOG_TAIL_LINES: usize = 30;

/// The name of the file, within the workspace, that captures the server's stdout and stderr.
const LOG_FILE: &str = "server.log";

#[derive(Debug, Clone)]
pub struct TestServerOptions {
    /// The hostname to bind to and connect to.
    pub hostname: String,
    /// The port to bind to. A free port is allocated if unset.
    pub port: Option<u16>,
    /// An existing directory to use as the workspace instead of a temporary one.
    pub workspace: Option<PathBuf>,
    /// Leave the temporary workspace on disk after teardown.
    pub keep_workspace: bool,
    /// How long to wait for the server to answer HTTP requests.
    pub ready_timeout: Duration,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: None,
            workspace: None,
            keep_workspace: false,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

/// An HTTP server running as a subprocess out of its own workspace.
///
/// The process is killed when the [`TestServer`] is dropped.
#[derive(Debug)]
pub struct TestServer {
    workspace: Workspace,
    hostname: String,
    port: u16,
    ready_timeout: Duration,
    child: Option<Child>,
}

impl TestServer {
    /// Create the workspace and pick the hostname and port. Does not start anything.
    pub fn new(options: TestServerOptions) -> Result<Self, Error> {
        let workspace = match options.workspace {
            Some(path) => Workspace::persistent(path),
            None => Workspace::temporary(options.keep_workspace),
        }
        .map_err(Error::Workspace)?;

        let port = match options.port {
            Some(port) => port,
            None => allocate_port(&options.hostname)?,
        };

        debug!(
            "Test server workspace at `{}`, listening on {}:{port}",
            workspace.path().display(),
            options.hostname
        );

        Ok(Self {
            workspace,
            hostname: options.hostname,
            port,
            ready_timeout: options.ready_timeout,
            child: None,
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The base URI of the server, e.g., `http://127.0.0.1:41231`.
    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }

    /// The file receiving the server's stdout and stderr.
    pub fn log_path(&self) -> PathBuf {
        self.workspace.path().join(LOG_FILE)
    }

    /// The process ID of the server, if it has been launched and not torn down.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Whether the server process is alive.
    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Spawn the server from `cmd` and block until it answers HTTP requests.
    ///
    /// The first element of `cmd` is the program, the rest are its arguments. If the server
    /// exits or does not answer within the ready timeout, it is killed and an error returned.
    #[instrument(skip_all, fields(port = self.port))]
    pub fn launch(&mut self, cmd: &[OsString]) -> Result<(), Error> {
        if let Some(pid) = self.pid() {
            return Err(Error::AlreadyRunning(pid));
        }
        let Some((program, args)) = cmd.split_first() else {
            return Err(Error::EmptyCommand);
        };

        info!(
            "Starting server: {}",
            cmd.iter().map(|arg| arg.to_string_lossy()).join(" ")
        );

        let log = fs_err::File::create(self.log_path())?;
        let child = Command::new(program)
            .args(args)
            .current_dir(self.workspace.path())
            .stdin(Stdio::null())
            .stdout(log.try_clone()?.into_parts().0)
            .stderr(log.into_parts().0)
            .spawn()
            .map_err(|err| Error::Spawn {
                program: program.to_string_lossy().to_string(),
                err,
            })?;
        debug!("Server started with pid {}", child.id());
        self.child = Some(child);

        if let Err(err) = self.wait_until_ready() {
            self.teardown();
            return Err(err);
        }
        Ok(())
    }

    /// Poll the server until it answers any HTTP request.
    fn wait_until_ready(&mut self) -> Result<(), Error> {
        let uri = self.uri();
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(1))
            .build()
            .map_err(Error::Client)?;

        let start = Instant::now();
        loop {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(Error::Exited {
                        status,
                        log: self.log_tail(),
                    });
                }
            }

            match client.get(&uri).send() {
                Ok(response) => {
                    debug!(
                        "Server answered {} after {}ms",
                        response.status(),
                        start.elapsed().as_millis()
                    );
                    return Ok(());
                }
                Err(err) => trace!("Server not ready yet: {err}"),
            }

            if start.elapsed() > self.ready_timeout {
                return Err(Error::NotReady {
                    uri,
                    timeout: self.ready_timeout,
                    log: self.log_tail(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// The last lines of the server log, or an empty string if there is none.
    pub fn log_tail(&self) -> String {
        let Ok(log) = fs_err::read_to_string(self.log_path()) else {
            return String::new();
        };
        let lines = log.lines().collect::<Vec<_>>();
        lines[lines.len().saturating_sub(LOG_TAIL_LINES)..].join("\n")
    }

    /// Kill and reap the server process. Does nothing if it is not running.
    pub fn teardown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        debug!("Stopping server (pid {})", child.id());
        if let Err(err) = child.kill() {
            warn!("Failed to kill server (pid {}): {err}", child.id());
        }
        match child.wait() {
            Ok(status) => debug!("Server stopped ({status})"),
            Err(err) => warn!("Failed to wait for server (pid {}): {err}", child.id()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Ask the OS for a port that is free on `hostname`.
///
/// The port is released before returning, so another process may grab it in the meantime.
pub fn allocate_port(hostname: &str) -> Result<u16, Error> {
    let listener = TcpListener::bind((hostname, 0)).map_err(|err| Error::Port {
        hostname: hostname.to_string(),
        err,
    })?;
    Ok(listener.local_addr()?.port())
}
