//! A minimal base for tests that need an HTTP server running in a subprocess.
//!
//! [`TestServer`] owns a workspace directory, a hostname and port, and the server process.
//! Implementors of [`ServerProcess`] supply the command line and the setup hooks around it.

use std::ffi::OsString;

pub use error::Error;
pub use server::{
    DEFAULT_HOSTNAME, DEFAULT_READY_TIMEOUT, TestServer, TestServerOptions, allocate_port,
};
pub use workspace::Workspace;

mod error;
mod server;
mod workspace;

/// A server process with setup hooks, driven by [`ServerProcess::start`].
///
/// The lifecycle is `pre_setup` → spawn [`ServerProcess::run_cmd`] → wait until the server
/// answers HTTP requests → `post_setup`. Teardown happens when the [`TestServer`] is dropped.
pub trait ServerProcess {
    type Error: From<Error>;

    fn test_server(&self) -> &TestServer;

    fn test_server_mut(&mut self) -> &mut TestServer;

    /// The program and arguments that launch the server.
    fn run_cmd(&self) -> Vec<OsString>;

    /// Runs before the server process is spawned.
    fn pre_setup(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Runs once the server answers HTTP requests.
    fn post_setup(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Start the server and run the setup hooks around it.
    ///
    /// If any step fails the server is torn down and the error returned.
    fn start(&mut self) -> Result<(), Self::Error> {
        if let Some(pid) = self.test_server().pid() {
            return Err(Error::AlreadyRunning(pid).into());
        }
        self.pre_setup()?;
        let cmd = self.run_cmd();
        self.test_server_mut().launch(&cmd)?;
        if let Err(err) = self.post_setup() {
            self.teardown();
            return Err(err);
        }
        Ok(())
    }

    /// Stop the server process. The workspace lives until the [`TestServer`] is dropped.
    fn teardown(&mut self) {
        self.test_server_mut().teardown();
    }
}
