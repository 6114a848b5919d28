//! A devpi package index for tests.
//!
//! [`DevpiServer`] runs `devpi-server` in a subprocess out of a temporary workspace, seeds its
//! data directory, and bootstraps a user and a stand-alone index with the `devpi` client.
//! [`session`] shares one default server across the tests of a test binary.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

pub use client::DevpiClient;
pub use devpi_test_server::ServerProcess;
pub use error::Error;
pub use seed::{
    SeedArchives, bundled_seed_dir, create_seed_archive, init_server_dir, query_server_version,
    seed_file_name,
};
pub use server::{DevpiServer, ServerData};
pub use settings::{
    DEFAULT_INDEX, DEFAULT_PASSWORD, DEFAULT_USER, DevpiServerOptions, DevpiSettings,
    EnvironmentOptions, Executables,
};

mod client;
mod error;
mod seed;
mod server;
mod settings;

static SESSION: Mutex<Weak<DevpiServer>> = Mutex::new(Weak::new());

/// A devpi server with default options, shared while any handle to it is alive.
///
/// The first call starts the server. Once every handle has been dropped the server is torn
/// down, and the next call starts a fresh one.
pub fn session() -> Result<Arc<DevpiServer>, Error> {
    let mut session = SESSION.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(server) = session.upgrade() {
        return Ok(server);
    }
    debug!("Starting session devpi server");
    let server = Arc::new(DevpiServer::launch(DevpiServerOptions::default())?);
    *session = Arc::downgrade(&server);
    Ok(server)
}
