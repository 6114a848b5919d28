use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use devpi_test_server::{ServerProcess, TestServer, Workspace};

use crate::Error;
use crate::client::DevpiClient;
use crate::seed::{SeedArchives, init_server_dir, query_server_version};
use crate::settings::{DevpiServerOptions, DevpiSettings, EnvironmentOptions};

/// Where the data directory of a [`DevpiServer`] comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerData {
    /// Extracted from a seed archive.
    Archive(PathBuf),
    /// Created by `devpi-init`.
    Init,
    /// Left to devpi-server.
    Fresh,
}

/// A devpi-server running in a subprocess out of a temporary workspace.
///
/// Once started, the client is logged in as [`DevpiServer::user`] and uses
/// [`DevpiServer::index`], a stand-alone index with no bases. The server is stopped and the
/// workspace removed when dropped.
///
/// ```no_run
/// use devpi_fixture::{DevpiServer, DevpiServerOptions};
///
/// let server = DevpiServer::launch(DevpiServerOptions::default().with_index("myindex"))?;
/// let config = server.api_json(["getjson", "/testuser/myindex"])?;
/// # Ok::<(), devpi_fixture::Error>(())
/// ```
#[derive(Debug)]
pub struct DevpiServer {
    settings: DevpiSettings,
    server: TestServer,
    server_dir: PathBuf,
    client: DevpiClient,
}

impl DevpiServer {
    /// Configure a server from `options` and the environment. Does not start anything.
    pub fn new(options: DevpiServerOptions) -> Result<Self, Error> {
        Self::with_environment(options, &EnvironmentOptions::new()?)
    }

    /// Configure a server from `options` and already-read environment options.
    pub fn with_environment(
        options: DevpiServerOptions,
        env: &EnvironmentOptions,
    ) -> Result<Self, Error> {
        let settings = DevpiSettings::resolve(options, env)?;
        let server = TestServer::new(settings.test_server.clone())?;
        let server_dir = server.workspace().path().join("server");
        let client_dir = server.workspace().create_child("client")?;
        let client = DevpiClient::new(&settings.executables.client, client_dir);
        Ok(Self {
            settings,
            server,
            server_dir,
            client,
        })
    }

    /// Configure and start a server.
    pub fn launch(options: DevpiServerOptions) -> Result<Self, Error> {
        let mut server = Self::new(options)?;
        server.start()?;
        Ok(server)
    }

    pub fn settings(&self) -> &DevpiSettings {
        &self.settings
    }

    /// The server URI, e.g., `http://127.0.0.1:41231`.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn hostname(&self) -> &str {
        self.server.hostname()
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    /// The initially created user.
    pub fn user(&self) -> &str {
        &self.settings.user
    }

    /// The password of the initially created user.
    pub fn password(&self) -> &str {
        &self.settings.password
    }

    /// The name of the initially created index.
    pub fn index(&self) -> &str {
        &self.settings.index
    }

    /// The server data directory.
    pub fn server_dir(&self) -> &Path {
        &self.server_dir
    }

    /// The client configuration directory.
    pub fn client_dir(&self) -> &Path {
        self.client.client_dir()
    }

    pub fn workspace(&self) -> &Workspace {
        self.server.workspace()
    }

    pub fn client(&self) -> &DevpiClient {
        &self.client
    }

    /// Run `devpi <args>` against this server and return what it wrote to stdout.
    ///
    /// For example, `api(["index", "-c", "myindex"])` creates an index called `myindex`.
    pub fn api<I, S>(&self, args: I) -> Result<String, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.client.api(args)
    }

    /// Run `devpi <args>` against this server and parse its output as JSON.
    ///
    /// For example, `api_json(["getjson", "/testuser/dev"])` describes the default index.
    pub fn api_json<I, S>(&self, args: I) -> Result<serde_json::Value, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.client.api_json(args)
    }

    /// The installed devpi-server version, unless given explicitly.
    pub fn server_version(&self) -> Result<String, Error> {
        match &self.settings.server_version {
            Some(version) => Ok(version.clone()),
            None => query_server_version(&self.settings.executables),
        }
    }

    /// The archive the server data directory is seeded from, if any.
    ///
    /// An explicit archive is used as given. Otherwise, in offline mode, the seed archive for
    /// exactly the installed server version is required.
    pub fn seed_archive(&self) -> Result<Option<PathBuf>, Error> {
        if let Some(data) = &self.settings.data {
            return Ok(Some(data.clone()));
        }
        if !self.settings.offline {
            return Ok(None);
        }
        let version = self.server_version()?;
        let archives = SeedArchives::discover(&self.settings.seed_dir)?;
        Ok(Some(archives.resolve(&version)?.to_path_buf()))
    }

    /// How the server data directory is created.
    ///
    /// A seed archive wins. Without one, `devpi-init` is used if the installation has it, which
    /// also covers offline mode for versions that have no seed archive.
    pub fn server_data(&self) -> Result<ServerData, Error> {
        let can_init = self.settings.executables.init.is_file();
        match self.seed_archive() {
            Ok(Some(archive)) => Ok(ServerData::Archive(archive)),
            Ok(None) if can_init => Ok(ServerData::Init),
            Ok(None) => Ok(ServerData::Fresh),
            Err(Error::UnsupportedVersion { version, .. }) if can_init => {
                debug!("No seed archive for devpi-server {version}, using `devpi-init`");
                Ok(ServerData::Init)
            }
            Err(err) => Err(err),
        }
    }
}

impl ServerProcess for DevpiServer {
    type Error = Error;

    fn test_server(&self) -> &TestServer {
        &self.server
    }

    fn test_server_mut(&mut self) -> &mut TestServer {
        &mut self.server
    }

    fn run_cmd(&self) -> Vec<OsString> {
        let executables = &self.settings.executables;
        let mut cmd = vec![
            executables.python.clone().into_os_string(),
            executables.server.clone().into_os_string(),
            "--serverdir".into(),
            self.server_dir.clone().into_os_string(),
            "--host".into(),
            self.hostname().into(),
            "--port".into(),
            self.port().to_string().into(),
        ];
        if self.settings.offline {
            cmd.push("--offline-mode".into());
        }
        if self.settings.debug {
            cmd.push("--debug".into());
        }
        cmd
    }

    #[instrument(skip_all)]
    fn pre_setup(&mut self) -> Result<(), Error> {
        match self.server_data()? {
            ServerData::Archive(archive) => {
                info!("Extracting initial server data from `{}`", archive.display());
                devpi_extract::unzip_file(&archive, &self.server_dir)
                    .map_err(|err| Error::Extract { path: archive, err })?;
            }
            ServerData::Init => init_server_dir(&self.settings.executables, &self.server_dir)?,
            ServerData::Fresh => debug!("Starting devpi-server without seed data"),
        }
        Ok(())
    }

    #[instrument(skip_all, fields(user = self.user(), index = self.index()))]
    fn post_setup(&mut self) -> Result<(), Error> {
        let uri = self.uri();
        let user = self.user();
        let index = self.index();
        let password_assignment = format!("password={}", self.password());
        let password_flag = format!("--password={}", self.password());

        // Connect to our server.
        self.api(["use", uri.as_str()])?;
        // Create and log in the initial user.
        self.api(["user", "-c", user, password_assignment.as_str()])?;
        self.api(["login", user, password_flag.as_str()])?;
        // Create and use a stand-alone index.
        self.api(["index", "-c", index, "bases="])?;
        self.api(["use", index])?;
        Ok(())
    }
}
