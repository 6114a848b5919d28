use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use devpi_static::EnvVars;
use devpi_test_server::{DEFAULT_HOSTNAME, DEFAULT_READY_TIMEOUT, TestServerOptions};

use crate::Error;
use crate::seed::bundled_seed_dir;

pub const DEFAULT_USER: &str = "testuser";
pub const DEFAULT_PASSWORD: &str = "";
pub const DEFAULT_INDEX: &str = "dev";

/// The options a caller passes explicitly when creating a [`crate::DevpiServer`].
#[derive(Debug, Clone)]
pub struct DevpiServerOptions {
    pub(crate) offline: bool,
    pub(crate) debug: bool,
    pub(crate) data: Option<PathBuf>,
    pub(crate) user: String,
    pub(crate) password: String,
    pub(crate) index: String,
    pub(crate) server_version: Option<String>,
    pub(crate) seed_dir: Option<PathBuf>,
    pub(crate) bin_dir: Option<PathBuf>,
    pub(crate) hostname: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) workspace: Option<PathBuf>,
    pub(crate) keep_workspace: Option<bool>,
    pub(crate) ready_timeout: Option<Duration>,
}

impl Default for DevpiServerOptions {
    fn default() -> Self {
        Self {
            offline: true,
            debug: false,
            data: None,
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            index: DEFAULT_INDEX.to_string(),
            server_version: None,
            seed_dir: None,
            bin_dir: None,
            hostname: None,
            port: None,
            workspace: None,
            keep_workspace: None,
            ready_timeout: None,
        }
    }
}

impl DevpiServerOptions {
    /// Run the server with `--offline-mode`. Defaults to `true`.
    ///
    /// In offline mode without explicit seed data, the bundled archive matching the installed
    /// server version is used.
    #[must_use]
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Run the server with `--debug`. The `DEBUG` environment variable can force this on.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// A `.zip` archive of an initial server data directory, used verbatim.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<PathBuf>) -> Self {
        self.data = Some(data.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// The installed devpi-server version, instead of asking `devpi-server --version`.
    #[must_use]
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = Some(version.into());
        self
    }

    /// The directory holding the `db-<version>.zip` seed archives.
    #[must_use]
    pub fn with_seed_dir(mut self, seed_dir: impl Into<PathBuf>) -> Self {
        self.seed_dir = Some(seed_dir.into());
        self
    }

    /// The directory holding the `python`, `devpi-server` and `devpi` executables.
    #[must_use]
    pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(bin_dir.into());
        self
    }

    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Use an existing directory as the workspace instead of a temporary one.
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    #[must_use]
    pub fn with_keep_workspace(mut self, keep: bool) -> Self {
        self.keep_workspace = Some(keep);
        self
    }

    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }
}

/// The options read from environment variables, once.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentOptions {
    pub debug: bool,
    pub bin_dir: Option<PathBuf>,
    pub seed_dir: Option<PathBuf>,
    pub hostname: Option<String>,
    pub ready_timeout: Option<Duration>,
    pub keep_workspace: Option<bool>,
    pub virtual_env: Option<PathBuf>,
    pub path: Option<OsString>,
}

impl EnvironmentOptions {
    /// Create a new [`EnvironmentOptions`] from environment variables.
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            debug: debug_requested(env::var_os(EnvVars::DEBUG).as_deref()),
            bin_dir: env::var_os(EnvVars::DEVPI_FIXTURE_BIN_DIR).map(PathBuf::from),
            seed_dir: env::var_os(EnvVars::DEVPI_FIXTURE_SEED_DIR).map(PathBuf::from),
            hostname: env::var(EnvVars::DEVPI_FIXTURE_HOSTNAME)
                .ok()
                .filter(|hostname| !hostname.is_empty()),
            ready_timeout: parse_seconds(
                EnvVars::DEVPI_FIXTURE_READY_TIMEOUT,
                env::var_os(EnvVars::DEVPI_FIXTURE_READY_TIMEOUT).as_deref(),
            )?,
            keep_workspace: parse_boolish(
                EnvVars::DEVPI_FIXTURE_KEEP_WORKSPACE,
                env::var_os(EnvVars::DEVPI_FIXTURE_KEEP_WORKSPACE).as_deref(),
            )?,
            virtual_env: env::var_os(EnvVars::VIRTUAL_ENV).map(PathBuf::from),
            path: env::var_os(EnvVars::PATH),
        })
    }
}

/// Whether the value of `DEBUG` asks for debug mode. Only `1`, `Y` and `y` do.
fn debug_requested(value: Option<&OsStr>) -> bool {
    value
        .and_then(OsStr::to_str)
        .is_some_and(|value| matches!(value, "1" | "Y" | "y"))
}

/// Parse a boolean environment variable.
///
/// Accepts the same literals as Clap's `BoolishValueParser`, case insensitive.
fn parse_boolish(name: &'static str, value: Option<&OsStr>) -> Result<Option<bool>, Error> {
    const TRUE_LITERALS: [&str; 6] = ["y", "yes", "t", "true", "on", "1"];
    const FALSE_LITERALS: [&str; 6] = ["n", "no", "f", "false", "off", "0"];

    let Some(value) = value else {
        return Ok(None);
    };
    let invalid = || Error::InvalidEnvironment {
        name,
        value: value.to_string_lossy().to_string(),
    };
    let lowercase = value.to_str().ok_or_else(invalid)?.to_lowercase();
    if TRUE_LITERALS.contains(&lowercase.as_str()) {
        Ok(Some(true))
    } else if FALSE_LITERALS.contains(&lowercase.as_str()) {
        Ok(Some(false))
    } else {
        Err(invalid())
    }
}

/// Parse a whole number of seconds.
fn parse_seconds(name: &'static str, value: Option<&OsStr>) -> Result<Option<Duration>, Error> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .to_str()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|seconds| Some(Duration::from_secs(seconds)))
        .ok_or_else(|| Error::InvalidEnvironment {
            name,
            value: value.to_string_lossy().to_string(),
        })
}

/// The executables that make up a devpi installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executables {
    pub python: PathBuf,
    pub server: PathBuf,
    /// `devpi-init`, which creates a server data directory (devpi-server 6 and newer).
    pub init: PathBuf,
    pub client: PathBuf,
}

impl Executables {
    /// The executables inside a `bin` (or `Scripts`) directory.
    pub fn from_bin_dir(bin_dir: &Path) -> Self {
        let exe = |name: &str| bin_dir.join(format!("{name}{}", env::consts::EXE_SUFFIX));
        Self {
            python: exe("python"),
            server: exe("devpi-server"),
            init: exe("devpi-init"),
            client: exe("devpi"),
        }
    }

    /// Locate the devpi installation.
    ///
    /// In order: the explicit `bin_dir`, `DEVPI_FIXTURE_BIN_DIR`, the active virtual environment,
    /// and finally the directory containing `devpi-server` on `PATH`.
    pub fn find(bin_dir: Option<&Path>, env: &EnvironmentOptions) -> Result<Self, Error> {
        if let Some(bin_dir) = bin_dir.or(env.bin_dir.as_deref()) {
            return Ok(Self::from_bin_dir(bin_dir));
        }

        if let Some(virtual_env) = env.virtual_env.as_deref() {
            let bin_dir = if cfg!(windows) {
                virtual_env.join("Scripts")
            } else {
                virtual_env.join("bin")
            };
            debug!(
                "Using devpi from the active virtual environment at `{}`",
                virtual_env.display()
            );
            return Ok(Self::from_bin_dir(&bin_dir));
        }

        let cwd = env::current_dir()?;
        let server = which::which_in("devpi-server", env.path.as_ref(), cwd)
            .map_err(|_| Error::MissingServer)?;
        let bin_dir = server.parent().ok_or(Error::MissingServer)?;
        debug!("Found `devpi-server` at `{}`", server.display());
        Ok(Self::from_bin_dir(bin_dir))
    }
}

/// The configuration of a [`crate::DevpiServer`], after combining explicit options with the
/// environment.
///
/// Explicit options take precedence over the environment, except for `DEBUG`, which can only
/// turn debug mode on.
#[derive(Debug, Clone)]
pub struct DevpiSettings {
    pub offline: bool,
    pub debug: bool,
    pub data: Option<PathBuf>,
    pub user: String,
    pub password: String,
    pub index: String,
    pub server_version: Option<String>,
    pub seed_dir: PathBuf,
    pub executables: Executables,
    pub test_server: TestServerOptions,
}

impl DevpiSettings {
    pub fn resolve(options: DevpiServerOptions, env: &EnvironmentOptions) -> Result<Self, Error> {
        let executables = Executables::find(options.bin_dir.as_deref(), env)?;
        let debug = options.debug || env.debug;
        if debug && !options.debug {
            debug!("Debug mode forced on by `{}`", EnvVars::DEBUG);
        }

        let test_server = TestServerOptions {
            hostname: options
                .hostname
                .or_else(|| env.hostname.clone())
                .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
            port: options.port,
            workspace: options.workspace,
            keep_workspace: options
                .keep_workspace
                .or(env.keep_workspace)
                .unwrap_or(false),
            ready_timeout: options
                .ready_timeout
                .or(env.ready_timeout)
                .unwrap_or(DEFAULT_READY_TIMEOUT),
        };

        Ok(Self {
            offline: options.offline,
            debug,
            data: options.data,
            user: options.user,
            password: options.password,
            index: options.index,
            server_version: options.server_version,
            seed_dir: options
                .seed_dir
                .or_else(|| env.seed_dir.clone())
                .unwrap_or_else(bundled_seed_dir),
            executables,
            test_server,
        })
    }
}
