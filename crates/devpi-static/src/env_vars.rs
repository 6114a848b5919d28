/// Declares all environment variables read by the devpi fixture crates.
pub struct EnvVars;

impl EnvVars {
    /// Forces the server into debug mode when set to `1`, `Y` or `y`, even if debug mode was
    /// not requested explicitly. Any other value is ignored.
    pub const DEBUG: &'static str = "DEBUG";

    /// The directory holding the `python`, `devpi-server` and `devpi` executables.
    ///
    /// Takes precedence over `VIRTUAL_ENV` and over searching `PATH`.
    pub const DEVPI_FIXTURE_BIN_DIR: &'static str = "DEVPI_FIXTURE_BIN_DIR";

    /// The directory containing the bundled `db-<version>.zip` seed archives.
    ///
    /// Defaults to the `data` directory shipped with the `devpi-fixture` crate.
    pub const DEVPI_FIXTURE_SEED_DIR: &'static str = "DEVPI_FIXTURE_SEED_DIR";

    /// The hostname the server binds to and the client connects to. Defaults to `127.0.0.1`.
    pub const DEVPI_FIXTURE_HOSTNAME: &'static str = "DEVPI_FIXTURE_HOSTNAME";

    /// How long to wait for the server to answer HTTP requests, in seconds. Defaults to 30.
    pub const DEVPI_FIXTURE_READY_TIMEOUT: &'static str = "DEVPI_FIXTURE_READY_TIMEOUT";

    /// If set to a truthy value, the server workspace is left on disk after teardown.
    pub const DEVPI_FIXTURE_KEEP_WORKSPACE: &'static str = "DEVPI_FIXTURE_KEEP_WORKSPACE";

    /// Used to detect an activated virtual environment.
    pub const VIRTUAL_ENV: &'static str = "VIRTUAL_ENV";

    /// The standard `PATH` env var.
    pub const PATH: &'static str = "PATH";

    /// If set, the logging filter directives to apply, e.g., `RUST_LOG=devpi_fixture=debug`.
    ///
    /// See the [tracing documentation](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#example-syntax)
    /// for more.
    pub const RUST_LOG: &'static str = "RUST_LOG";
}
