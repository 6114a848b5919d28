use std::path::PathBuf;
use std::sync::mpsc;

use anstream::println;
use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::info;

use devpi_fixture::{DEFAULT_INDEX, DEFAULT_PASSWORD, DEFAULT_USER, DevpiServer, DevpiServerOptions};

#[derive(Parser)]
pub(crate) struct ServeArgs {
    /// The user to create and log in as.
    #[arg(long, default_value = DEFAULT_USER)]
    user: String,
    /// The password of the created user.
    #[arg(long, default_value = DEFAULT_PASSWORD)]
    password: String,
    /// The index to create and use.
    #[arg(long, default_value = DEFAULT_INDEX)]
    index: String,
    /// A `.zip` archive of an initial server data directory.
    #[arg(long)]
    data: Option<PathBuf>,
    /// Run without `--offline-mode`, letting the server reach the upstream index.
    #[arg(long)]
    online: bool,
    /// Run the server with `--debug`.
    #[arg(long)]
    debug: bool,
    /// The hostname to bind to.
    #[arg(long)]
    host: Option<String>,
    /// The port to bind to. A free port is picked if omitted.
    #[arg(long)]
    port: Option<u16>,
    /// Leave the workspace on disk after shutting down.
    #[arg(long)]
    keep_workspace: bool,
    /// Use the seed archive for this devpi-server version instead of asking the server.
    #[arg(long)]
    server_version: Option<String>,
}

impl From<ServeArgs> for DevpiServerOptions {
    fn from(args: ServeArgs) -> Self {
        let mut options = Self::default()
            .with_offline(!args.online)
            .with_debug(args.debug)
            .with_user(args.user)
            .with_password(args.password)
            .with_index(args.index);
        if let Some(data) = args.data {
            options = options.with_data(data);
        }
        if let Some(host) = args.host {
            options = options.with_hostname(host);
        }
        if let Some(port) = args.port {
            options = options.with_port(port);
        }
        if args.keep_workspace {
            options = options.with_keep_workspace(true);
        }
        if let Some(version) = args.server_version {
            options = options.with_server_version(version);
        }
        options
    }
}

pub(crate) fn serve(args: ServeArgs) -> Result<()> {
    let (stop, stopped) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop.send(());
    })
    .context("Failed to install the Ctrl-C handler")?;

    let server = DevpiServer::launch(args.into()).context("Failed to start devpi-server")?;

    println!("{} {}", "URI:".bold(), server.uri());
    println!("{} {}/{}", "Index:".bold(), server.user(), server.index());
    println!("{} {}", "Server dir:".bold(), server.server_dir().display());
    println!("{} {}", "Client dir:".bold(), server.client_dir().display());
    println!(
        "Use it with `devpi --clientdir {}`; press Ctrl-C to stop",
        server.client_dir().display()
    );

    stopped.recv().context("The Ctrl-C handler went away")?;
    info!("Stopping devpi-server at {}", server.uri());
    drop(server);
    Ok(())
}
