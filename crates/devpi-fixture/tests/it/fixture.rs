use std::io;

use anyhow::Result;
use assert_fs::prelude::*;
use insta::assert_snapshot;
use predicates::prelude::predicate;

use devpi_fixture::{
    EnvironmentOptions, Error, SeedArchives, ServerData, ServerProcess, create_seed_archive,
};

use crate::common::{DevpiContext, render};

fn run_cmd(server: &impl ServerProcess) -> Vec<String> {
    server
        .run_cmd()
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn run_cmd_default() -> Result<()> {
    let context = DevpiContext::new()?;
    let server = context.server(context.options().with_port(3141))?;

    assert_snapshot!(render(run_cmd(&server), &context.filters_for(&server)), @r"
    [BIN]/python
    [BIN]/devpi-server
    --serverdir
    [WORKSPACE]/server
    --host
    127.0.0.1
    --port
    3141
    --offline-mode
    ");
    Ok(())
}

#[test]
fn run_cmd_omits_disabled_flags() -> Result<()> {
    let context = DevpiContext::new()?;
    let server = context.server(context.options().with_offline(false))?;
    let cmd = run_cmd(&server);
    assert!(!cmd.iter().any(String::is_empty), "{cmd:?}");
    assert!(!cmd.iter().any(|arg| arg == "--offline-mode"), "{cmd:?}");
    assert!(!cmd.iter().any(|arg| arg == "--debug"), "{cmd:?}");
    assert_eq!(cmd.len(), 8);

    let server = context.server(
        context
            .options()
            .with_offline(false)
            .with_debug(true)
            .with_hostname("localhost")
            .with_port(4040),
    )?;
    assert_snapshot!(render(run_cmd(&server), &context.filters_for(&server)), @r"
    [BIN]/python
    [BIN]/devpi-server
    --serverdir
    [WORKSPACE]/server
    --host
    localhost
    --port
    4040
    --debug
    ");
    Ok(())
}

#[test]
fn debug_environment_forces_debug_flag() -> Result<()> {
    let context = DevpiContext::new()?;
    let env = EnvironmentOptions {
        debug: true,
        ..EnvironmentOptions::default()
    };
    let server = context.server_with_env(context.options().with_debug(false), &env)?;
    assert!(server.settings().debug);
    assert_eq!(run_cmd(&server).last().map(String::as_str), Some("--debug"));
    Ok(())
}

#[test]
fn accessors() -> Result<()> {
    let context = DevpiContext::new()?;
    let server = context.server(
        context
            .options()
            .with_user("alice")
            .with_password("secret")
            .with_index("myidx")
            .with_port(3141),
    )?;
    assert_eq!(server.uri(), "http://127.0.0.1:3141");
    assert_eq!(server.hostname(), "127.0.0.1");
    assert_eq!(server.port(), 3141);
    assert_eq!(server.user(), "alice");
    assert_eq!(server.password(), "secret");
    assert_eq!(server.index(), "myidx");
    assert_eq!(server.server_dir(), server.workspace().path().join("server"));
    assert_eq!(server.client_dir(), server.workspace().path().join("client"));
    assert!(server.client_dir().is_dir());
    Ok(())
}

#[test]
fn bundled_archive_matches_server_version() -> Result<()> {
    let context = DevpiContext::with_server_version("6.2.0")?;
    context.add_seed("2.6.0")?;
    let seed = context.add_seed("6.2.0")?;
    context.add_seed("6.2.1")?;

    let mut server = context.server(context.options())?;
    assert_eq!(server.server_version()?, "6.2.0");
    assert_eq!(server.seed_archive()?, Some(seed));

    server.pre_setup()?;
    let server_dir = assert_fs::fixture::ChildPath::new(server.server_dir());
    server_dir.child(".version").assert("6.2.0");
    server_dir.child(".nodeinfo").assert(predicate::str::contains("6.2.0"));
    server_dir.child("+files").assert(predicate::path::is_dir());
    Ok(())
}

#[test]
fn explicit_server_version_skips_query() -> Result<()> {
    // The fake server would report 6.2.0.
    let context = DevpiContext::new()?;
    let seed = context.add_seed("5.5.1")?;
    let server = context.server(context.options().with_server_version("5.5.1"))?;
    assert_eq!(server.seed_archive()?, Some(seed));
    Ok(())
}

#[test]
fn explicit_data_is_used_verbatim() -> Result<()> {
    let context = DevpiContext::new()?;
    context.add_seed("6.2.0")?;
    let data = context.root.child("custom.zip");
    crate::common::write_seed_archive(data.path(), "custom")?;

    for offline in [true, false] {
        let mut server = context.server(
            context
                .options()
                .with_offline(offline)
                .with_data(data.path()),
        )?;
        assert_eq!(server.seed_archive()?, Some(data.path().to_path_buf()));
        server.pre_setup()?;
        assert_eq!(
            fs_err::read_to_string(server.server_dir().join(".version"))?,
            "custom"
        );
    }
    Ok(())
}

#[test]
fn online_without_data_is_not_seeded() -> Result<()> {
    // No seed archive exists for the reported version, but none is needed.
    let context = DevpiContext::with_server_version("9.9.9")?;
    let mut server = context.server(context.options().with_offline(false))?;
    assert_eq!(server.seed_archive()?, None);
    assert_eq!(server.server_data()?, ServerData::Fresh);
    server.pre_setup()?;
    assert!(!server.server_dir().exists());
    Ok(())
}

#[test]
fn default_options_without_seed_archive_use_devpi_init() -> Result<()> {
    // An empty seed directory, as when no archive is bundled for the installed version.
    let context = DevpiContext::new()?;
    context.add_init(None)?;

    let mut server = context.server(context.options())?;
    assert!(server.settings().offline);
    assert_eq!(server.server_data()?, ServerData::Init);

    server.pre_setup()?;
    let server_dir = assert_fs::fixture::ChildPath::new(server.server_dir());
    server_dir.child(".version").assert("init");
    server_dir.child("+files").assert(predicate::path::is_dir());

    // A matching archive still takes precedence.
    let seed = context.add_seed("6.2.0")?;
    let server = context.server(context.options())?;
    assert_eq!(server.server_data()?, ServerData::Archive(seed));
    Ok(())
}

#[test]
fn online_without_data_uses_devpi_init() -> Result<()> {
    let context = DevpiContext::new()?;
    context.add_init(None)?;
    let mut server = context.server(context.options().with_offline(false))?;
    assert_eq!(server.server_data()?, ServerData::Init);
    server.pre_setup()?;
    assert!(server.server_dir().join(".nodeinfo").is_file());
    Ok(())
}

#[test]
fn failing_devpi_init_fails_before_launch() -> Result<()> {
    let context = DevpiContext::with_server_version("9.9.9")?;
    context.add_init(Some((3, "serverdir already initialized")))?;

    let mut server = context.server(context.options())?;
    let err = server.start().unwrap_err();
    let Error::Init { status, output, .. } = &err else {
        panic!("expected devpi-init to fail, got {err:?}");
    };
    assert_eq!(status.code(), Some(3));
    assert_eq!(output, "serverdir already initialized\n");
    assert!(!server.test_server().log_path().exists());
    assert_eq!(server.test_server().pid(), None);
    Ok(())
}

#[test]
fn created_seed_archive_is_discovered_and_extracted() -> Result<()> {
    let context = DevpiContext::new()?;
    context.add_init(None)?;

    let seed_dir = context.root.child("new-seeds");
    let (version, archive) = create_seed_archive(&context.executables(), seed_dir.path())?;
    assert_eq!(version, "6.2.0");
    assert_eq!(archive, seed_dir.child("db-6.2.0.zip").path());

    let archives = SeedArchives::discover(seed_dir.path())?;
    assert_eq!(archives.versions().collect::<Vec<_>>(), ["6.2.0"]);

    // Without `devpi-init`, the new archive alone seeds the server.
    fs_err::remove_file(context.bin_dir.child("devpi-init"))?;
    let mut server = context.server(context.options().with_seed_dir(seed_dir.path()))?;
    assert_eq!(server.server_data()?, ServerData::Archive(archive));
    server.pre_setup()?;
    let server_dir = assert_fs::fixture::ChildPath::new(server.server_dir());
    server_dir.child(".version").assert("init");
    server_dir.child("+files").assert(predicate::path::is_dir());
    Ok(())
}

#[test]
fn unsupported_version_fails_before_launch() -> Result<()> {
    let context = DevpiContext::with_server_version("9.9.9")?;
    context.add_seed("6.2.0")?;

    let mut server = context.server(context.options())?;
    let err = server.start().unwrap_err();
    let Error::UnsupportedVersion { version, available } = &err else {
        panic!("expected an unsupported version, got {err:?}");
    };
    assert_eq!(version, "9.9.9");
    assert_eq!(available, &["6.2.0"]);
    assert_snapshot!(err.to_string(), @"No seed archive is bundled for devpi-server 9.9.9 (available: 6.2.0)");

    assert!(!server.test_server().log_path().exists());
    assert_eq!(server.test_server().pid(), None);
    assert_eq!(context.calls()?, "");
    Ok(())
}

#[test]
fn missing_data_fails_before_launch() -> Result<()> {
    let context = DevpiContext::new()?;
    let data = context.root.child("missing.zip");

    let mut server = context.server(context.options().with_data(data.path()))?;
    let err = server.start().unwrap_err();
    let Error::Extract { path, err: source } = &err else {
        panic!("expected an extraction failure, got {err:?}");
    };
    assert_eq!(path, data.path());
    assert!(
        matches!(source, devpi_extract::Error::Io(err) if err.kind() == io::ErrorKind::NotFound),
        "{source:?}"
    );

    assert!(!server.test_server().log_path().exists());
    assert_eq!(server.test_server().pid(), None);
    assert_eq!(context.calls()?, "");
    Ok(())
}

#[test]
fn corrupt_data_fails_before_launch() -> Result<()> {
    let context = DevpiContext::new()?;
    let data = context.root.child("corrupt.zip");
    data.write_str("this is not a zip archive")?;

    let mut server = context.server(context.options().with_data(data.path()))?;
    let err = server.start().unwrap_err();
    assert!(
        matches!(
            &err,
            Error::Extract {
                err: devpi_extract::Error::Zip(_),
                ..
            }
        ),
        "{err:?}"
    );
    assert!(!server.test_server().log_path().exists());
    Ok(())
}

#[test]
fn server_failing_to_start_is_reported() -> Result<()> {
    let context = DevpiContext::new()?;
    context.add_seed("6.2.0")?;

    let mut server = context.server(context.options())?;
    let err = server.start().unwrap_err();
    let Error::TestServer(devpi_test_server::Error::Exited { status, log }) = &err else {
        panic!("expected the server to exit, got {err:?}");
    };
    assert_eq!(status.code(), Some(1));
    assert!(log.contains("the fake devpi-server cannot serve"), "{log}");

    // The data directory was seeded, but the client was never run.
    assert!(server.server_dir().join(".version").is_file());
    assert_eq!(context.calls()?, "");
    Ok(())
}

#[test]
fn post_setup_bootstraps_user_and_index() -> Result<()> {
    let context = DevpiContext::new()?;
    let mut server = context.server(context.options().with_port(3141))?;
    server.post_setup()?;

    let calls = context.calls()?;
    assert_snapshot!(render(calls.lines(), &context.filters_for(&server)), @r"
    use http://127.0.0.1:3141 --clientdir [WORKSPACE]/client
    user -c testuser password= --clientdir [WORKSPACE]/client
    login testuser --password= --clientdir [WORKSPACE]/client
    index -c dev bases= --clientdir [WORKSPACE]/client
    use dev --clientdir [WORKSPACE]/client
    ");
    Ok(())
}

#[test]
fn post_setup_uses_configured_credentials() -> Result<()> {
    let context = DevpiContext::new()?;
    let mut server = context.server(
        context
            .options()
            .with_user("alice")
            .with_password("secret")
            .with_index("myidx")
            .with_port(3141),
    )?;
    server.post_setup()?;

    let calls = context.calls()?;
    assert_snapshot!(render(calls.lines(), &context.filters_for(&server)), @r"
    use http://127.0.0.1:3141 --clientdir [WORKSPACE]/client
    user -c alice password=secret --clientdir [WORKSPACE]/client
    login alice --password=secret --clientdir [WORKSPACE]/client
    index -c myidx bases= --clientdir [WORKSPACE]/client
    use myidx --clientdir [WORKSPACE]/client
    ");
    Ok(())
}

#[test]
fn api_returns_client_stdout() -> Result<()> {
    let context = DevpiContext::new()?;
    let server = context.server(context.options())?;
    assert_eq!(server.api(["getjson", "/testuser/dev"])?, "devpi getjson ok\n");
    assert_eq!(
        render(context.calls()?.lines(), &context.filters_for(&server)),
        "getjson /testuser/dev --clientdir [WORKSPACE]/client"
    );
    Ok(())
}

#[test]
fn failing_client_call_stops_post_setup() -> Result<()> {
    let context = DevpiContext::new()?;
    crate::common::write_script(
        context.bin_dir.child("devpi").path(),
        &format!(
            r#"printf '%s\n' "$*" >> '{}'
if [ "$1" = "login" ]; then echo "unauthorized" >&2; exit 1; fi"#,
            context.calls.path().display()
        ),
    )?;

    let mut server = context.server(context.options())?;
    let err = server.post_setup().unwrap_err();
    let Error::Client { args, stderr, .. } = &err else {
        panic!("expected a client failure, got {err:?}");
    };
    assert_eq!(args, "login testuser --password=");
    assert_eq!(stderr, "unauthorized\n");

    // Index creation depends on the login, so nothing runs after it.
    let calls = context.calls()?;
    assert_eq!(calls.lines().count(), 3, "{calls}");
    Ok(())
}
