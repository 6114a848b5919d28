//! Tests against a real devpi installation, located through `DEVPI_FIXTURE_BIN_DIR`, the active
//! virtual environment, or `PATH`.

use std::net::TcpStream;

use anyhow::Result;

use devpi_fixture::{DevpiServer, DevpiServerOptions, Error, ServerProcess, session};

/// The only test using [`session`], so no other test holds a handle that would keep it alive.
#[test]
fn session_server_has_default_user_and_index() -> Result<()> {
    devpi_logging::setup_test_logging();
    let server = session()?;
    assert_eq!(server.user(), "testuser");
    assert_eq!(server.index(), "dev");

    // The session is shared while a handle is alive.
    let again = session()?;
    assert_eq!(server.uri(), again.uri());

    let json = server.api_json(["getjson", "/testuser/dev"])?;
    assert_eq!(json["result"]["type"], "stage");
    assert_eq!(json["result"]["bases"], serde_json::json!([]));

    // The client points at the server with the new index active.
    let output = server.api(["use"])?;
    assert!(output.contains(&server.uri()), "{output}");
    assert!(output.contains("testuser/dev"), "{output}");

    // Dropping one handle keeps the server running.
    let address = (server.hostname().to_string(), server.port());
    let workspace = server.workspace().path().to_path_buf();
    drop(again);
    assert!(TcpStream::connect(&address).is_ok(), "{address:?} was closed");

    // Dropping the last handle tears it down.
    drop(server);
    assert!(!workspace.exists());
    assert!(
        TcpStream::connect(&address).is_err(),
        "{address:?} still accepts connections"
    );

    // The next call starts a fresh server.
    let fresh = session()?;
    assert_ne!(fresh.workspace().path(), workspace);
    assert!(fresh.test_server().pid().is_some());
    assert!(TcpStream::connect((fresh.hostname(), fresh.port())).is_ok());
    let json = fresh.api_json(["getjson", "/testuser/dev"])?;
    assert_eq!(json["result"]["type"], "stage");
    Ok(())
}

#[test]
fn custom_user_and_index() -> Result<()> {
    devpi_logging::setup_test_logging();
    let server = DevpiServer::launch(
        DevpiServerOptions::default()
            .with_user("alice")
            .with_password("secret")
            .with_index("myidx"),
    )?;

    let json = server.api_json(["getjson", "/alice/myidx"])?;
    assert_eq!(json["result"]["type"], "stage");
    assert_eq!(json["result"]["bases"], serde_json::json!([]));

    // The user owns exactly the one index.
    let json = server.api_json(["getjson", "/alice"])?;
    let indexes = json["result"]["indexes"]
        .as_object()
        .map(|indexes| indexes.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    assert_eq!(indexes, ["myidx"]);

    // A second index, created through the client.
    server.api(["index", "-c", "other", "bases=alice/myidx"])?;
    let json = server.api_json(["getjson", "/alice/other"])?;
    assert_eq!(json["result"]["bases"], serde_json::json!(["alice/myidx"]));
    Ok(())
}

#[test]
fn missing_data_fails_before_launch() -> Result<()> {
    devpi_logging::setup_test_logging();
    let missing = tempfile::tempdir()?.path().join("missing.zip");
    let mut server = DevpiServer::new(DevpiServerOptions::default().with_data(&missing))?;
    let err = server.start().unwrap_err();
    assert!(matches!(err, Error::Extract { .. }), "{err:?}");
    assert_eq!(server.test_server().pid(), None);
    Ok(())
}

#[test]
fn server_stops_on_drop() -> Result<()> {
    devpi_logging::setup_test_logging();
    let server = DevpiServer::launch(DevpiServerOptions::default())?;
    let address = (server.hostname().to_string(), server.port());
    let workspace = server.workspace().path().to_path_buf();
    drop(server);

    assert!(!workspace.exists());
    assert!(
        TcpStream::connect(&address).is_err(),
        "{address:?} still accepts connections"
    );
    Ok(())
}
