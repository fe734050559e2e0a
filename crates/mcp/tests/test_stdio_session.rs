//! Stdio session tests against the fixture server binary

#![cfg(unix)]

use relay_mcp::{
    CapabilityProviderSpec, EnvOverlay, McpError, SessionOptions, StdioSession, Supervisor,
    SupervisorError, ToolSession,
};
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const FIXTURE: &str = env!("CARGO_BIN_EXE_mcp-fixture-server");

fn fixture(name: &str, args: &[&str]) -> CapabilityProviderSpec {
    CapabilityProviderSpec::new(name, FIXTURE).args(args.iter().copied())
}

fn fast_options() -> SessionOptions {
    SessionOptions {
        launch_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(2),
        ..SessionOptions::default()
    }
}

async fn connect(spec: &CapabilityProviderSpec, options: SessionOptions) -> StdioSession {
    let mut session = StdioSession::launch(spec, options).await.unwrap();
    session.handshake().await.unwrap();
    session
}

/// Alive and not a zombie
fn is_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .map(|state| state != "Z")
            .unwrap_or(false),
        Err(_) => false,
    }
}

fn read_pid(path: &Path) -> u32 {
    std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
}

/// A SIGKILLed grandchild is reaped by init, give it a moment
async fn gone_soon(pid: u32) -> bool {
    for _ in 0..50 {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// The fixture behind a shell that stays around as its parent, like `npx`
fn wrapped_fixture(name: &str, pid_file: &Path) -> CapabilityProviderSpec {
    let script = format!(
        "{} --ignore-stdin-close --pid-file {}; :",
        FIXTURE,
        pid_file.display()
    );
    CapabilityProviderSpec::new(name, "/bin/sh").args(["-c".to_string(), script])
}

#[tokio::test]
async fn test_handshake_and_paginated_listing() {
    let spec = fixture("paged", &["--tools", "a,b,c,d,e", "--page-size", "2"]);
    let session = connect(&spec, fast_options()).await;

    assert_eq!(session.server_info().unwrap().name, "fixture");
    let names: Vec<_> = session
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["a", "b", "c", "d", "e"]);

    session.shutdown().await;
}

#[tokio::test]
async fn test_call_tool_echo_and_error_flag() {
    let session = connect(&fixture("fx", &[]), fast_options()).await;

    let echoed = session
        .call_tool("echo", json!({"path": "README.md"}))
        .await
        .unwrap();
    assert!(!echoed.is_error);
    let args: Value = serde_json::from_str(&echoed.render()).unwrap();
    assert_eq!(args["path"], "README.md");

    let failed = session.call_tool("fail", json!({})).await.unwrap();
    assert!(failed.is_error);
    assert_eq!(failed.render(), "boom");

    let err = session.call_tool("rpc_error", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::Rpc { code: -32602, .. }));

    session.shutdown().await;
}

#[tokio::test]
async fn test_hung_call_times_out_and_session_recovers() {
    let options = SessionOptions {
        request_timeout: Duration::from_millis(300),
        ..fast_options()
    };
    let session = connect(&fixture("fx", &[]), options).await;

    let err = session.call_tool("hang", json!({})).await.unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {}", err);

    // no reply ever comes for the hung call
    let echoed = session.call_tool("echo", json!({"n": 2})).await.unwrap();
    assert!(echoed.render().contains("\"n\":2"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_late_reply_is_discarded() {
    let options = SessionOptions {
        request_timeout: Duration::from_millis(500),
        ..fast_options()
    };
    let session = connect(&fixture("fx", &[]), options).await;

    let err = session
        .call_tool("late", json!({"ms": 700}))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {}", err);

    // the late reply arrives first and must not be taken for this one
    let echoed = session.call_tool("echo", json!({"n": 3})).await.unwrap();
    assert!(!echoed.is_error);
    assert!(echoed.render().contains("\"n\":3"), "got {}", echoed.render());

    session.shutdown().await;
}

#[tokio::test]
async fn test_interrupted_write_closes_the_channel() {
    let options = SessionOptions {
        request_timeout: Duration::from_millis(300),
        shutdown_grace: Duration::from_millis(200),
        ..fast_options()
    };
    let session = connect(&fixture("fx", &[]), options).await;

    let err = session.call_tool("stall", json!({})).await.unwrap_err();
    assert!(err.is_timeout());

    // far more than a pipe buffer, so the write itself is cut short
    let blob = "x".repeat(1 << 20);
    let err = session
        .call_tool("echo", json!({ "blob": blob }))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let started = Instant::now();
    let err = session.call_tool("echo", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::Closed), "unexpected error: {}", err);
    assert!(started.elapsed() < Duration::from_millis(300));

    session.shutdown().await;
}

#[tokio::test]
async fn test_unreadable_error_fails_the_call() {
    let session = connect(&fixture("fx", &[]), fast_options()).await;

    let started = Instant::now();
    let err = session.call_tool("bad_error", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::Protocol(_)), "unexpected error: {}", err);
    assert!(started.elapsed() < Duration::from_secs(2));

    session.shutdown().await;
}

#[tokio::test]
async fn test_provider_requests_are_answered() {
    let session = connect(&fixture("fx", &[]), fast_options()).await;
    let result = session.call_tool("ping_back", json!({})).await.unwrap();
    assert!(!result.is_error);
    assert_eq!(result.render(), "pong received");
    session.shutdown().await;
}

#[tokio::test]
async fn test_stdout_noise_is_skipped() {
    let session = connect(&fixture("chatty", &["--chatty"]), fast_options()).await;
    assert!(!session.list_tools().await.unwrap().is_empty());
    session.shutdown().await;
}

#[tokio::test]
async fn test_environment_is_isolated() {
    std::env::set_var("RELAY_TEST_PARENT_ONLY", "leak");
    let spec = fixture("fx", &[]).env(EnvOverlay::new().with("RELAY_TEST_OVERLAY", "visible"));
    let session = connect(&spec, fast_options()).await;

    let result = session.call_tool("env", json!({})).await.unwrap();
    let env: Value = serde_json::from_str(&result.render()).unwrap();
    assert_eq!(env["RELAY_TEST_OVERLAY"], "visible");
    assert!(env.get("RELAY_TEST_PARENT_ONLY").is_none());
    assert!(env.get("CARGO_MANIFEST_DIR").is_none());

    session.shutdown().await;
}

#[tokio::test]
async fn test_hung_handshake_is_a_timeout() {
    let options = SessionOptions {
        handshake_timeout: Duration::from_millis(300),
        ..fast_options()
    };
    let err = Supervisor::acquire(&[fixture("slow", &["--hang-handshake"])], options)
        .await
        .unwrap_err();

    match err {
        SupervisorError::Handshake { name, source } => {
            assert_eq!(name, "slow");
            assert!(source.is_timeout());
        }
        other => panic!("expected handshake error, got {}", other),
    }
}

#[tokio::test]
async fn test_refused_handshake_names_provider() {
    let err = Supervisor::acquire(&[fixture("grumpy", &["--fail-handshake"])], fast_options())
        .await
        .unwrap_err();
    assert_eq!(err.provider(), "grumpy");
    assert!(matches!(err.cause(), McpError::Rpc { code: -32000, .. }));
}

#[tokio::test]
async fn test_early_exit_is_handshake_failure() {
    let err = Supervisor::acquire(&[fixture("quitter", &["--exit-on-start"])], fast_options())
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Handshake { .. }));
}

#[tokio::test]
async fn test_missing_binary_is_launch_failure() {
    let spec = CapabilityProviderSpec::new("ghost", "/nonexistent/mcp-server");
    let err = Supervisor::acquire(&[spec], fast_options()).await.unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::Launch {
            source: McpError::Spawn { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_rollback_leaves_no_process_behind() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.pid");
    let second = dir.path().join("second.pid");

    let specs = vec![
        fixture("first", &["--pid-file", first.to_str().unwrap()]),
        fixture("second", &["--pid-file", second.to_str().unwrap()]),
        CapabilityProviderSpec::new("broken", "/nonexistent/mcp-server"),
    ];

    let err = Supervisor::acquire(&specs, fast_options()).await.unwrap_err();
    assert_eq!(err.provider(), "broken");

    assert!(!is_running(read_pid(&first)));
    assert!(!is_running(read_pid(&second)));
}

#[tokio::test]
async fn test_release_stops_every_provider() {
    let dir = TempDir::new().unwrap();
    let pid_a = dir.path().join("a.pid");
    let pid_b = dir.path().join("b.pid");

    let specs = vec![
        fixture("a", &["--pid-file", pid_a.to_str().unwrap()]),
        fixture("b", &["--pid-file", pid_b.to_str().unwrap()]),
    ];
    let supervisor = Supervisor::acquire(&specs, fast_options()).await.unwrap();
    assert_eq!(supervisor.names(), vec!["a", "b"]);

    let (a, b) = (read_pid(&pid_a), read_pid(&pid_b));
    assert!(is_running(a));
    assert!(is_running(b));

    supervisor.release().await;
    assert!(!is_running(a));
    assert!(!is_running(b));
}

#[tokio::test]
async fn test_stubborn_provider_is_killed_after_grace() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("stubborn.pid");
    let options = SessionOptions {
        shutdown_grace: Duration::from_millis(200),
        ..fast_options()
    };

    let spec = fixture(
        "stubborn",
        &["--ignore-stdin-close", "--pid-file", pid_file.to_str().unwrap()],
    );
    let supervisor = Supervisor::acquire(&[spec], options).await.unwrap();
    let pid = read_pid(&pid_file);

    supervisor.release().await;
    assert!(!is_running(pid));
}

#[tokio::test]
async fn test_release_kills_server_behind_launcher() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("server.pid");
    let options = SessionOptions {
        shutdown_grace: Duration::from_millis(200),
        ..fast_options()
    };

    let supervisor = Supervisor::acquire(&[wrapped_fixture("wrapped", &pid_file)], options)
        .await
        .unwrap();
    let server = read_pid(&pid_file);
    assert!(is_running(server));

    supervisor.release().await;
    assert!(gone_soon(server).await, "server {} outlived release", server);
}

#[tokio::test]
async fn test_dropped_session_kills_server_behind_launcher() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("server.pid");

    let session = connect(&wrapped_fixture("wrapped", &pid_file), fast_options()).await;
    let server = read_pid(&pid_file);
    assert!(is_running(server));

    drop(session);
    assert!(gone_soon(server).await, "server {} outlived its session", server);
}
