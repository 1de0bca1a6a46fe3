//! Integration tests for the daemon's RPC server.
//!
//! These tests verify that the server answers JSON-RPC requests over a
//! Unix socket and that the daemon can be shut down gracefully without
//! panics, with the socket file properly cleaned up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokenward_core::{CredentialName, PrefetchMode, RefreshConfig, TokenKeeper};
use tokenward_daemon::api::{ApiState, ServerHandle, start_server};
use tokenward_daemon::config::SourceConfig;
use tokenward_daemon::sources::build_source;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{Duration, sleep};

/// Detect whether the sandbox allows binding Unix sockets. Skip tests if not.
fn can_bind_unix_socket() -> bool {
    let path = std::env::temp_dir().join("tokenward-socket-permission-check.sock");
    let _ = std::fs::remove_file(&path);
    let result = std::os::unix::net::UnixListener::bind(&path);
    let ok = result.is_ok();
    let _ = std::fs::remove_file(&path);
    ok
}

/// Start a keeper managing one static credential plus a server on the
/// given socket.
async fn start_test_daemon(socket_path: &Path) -> (Arc<TokenKeeper>, ServerHandle) {
    let keeper = Arc::new(TokenKeeper::new());
    let source = build_source(&SourceConfig::Static {
        token: "integration-token".to_string(),
        ttl_secs: 3600,
    });
    keeper
        .start(
            CredentialName::new("ci"),
            source,
            RefreshConfig {
                prefetch: PrefetchMode::Sync,
                ..RefreshConfig::default()
            },
        )
        .await
        .expect("Failed to start refresher");

    let state = ApiState::new(Arc::clone(&keeper));
    let handle = start_server(socket_path, state)
        .await
        .expect("Failed to start server");
    (keeper, handle)
}

/// Send one request line and read back one response line.
async fn call(socket_path: &Path, request: &str) -> serde_json::Value {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .expect("Failed to connect to server");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("Failed to write request");
    stream.write_all(b"\n").await.expect("Failed to write newline");
    stream.flush().await.expect("Failed to flush");

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .expect("Failed to read response");
    serde_json::from_str(&line).expect("Response should be valid JSON")
}

#[tokio::test]
async fn test_get_token_over_socket() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_get_token_over_socket: Unix sockets not permitted in sandbox");
        return;
    }

    let socket_path = PathBuf::from("/tmp/tokenward-test-get-token.sock");
    let _ = std::fs::remove_file(&socket_path);

    let (keeper, server_handle) = start_test_daemon(&socket_path).await;
    sleep(Duration::from_millis(100)).await;

    let response = call(
        &socket_path,
        r#"{"jsonrpc":"2.0","method":"get_token","params":["ci"],"id":1}"#,
    )
    .await;
    assert_eq!(response["result"]["token"].as_str(), Some("integration-token"));
    assert!(response["result"]["expires_at"].as_str().is_some());
    assert_eq!(response["id"], 1);

    // Unknown credentials are an invalid-params error, not a crash.
    let response = call(
        &socket_path,
        r#"{"jsonrpc":"2.0","method":"get_token","params":["ghost"],"id":2}"#,
    )
    .await;
    assert_eq!(response["error"]["code"], -32602);
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("ghost")
    );

    server_handle.stop().await.expect("Server stop should succeed");
    keeper.shutdown().await;
    let _ = std::fs::remove_file(&socket_path);
}

#[tokio::test]
async fn test_list_credentials_over_socket() {
    if !can_bind_unix_socket() {
        eprintln!(
            "Skipping test_list_credentials_over_socket: Unix sockets not permitted in sandbox"
        );
        return;
    }

    let socket_path = PathBuf::from("/tmp/tokenward-test-list.sock");
    let _ = std::fs::remove_file(&socket_path);

    let (keeper, server_handle) = start_test_daemon(&socket_path).await;
    sleep(Duration::from_millis(100)).await;

    let response = call(
        &socket_path,
        r#"{"jsonrpc":"2.0","method":"list_credentials","id":1}"#,
    )
    .await;
    let credentials = response["result"]["credentials"]
        .as_array()
        .expect("credentials should be an array");
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0]["name"].as_str(), Some("ci"));
    // Sync prefetch means the cache is already warm.
    assert_eq!(credentials[0]["cached"].as_bool(), Some(true));
    assert!(credentials[0]["expires_at"].as_str().is_some());

    server_handle.stop().await.expect("Server stop should succeed");
    keeper.shutdown().await;
    let _ = std::fs::remove_file(&socket_path);
}

#[tokio::test]
async fn test_malformed_requests_get_error_responses() {
    if !can_bind_unix_socket() {
        eprintln!(
            "Skipping test_malformed_requests_get_error_responses: Unix sockets not permitted in sandbox"
        );
        return;
    }

    let socket_path = PathBuf::from("/tmp/tokenward-test-malformed.sock");
    let _ = std::fs::remove_file(&socket_path);

    let (keeper, server_handle) = start_test_daemon(&socket_path).await;
    sleep(Duration::from_millis(100)).await;

    // Unknown method
    let response = call(
        &socket_path,
        r#"{"jsonrpc":"2.0","method":"frobnicate","id":1}"#,
    )
    .await;
    assert_eq!(response["error"]["code"], -32601);

    // Missing params
    let response = call(&socket_path, r#"{"jsonrpc":"2.0","method":"get_token","id":2}"#).await;
    assert_eq!(response["error"]["code"], -32602);

    // Not JSON at all
    let response = call(&socket_path, "this is not json").await;
    assert_eq!(response["error"]["code"], -32700);

    server_handle.stop().await.expect("Server stop should succeed");
    keeper.shutdown().await;
    let _ = std::fs::remove_file(&socket_path);
}

#[tokio::test]
async fn test_graceful_shutdown() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_graceful_shutdown: Unix sockets not permitted in sandbox");
        return;
    }

    let socket_path = PathBuf::from("/tmp/tokenward-test-shutdown.sock");
    let _ = std::fs::remove_file(&socket_path);

    let (keeper, server_handle) = start_test_daemon(&socket_path).await;
    sleep(Duration::from_millis(100)).await;

    assert!(socket_path.exists(), "Socket file should exist after server start");

    // Stop the server gracefully - this should not panic
    server_handle.stop().await.expect("Server stop should succeed");
    keeper.shutdown().await;

    // Socket cleanup is done in main.rs, not in the server itself, so we
    // manually clean it up here as main.rs would
    if socket_path.exists() {
        std::fs::remove_file(&socket_path).expect("Failed to remove socket file");
    }
    assert!(!socket_path.exists(), "Socket file should be removed after shutdown");
}

#[tokio::test]
async fn test_shutdown_with_active_connections() {
    if !can_bind_unix_socket() {
        eprintln!(
            "Skipping test_shutdown_with_active_connections: Unix sockets not permitted in sandbox"
        );
        return;
    }

    let socket_path = PathBuf::from("/tmp/tokenward-test-shutdown-connections.sock");
    let _ = std::fs::remove_file(&socket_path);

    let (keeper, server_handle) = start_test_daemon(&socket_path).await;
    sleep(Duration::from_millis(100)).await;

    // Send a request but don't wait for the response
    let mut stream = UnixStream::connect(&socket_path)
        .await
        .expect("Failed to connect to server");
    let request = r#"{"jsonrpc":"2.0","method":"list_credentials","id":1}"#;
    stream
        .write_all(request.as_bytes())
        .await
        .expect("Failed to write request");
    stream.write_all(b"\n").await.expect("Failed to write newline");
    stream.flush().await.expect("Failed to flush");

    // Stop the server while the connection is active - this should not panic
    server_handle
        .stop()
        .await
        .expect("Server stop should succeed even with active connections");
    keeper.shutdown().await;

    let _ = std::fs::remove_file(&socket_path);
}

#[tokio::test]
async fn test_multiple_stop_calls() {
    if !can_bind_unix_socket() {
        eprintln!("Skipping test_multiple_stop_calls: Unix sockets not permitted in sandbox");
        return;
    }

    let socket_path = PathBuf::from("/tmp/tokenward-test-multi-stop.sock");
    let _ = std::fs::remove_file(&socket_path);

    let (keeper, server_handle) = start_test_daemon(&socket_path).await;
    sleep(Duration::from_millis(100)).await;

    // Call stop multiple times - should be idempotent
    server_handle.stop().await.expect("First stop should succeed");
    server_handle.stop().await.expect("Second stop should succeed");
    server_handle.stop().await.expect("Third stop should succeed");

    keeper.shutdown().await;
    let _ = std::fs::remove_file(&socket_path);
}
