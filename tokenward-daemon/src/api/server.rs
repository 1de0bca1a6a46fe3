//! JSON-RPC server implementation with Unix socket support.

use super::handlers::{ApiState, TokenwardApiImpl, TokenwardApiServer};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a running RPC server
pub struct ServerHandle {
    shutdown: Arc<Mutex<Option<tokio::sync::mpsc::Sender<()>>>>,
    join_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Start the JSON-RPC server on a Unix socket.
///
/// # Parameters
///
/// - `socket_path`: Path to the Unix socket file
/// - `state`: API state shared across handlers
///
/// # Returns
///
/// A handle to the running server that can be used to stop it.
pub async fn start_server(socket_path: &Path, state: ApiState) -> Result<ServerHandle> {
    // Remove existing socket if present
    if socket_path.exists() {
        warn!("Removing existing socket at {:?}", socket_path);
        std::fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove existing socket at {:?}", socket_path))?;
    }

    // Ensure parent directory exists
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory {:?}", parent))?;
    }

    info!("Starting JSON-RPC server on {:?}", socket_path);

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind Unix socket at {:?}", socket_path))?;

    let api = Arc::new(TokenwardApiImpl::new(state));

    // Shutdown signal for the accept loop
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);

    let server_task: JoinHandle<()> = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = rx.recv() => {
                    debug!("Server shutdown signal received");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let api = api.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, api).await {
                                    warn!("Connection handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    });

    info!("JSON-RPC server started and listening");

    Ok(ServerHandle {
        shutdown: Arc::new(Mutex::new(Some(tx))),
        join_handle: Arc::new(Mutex::new(Some(server_task))),
    })
}

/// Handle a single connection
async fn handle_connection(mut stream: UnixStream, api: Arc<TokenwardApiImpl>) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;

        if n == 0 {
            // Connection closed
            break;
        }

        debug!("Received request: {}", line.trim());

        let request: serde_json::Value = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let error_response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "error": {
                        "code": -32700,
                        "message": format!("Parse error: {}", e)
                    },
                    "id": null
                });
                writer.write_all(error_response.to_string().as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                continue;
            }
        };

        let response = process_request(request, &api).await;
        writer.write_all(response.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Process a JSON-RPC request
async fn process_request(
    request: serde_json::Value,
    api: &Arc<TokenwardApiImpl>,
) -> serde_json::Value {
    use jsonrpsee::types::ErrorObject;

    let id = request.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let method = match request.get("method").and_then(|m| m.as_str()) {
        Some(m) => m,
        None => {
            return serde_json::json!({
                "jsonrpc": "2.0",
                "error": {
                    "code": -32600,
                    "message": "Invalid Request: missing method"
                },
                "id": id
            });
        }
    };

    let params = request
        .get("params")
        .cloned()
        .unwrap_or(serde_json::Value::Array(vec![]));

    let result = match method {
        "get_token" => {
            let name = params
                .as_array()
                .and_then(|arr| arr.first())
                .and_then(|v| v.as_str());
            if let Some(name) = name {
                match api.get_token(name.to_string()).await {
                    Ok(resp) => Ok(serde_json::to_value(resp).unwrap()),
                    Err(e) => Err(e),
                }
            } else {
                Err(ErrorObject::owned(-32602, "Invalid params", None::<()>))
            }
        }
        "list_credentials" => match api.list_credentials().await {
            Ok(resp) => Ok(serde_json::to_value(resp).unwrap()),
            Err(e) => Err(e),
        },
        _ => Err(ErrorObject::owned(-32601, "Method not found", None::<()>)),
    };

    match result {
        Ok(value) => serde_json::json!({
            "jsonrpc": "2.0",
            "result": value,
            "id": id
        }),
        Err(error) => serde_json::json!({
            "jsonrpc": "2.0",
            "error": {
                "code": error.code(),
                "message": error.message()
            },
            "id": id
        }),
    }
}

impl ServerHandle {
    /// Stop the server.
    ///
    /// Idempotent: calling stop on an already stopped server is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.join_handle.lock().await.take() {
            // If the task panicked, surface the error
            handle.await?;
        }

        Ok(())
    }
}
