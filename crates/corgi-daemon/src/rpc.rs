//! JSON-RPC server over Unix socket.
//!
//! The Mini App route layer connects here after authenticating the Telegram
//! user; `user_id` params are trusted. One request per line, one response
//! per line.

use std::path::PathBuf;
use std::sync::Arc;

use corgi_settlement::{ErrorKind, SettlementError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid params (-32602). Also used for rejected domain input.
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PARAMS",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603). Details stay in the log.
    pub fn internal_error() -> Self {
        Self::new(-32603, "INTERNAL_ERROR", None)
    }

    /// Entity not found (-32004).
    pub fn not_found(detail: &str) -> Self {
        Self::new(-32004, "NOT_FOUND", Some(serde_json::json!({"detail": detail})))
    }

    /// State conflict (-32009), e.g. already responded or already pending.
    pub fn conflict(detail: &str) -> Self {
        Self::new(-32009, "CONFLICT", Some(serde_json::json!({"detail": detail})))
    }

    /// Chain temporarily unavailable (-32050); the client may retry later.
    pub fn chain_unavailable(attempts: Option<u32>) -> Self {
        Self::new(
            -32050,
            "CHAIN_UNAVAILABLE",
            attempts.map(|a| serde_json::json!({"attempts": a})),
        )
    }
}

impl From<SettlementError> for RpcError {
    fn from(err: SettlementError) -> Self {
        match err.kind() {
            ErrorKind::Validation => RpcError::invalid_params(&err.to_string()),
            ErrorKind::NotFound => RpcError::not_found(&err.to_string()),
            ErrorKind::Conflict => {
                let mut rpc = RpcError::conflict(&err.to_string());
                if let SettlementError::InsufficientBalance {
                    required,
                    available,
                } = &err
                {
                    rpc.data = Some(serde_json::json!({
                        "detail": err.to_string(),
                        "required": required,
                        "available": available,
                    }));
                }
                rpc
            }
            ErrorKind::Transient => {
                warn!(error = %err, "chain unavailable");
                let attempts = match &err {
                    SettlementError::Chain { attempts, .. } => Some(*attempts),
                    _ => None,
                };
                RpcError::chain_unavailable(attempts)
            }
            ErrorKind::Internal => {
                error!(error = %err, "internal error");
                RpcError::internal_error()
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&state, &line).await;
        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Parse and answer one request line.
pub async fn handle_line(state: &Arc<DaemonState>, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) if request.jsonrpc == "2.0" => dispatch_request(state, request).await,
        Ok(request) => RpcResponse::error(request.id, RpcError::invalid_request()),
        Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Users
        "upsert_user" => commands::users::upsert_user(state, params).await,
        "connect_wallet" => commands::users::connect_wallet(state, params).await,
        "disconnect_wallet" => commands::users::disconnect_wallet(state, params).await,
        "get_onboarding" => commands::users::get_onboarding(state, params).await,

        // Buddies
        "request_buddy" => commands::buddies::request_buddy(state, params).await,
        "confirm_buddy" => commands::buddies::confirm_buddy(state, params).await,
        "cancel_buddy" => commands::buddies::cancel_buddy(state, params).await,
        "dissolve_buddy" => commands::buddies::dissolve_buddy(state, params).await,

        // Sightings
        "report_sighting" => commands::sightings::report_sighting(state, params).await,
        "respond_sighting" => commands::sightings::respond_sighting(state, params).await,
        "get_pending_sightings" => {
            commands::sightings::get_pending_sightings(state, params).await
        }

        // Wishes
        "create_wish" => commands::wishes::create_wish(state, params).await,
        "respond_wish" => commands::wishes::respond_wish(state, params).await,
        "get_marketplace" => commands::wishes::get_marketplace(state, params).await,
        "get_my_wishes" => commands::wishes::get_my_wishes(state, params).await,
        "purchase_wish" => commands::wishes::purchase_wish(state, params).await,
        "confirm_wish_purchase" => commands::wishes::confirm_wish_purchase(state, params).await,

        // Bank and pending rewards
        "get_bank_status" => commands::bank::get_bank_status(state).await,
        "record_bank_deposit" => commands::bank::record_bank_deposit(state, params).await,
        "get_pending_rewards" => commands::bank::get_pending_rewards(state, params).await,
        "cancel_pending_reward" => commands::bank::cancel_pending_reward(state, params).await,

        // Reconciliation
        "run_sweep" => commands::sweep::run_sweep(state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
