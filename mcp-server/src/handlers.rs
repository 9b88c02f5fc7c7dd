// MCP request handlers
//
// Handles initialize, list tools, cancellation and the evaluation tools

use crate::protocol::*;
use crate::session::SessionManager;
use crate::tools;
use jdwp_client::protocol::error_codes;
use jdwp_client::types::{FrameInfo, ThreadId};
use jdwp_client::{JdwpConfig, JdwpConnection, JdwpResult};
use jdwp_eval::{EvalConfig, EvaluationError, Evaluator, Instruction, JdwpVm};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct RequestHandler {
    session_manager: SessionManager,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
}

impl RequestHandler {
    pub fn new() -> Self {
        Self {
            session_manager: SessionManager::new(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Register a request so a later `notifications/cancelled` can reach it
    pub fn begin(&self, id: &Value) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.insert(id.to_string(), token.clone());
        }
        token
    }

    pub fn finish(&self, id: &Value) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&id.to_string());
        }
    }

    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        cancel: CancellationToken,
    ) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params, cancel).await,
            _ => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", request.method),
                data: None,
            }),
        };

        match result {
            Ok(value) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(error),
            },
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                let params = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                match params {
                    Some(params) => self.cancel(&params),
                    None => warn!("Cancellation without a request id"),
                }
            }
            _ => {
                warn!("Unknown notification: {}", notification.method);
            }
        }
    }

    fn cancel(&self, params: &CancelledParams) {
        let token = self
            .in_flight
            .lock()
            .ok()
            .and_then(|in_flight| in_flight.get(&params.request_id.to_string()).cloned());

        match token {
            Some(token) => {
                debug!(
                    "Cancelling request {} ({})",
                    params.request_id,
                    params.reason.as_deref().unwrap_or("no reason")
                );
                token.cancel();
            }
            None => debug!("Cancellation for finished request {}", params.request_id),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| invalid_params(format!("Invalid initialize params: {}", e)))?;

        if let Some(client) = &params.client_info {
            info!(
                "Client: {} {}",
                client.name,
                client.version.as_deref().unwrap_or("")
            );
        }

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {},
            },
            server_info: ServerInfo {
                name: "jdwp-eval-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Expression evaluation for suspended Java threads. \
                Use debug.attach to connect to a JVM, debug.list_threads to find a \
                suspended thread, then debug.evaluate with a compiled instruction sequence."
                    .to_string(),
            ),
        };

        to_json(result)
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        to_json(ListToolsResult {
            tools: tools::get_tools(),
        })
    }

    async fn handle_call_tool(
        &self,
        params: Option<Value>,
        cancel: CancellationToken,
    ) -> Result<Value, JsonRpcError> {
        let call_params: CallToolParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| invalid_params(format!("Invalid tool call params: {}", e)))?;

        let result = match call_params.name.as_str() {
            "debug.attach" => self.handle_attach(call_params.arguments).await,
            "debug.list_threads" => self.handle_list_threads(call_params.arguments).await,
            "debug.evaluate" => self.handle_evaluate(call_params.arguments, cancel).await,
            "debug.disconnect" => self.handle_disconnect(call_params.arguments).await,
            _ => Err(format!("Unknown tool: {}", call_params.name)),
        };

        let call_result = match result {
            Ok(content) => CallToolResult {
                content: vec![ContentBlock::Text { text: content }],
                is_error: None,
            },
            Err(error) => CallToolResult {
                content: vec![ContentBlock::Text { text: error }],
                is_error: Some(true),
            },
        };
        to_json(call_result)
    }

    async fn handle_attach(&self, args: Value) -> Result<String, String> {
        let host = args.get("host").and_then(|v| v.as_str()).unwrap_or("localhost");
        let port = args.get("port").and_then(|v| v.as_u64()).unwrap_or(5005);
        let port = u16::try_from(port).map_err(|_| format!("Invalid port: {}", port))?;

        let mut config = JdwpConfig::default();
        if let Some(ms) = args.get("timeout_ms").and_then(|v| v.as_u64()) {
            config.handshake_timeout = Duration::from_millis(ms);
        }

        let connection = JdwpConnection::connect_with_config(host, port, config)
            .await
            .map_err(|e| format!("Failed to connect: {}", e))?;
        let vm = JdwpVm::attach(connection, EvalConfig::default())
            .await
            .map_err(|e| format!("Failed to attach: {}", e))?;

        let session_id = self.session_manager.create_session(vm).await;
        Ok(format!(
            "Connected to JVM at {}:{} (session: {})",
            host, port, session_id
        ))
    }

    async fn handle_list_threads(&self, _args: Value) -> Result<String, String> {
        let session = self
            .session_manager
            .get_current_session()
            .await
            .ok_or_else(|| "No active debug session. Use debug.attach first.".to_string())?;
        let connection = session.connection();

        let threads = connection
            .get_all_threads()
            .await
            .map_err(|e| format!("Failed to get threads: {}", e))?;

        let mut output = format!("{} thread(s):\n", threads.len());
        for thread_id in threads {
            let name = connection
                .get_thread_name(thread_id)
                .await
                .unwrap_or_else(|_| "<unknown>".to_string());

            let status = thread_status(connection.get_frames(thread_id, 0, -1).await)?;
            output.push_str(&format!("  0x{:x} {} ({})\n", thread_id, name, status));
        }

        Ok(output)
    }

    async fn handle_evaluate(
        &self,
        args: Value,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        let session = self
            .session_manager
            .get_current_session()
            .await
            .ok_or_else(|| "No active debug session. Use debug.attach first.".to_string())?;

        run_evaluation(&session.evaluator, &args, &cancel).await
    }

    async fn handle_disconnect(&self, _args: Value) -> Result<String, String> {
        let session_id = self
            .session_manager
            .get_current_session_id()
            .await
            .ok_or_else(|| "No active debug session".to_string())?;

        if let Some(session) = self.session_manager.remove_session(&session_id).await {
            // Dispose clears our event requests and resumes the target
            if let Err(e) = session.connection().dispose().await {
                warn!("Dispose failed for {}: {}", session_id, e);
            }
        }
        Ok(format!("Disconnected from debug session: {}", session_id))
    }
}

/// Frames are only readable while the thread is suspended. A lost
/// connection is an error, not a running thread.
fn thread_status(frames: JdwpResult<Vec<FrameInfo>>) -> Result<String, String> {
    match frames {
        Ok(frames) => Ok(format!("suspended, {} frame(s)", frames.len())),
        Err(e) if e.error_code() == Some(error_codes::THREAD_NOT_SUSPENDED) => {
            Ok("running".to_string())
        }
        Err(e) => {
            let err = EvaluationError::from(e);
            if err.is_connection_loss() {
                Err(format_error(&err))
            } else {
                Ok(format!("unavailable: {}", err))
            }
        }
    }
}

/// Parse `debug.evaluate` arguments, bind the frame and run the sequence
async fn run_evaluation(
    evaluator: &Evaluator,
    args: &Value,
    cancel: &CancellationToken,
) -> Result<String, String> {
    let thread = args
        .get("thread_id")
        .ok_or_else(|| "Missing 'thread_id' parameter".to_string())
        .and_then(parse_thread_id)?;
    let depth = args.get("frame").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    let instructions: Vec<Instruction> = args
        .get("instructions")
        .cloned()
        .ok_or_else(|| "Missing 'instructions' parameter".to_string())
        .and_then(|v| {
            serde_json::from_value(v).map_err(|e| format!("Invalid instructions: {}", e))
        })?;

    // Binding may wait behind another evaluation on the same thread
    let ctx = tokio::select! {
        bound = evaluator.bind(thread, depth) => bound.map_err(|e| format_error(&e))?,
        _ = cancel.cancelled() => return Err(format_error(&EvaluationError::Cancelled)),
    };

    let value = jdwp_eval::evaluate_with_cancel(&instructions, &ctx, cancel)
        .await
        .map_err(|e| format_error(&e))?;
    ctx.describe(&value).await.map_err(|e| format_error(&e))
}

fn parse_thread_id(value: &Value) -> Result<ThreadId, String> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    };
    parsed.ok_or_else(|| format!("Invalid thread_id: {}", value))
}

/// Prefix an evaluation failure with its category so clients can tell a
/// target exception from a lost connection or a compiler defect
fn format_error(err: &EvaluationError) -> String {
    match err {
        EvaluationError::RemoteException { description, .. } => {
            format!("exception: {}", description)
        }
        EvaluationError::Cancelled => "cancelled".to_string(),
        e if e.is_connection_loss() => format!("connection: {}", e),
        e if e.is_internal() => format!("internal: {}", e),
        e => format!("evaluation: {}", e),
    }
}

fn invalid_params(message: String) -> JsonRpcError {
    JsonRpcError {
        code: INVALID_PARAMS,
        message,
        data: None,
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError {
        code: INTERNAL_ERROR,
        message: format!("Failed to encode result: {}", e),
        data: None,
    })
}
