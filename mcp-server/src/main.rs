// JDWP evaluation MCP server - watch expressions and snippets over stdio
//
// Attaches to a JVM via JDWP and evaluates compiled instruction sequences
// in suspended frames

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

mod handlers;
mod protocol;
mod session;
mod tools;

use handlers::RequestHandler;
use protocol::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing to stderr only - stdout is reserved for JSON-RPC protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jdwp_eval_mcp=info".parse().context("bad log directive")?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting JDWP evaluation MCP server...");

    let handler = Arc::new(RequestHandler::new());
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer = tokio::spawn(write_responses(rx));

    let mut reader = BufReader::new(tokio::io::stdin());
    info!("Ready, waiting for requests...");

    // Requests run concurrently so a long evaluation never blocks a
    // cancellation notification for it
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Client disconnected");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!("Received: {}", line);
                dispatch(&handler, &tx, line).await;
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }

    drop(tx);
    writer.await.context("response writer panicked")??;

    info!("JDWP evaluation MCP server shutting down");
    Ok(())
}

async fn dispatch(
    handler: &Arc<RequestHandler>,
    tx: &mpsc::UnboundedSender<JsonRpcResponse>,
    line: &str,
) {
    let value = match serde_json::from_str::<Value>(line) {
        Ok(value) => value,
        Err(e) => {
            error!("Parse error: {}", e);
            let _ = tx.send(JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error"));
            return;
        }
    };

    // Discriminate by id field
    if value.get("id").is_none() {
        match serde_json::from_value::<JsonRpcNotification>(value) {
            Ok(notification) => handler.handle_notification(notification).await,
            Err(e) => error!("Invalid notification: {}", e),
        }
        return;
    }

    let request = match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) => request,
        Err(e) => {
            error!("Invalid request: {}", e);
            let _ = tx.send(JsonRpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                "Invalid request",
            ));
            return;
        }
    };

    let handler = handler.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let id = request.id.clone();
        let cancel = handler.begin(&id);
        let response = handler.handle_request(request, cancel).await;
        handler.finish(&id);
        let _ = tx.send(response);
    });
}

async fn write_responses(mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(response) = rx.recv().await {
        let response_str = serde_json::to_string(&response)?;
        debug!("Sending: {}", response_str);
        stdout.write_all(response_str.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
