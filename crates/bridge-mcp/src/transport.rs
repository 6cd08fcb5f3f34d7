//! Stdio transport for tool server communication.
//!
//! Spawns the server as a child process and exchanges newline-delimited
//! JSON-RPC messages over its stdin/stdout. A reader task routes responses
//! to waiting requests by id; once the server's stdout closes the transport
//! is marked broken and every waiter is released.

use crate::error::McpError;
use crate::jsonrpc::{
    IncomingMessage, JsonRpcNotification, JsonRpcReply, JsonRpcRequest, JsonRpcResponse,
};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// In-flight requests plus the reason the channel closed, if it has.
#[derive(Default)]
struct PendingTable {
    waiters: HashMap<u64, oneshot::Sender<Result<JsonRpcResponse, McpError>>>,
    closed: Option<String>,
}

/// Async stdio transport for communicating with one tool server process.
pub struct StdioTransport {
    command: String,
    next_id: AtomicU64,
    write_tx: mpsc::Sender<String>,
    pending: Arc<Mutex<PendingTable>>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    child: Mutex<Child>,
}

impl StdioTransport {
    /// Spawn a child process and start background reader/writer tasks.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        quiet_stderr: bool,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if quiet_stderr {
                Stdio::null()
            } else {
                Stdio::inherit()
            })
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::TransportStart {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(McpError::TransportStart {
                command: command.to_string(),
                reason: "stdio pipes unavailable".to_string(),
            });
        };

        let pending = Arc::new(Mutex::new(PendingTable::default()));

        // Writer task: drains channel and writes to child stdin
        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let writer_handle = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = write_rx.recv().await {
                let frame = format!("{msg}\n");
                if let Err(e) = stdin.write_all(frame.as_bytes()).await {
                    tracing::debug!("Tool server stdin closed: {e}");
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Reader task: reads lines from stdout, routes responses by id
        let pending_for_reader = Arc::clone(&pending);
        let reply_tx = write_tx.clone();
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let reason = loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break "tool server closed its output".to_string(),
                    Err(e) => break format!("failed to read from tool server: {e}"),
                };
                if line.trim().is_empty() {
                    continue;
                }
                match IncomingMessage::parse(&line) {
                    Ok(IncomingMessage::Response(resp)) => {
                        let waiter = pending_for_reader.lock().await.waiters.remove(&resp.id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(Ok(resp));
                            }
                            None => tracing::debug!("Dropping late response for id {}", resp.id),
                        }
                    }
                    Ok(IncomingMessage::MalformedResponse { id, reason }) => {
                        let waiter = pending_for_reader.lock().await.waiters.remove(&id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(Err(McpError::Protocol(reason)));
                            }
                            None => tracing::warn!("Dropping malformed frame for id {id}: {line}"),
                        }
                    }
                    Ok(IncomingMessage::Request { id, method }) => {
                        let reply = if method == "ping" {
                            JsonRpcReply::result(id, serde_json::json!({}))
                        } else {
                            JsonRpcReply::method_not_found(id, &method)
                        };
                        if let Ok(serialized) = serde_json::to_string(&reply) {
                            let _ = reply_tx.send(serialized).await;
                        }
                    }
                    Ok(IncomingMessage::Notification { method }) => {
                        tracing::debug!("Ignoring server notification '{method}'");
                    }
                    Err(e) => {
                        tracing::warn!("Skipping non-JSON-RPC output from tool server: {e}: {line}");
                    }
                }
            };

            // Release every waiter so nothing blocks on a dead server
            let mut table = pending_for_reader.lock().await;
            table.closed = Some(reason);
            table.waiters.clear();
        });

        Ok(Self {
            command: command.to_string(),
            next_id: AtomicU64::new(1),
            write_tx,
            pending,
            reader_handle,
            writer_handle,
            child: Mutex::new(child),
        })
    }

    /// Send a JSON-RPC request and wait at most `timeout` for the response.
    ///
    /// On timeout the server is told to abandon the request and any late
    /// response is discarded.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let serialized = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut table = self.pending.lock().await;
            if let Some(reason) = &table.closed {
                return Err(McpError::TransportBroken(reason.clone()));
            }
            table.waiters.insert(id, tx);
        }

        tracing::debug!("-> {method} (id {id})");
        if self.write_tx.send(serialized).await.is_err() {
            self.pending.lock().await.waiters.remove(&id);
            return Err(self.broken().await);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => Err(self.broken().await),
            Err(_) => {
                self.pending.lock().await.waiters.remove(&id);
                let cancel = serde_json::json!({"requestId": id, "reason": "timeout"});
                if let Err(e) = self
                    .send_notification("notifications/cancelled", Some(cancel))
                    .await
                {
                    tracing::debug!("Could not send cancellation for id {id}: {e}");
                }
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Send a JSON-RPC notification (fire-and-forget, no response expected).
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let serialized = serde_json::to_string(&notification)?;

        if self.write_tx.send(serialized).await.is_err() {
            return Err(self.broken().await);
        }
        Ok(())
    }

    /// Whether the server's output stream has closed.
    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.closed.is_some()
    }

    /// Build a `TransportBroken` error, with the exit status if the child is gone.
    async fn broken(&self) -> McpError {
        let reason = self
            .pending
            .lock()
            .await
            .closed
            .clone()
            .unwrap_or_else(|| "tool server stopped accepting input".to_string());
        match self.child.lock().await.try_wait() {
            Ok(Some(status)) => McpError::TransportBroken(format!("{reason} ({status})")),
            _ => McpError::TransportBroken(reason),
        }
    }

    /// Shut down the transport: close stdin, wait out the grace period, then kill.
    pub async fn shutdown(self, grace: Duration) {
        // Dropping the only writer sends EOF to the child's stdin
        drop(self.write_tx);
        self.reader_handle.abort();
        let _ = self.reader_handle.await;
        if tokio::time::timeout(grace, self.writer_handle).await.is_err() {
            tracing::debug!("Writer for '{}' still blocked at shutdown", self.command);
        }

        let mut child = self.child.into_inner();
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Tool server '{}' exited: {status}", self.command);
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed waiting for tool server '{}': {e}", self.command);
            }
            Err(_) => {
                tracing::warn!(
                    "Tool server '{}' did not exit within {}ms, killing it",
                    self.command,
                    grace.as_millis()
                );
                let _ = child.kill().await;
            }
        }
    }
}
