//! MCP (Model-Context-Protocol) client pool.
//!
//! An MCP server is an out-of-process provider of typed tools (filesystem,
//! desktop, system metrics) reached over some RPC transport. This module
//! specifies only the port (initialize / execute_tool / health_check) per
//! spec.md §6 — concrete transports (WebSocket, stdio) are external
//! collaborators. The pool owns a named set of clients, tracks per-client
//! health, and reconnects on transport loss with the same exponential
//! backoff the retry manager uses elsewhere.

use crate::retry::{RetryConfig, RetryManager, RetryStrategy};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Implemented by every concrete MCP transport the pool can hold.
///
/// `execute_tool` is deliberately untyped (`serde_json::Value` in, `Value`
/// out) since the tool catalogue of a given server is not known at compile
/// time — it's an external collaborator per spec.md §1.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    async fn execute_tool(&self, tool_name: &str, params: serde_json::Value) -> Result<serde_json::Value>;

    async fn health_check(&self) -> bool;

    async fn shutdown(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientHealth {
    Healthy,
    Unhealthy,
}

struct Registered {
    client: Arc<dyn McpClient>,
    health: parking_lot::Mutex<ClientHealth>,
}

/// Owns a named map of [`McpClient`]s, wraps every tool call through the
/// [`RetryManager`] under `op_key = "mcp.<client>.<tool>"`, and tracks
/// per-client health independently of the retry manager's circuit breaker
/// (a client can be marked unhealthy by a failed `health_check` even if no
/// tool call has tripped its breaker yet).
pub struct McpClientPool {
    clients: DashMap<String, Registered>,
    retry: RetryManager,
}

impl Default for McpClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl McpClientPool {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            retry: RetryManager::new(
                RetryConfig::new()
                    .with_strategy(RetryStrategy::Exponential)
                    .with_max_attempts(3)
                    .with_base_delay(Duration::from_millis(500)),
            ),
        }
    }

    /// Register a client under `name` and run its `initialize`. The client
    /// starts marked healthy; a failed `initialize` registers it anyway but
    /// marks it unhealthy immediately, matching the pool's "degrade, don't
    /// panic" posture for a server that's down at startup.
    pub async fn register(&self, name: impl Into<String>, client: Arc<dyn McpClient>) {
        let name = name.into();
        let health = match client.initialize().await {
            Ok(()) => ClientHealth::Healthy,
            Err(err) => {
                tracing::warn!(client = %name, error = %err, "mcp client failed to initialize");
                ClientHealth::Unhealthy
            }
        };
        self.clients.insert(
            name,
            Registered {
                client,
                health: parking_lot::Mutex::new(health),
            },
        );
    }

    /// Invoke `tool_name` on the named client, retrying transient failures
    /// under `op_key = "mcp.<name>.<tool_name>"`. Calls against an unhealthy
    /// client fail fast without burning a retry budget, per spec.md §4.C
    /// ("tool calls while unhealthy fail fast").
    pub async fn execute_tool(
        &self,
        client_name: &str,
        tool_name: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let entry = self
            .clients
            .get(client_name)
            .ok_or_else(|| Error::other(format!("no MCP client registered: {client_name}")))?;

        if *entry.health.lock() == ClientHealth::Unhealthy {
            return Err(Error::other(format!(
                "mcp client {client_name} is unhealthy"
            )));
        }

        let client = entry.client.clone();
        let op_key = format!("mcp.{client_name}.{tool_name}");
        drop(entry);

        let params_clone = params.clone();
        let result = self
            .retry
            .execute_with_retry(&op_key, move || {
                let client = client.clone();
                let params = params_clone.clone();
                let tool_name = tool_name.to_string();
                async move { client.execute_tool(&tool_name, params).await }
            })
            .await;

        if result.is_err() {
            if let Some(entry) = self.clients.get(client_name) {
                *entry.health.lock() = ClientHealth::Unhealthy;
            }
        }

        result
    }

    /// Run `health_check` against every registered client and update its
    /// tracked health; returns a `(name, healthy)` snapshot for the whole
    /// pool.
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            if let Some(entry) = self.clients.get(&name) {
                let client = entry.client.clone();
                drop(entry);
                let healthy = client.health_check().await;
                if let Some(entry) = self.clients.get(&name) {
                    *entry.health.lock() = if healthy {
                        ClientHealth::Healthy
                    } else {
                        ClientHealth::Unhealthy
                    };
                }
                results.push((name, healthy));
            }
        }
        results
    }

    /// Attempt to reconnect (re-`initialize`) every unhealthy client.
    /// Intended to be called periodically by a background loop; individual
    /// failures are logged, not propagated.
    pub async fn reconnect_unhealthy(&self) {
        let unhealthy: Vec<String> = self
            .clients
            .iter()
            .filter(|e| *e.health.lock() == ClientHealth::Unhealthy)
            .map(|e| e.key().clone())
            .collect();

        for name in unhealthy {
            if let Some(entry) = self.clients.get(&name) {
                let client = entry.client.clone();
                drop(entry);
                match client.initialize().await {
                    Ok(()) => {
                        if let Some(entry) = self.clients.get(&name) {
                            *entry.health.lock() = ClientHealth::Healthy;
                        }
                        tracing::info!(client = %name, "mcp client reconnected");
                    }
                    Err(err) => {
                        tracing::debug!(client = %name, error = %err, "mcp client reconnect failed");
                    }
                }
            }
        }
    }

    pub fn client_names(&self) -> Vec<String> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn shutdown(&self) {
        for entry in self.clients.iter() {
            if let Err(err) = entry.client.shutdown().await {
                tracing::warn!(client = %entry.key(), error = %err, "mcp client shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubClient {
        calls: Arc<AtomicUsize>,
        fail: bool,
        healthy: bool,
    }

    #[async_trait]
    impl McpClient for StubClient {
        async fn initialize(&self) -> Result<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(Error::other("init failed"))
            }
        }

        async fn execute_tool(&self, tool_name: &str, _params: serde_json::Value) -> Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::other("tool failed"))
            } else {
                Ok(serde_json::json!({"tool": tool_name, "ok": true}))
            }
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn execute_tool_dispatches_to_named_client() {
        let pool = McpClientPool::new();
        let calls = Arc::new(AtomicUsize::new(0));
        pool.register(
            "filesystem",
            Arc::new(StubClient {
                calls: calls.clone(),
                fail: false,
                healthy: true,
            }),
        )
        .await;

        let result = pool
            .execute_tool("filesystem", "read_file", serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();

        assert_eq!(result["tool"], "read_file");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_client_errors_without_calling_anything() {
        let pool = McpClientPool::new();
        let result = pool.execute_tool("nope", "read_file", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_tool_call_marks_client_unhealthy() {
        let pool = McpClientPool::new();
        pool.register(
            "flaky",
            Arc::new(StubClient {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: true,
                healthy: true,
            }),
        )
        .await;

        let _ = pool.execute_tool("flaky", "read_file", serde_json::json!({})).await;
        let result = pool.execute_tool("flaky", "read_file", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn health_check_reports_per_client_status() {
        let pool = McpClientPool::new();
        pool.register(
            "good",
            Arc::new(StubClient {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
                healthy: true,
            }),
        )
        .await;

        let statuses = pool.health_check().await;
        assert_eq!(statuses, vec![("good".to_string(), true)]);
    }

    #[tokio::test]
    async fn unhealthy_client_registered_from_failed_initialize() {
        let pool = McpClientPool::new();
        pool.register(
            "down",
            Arc::new(StubClient {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
                healthy: false,
            }),
        )
        .await;

        let result = pool.execute_tool("down", "anything", serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
