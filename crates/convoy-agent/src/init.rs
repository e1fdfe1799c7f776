//! Agent construction: tool discovery and partial-degradation connect.
//!
//! MCP tool servers are connected in parallel at startup. A server
//! that fails to connect is logged and excluded from the active set;
//! the agent always comes up with at least its base tools. The
//! constructed tool set is handed to an injected runtime factory —
//! the runtime itself is external.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use convoy_core::config::Config;

use crate::AgentRuntime;

/// A callable tool as advertised to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// A source of tools reachable over some transport.
#[async_trait::async_trait]
pub trait ToolBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Connect and list the backend's tools.
    async fn connect(&self) -> anyhow::Result<Vec<ToolDefinition>>;
}

/// MCP server reached over HTTP: a `tools/list` JSON-RPC call.
pub struct McpToolBackend {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl McpToolBackend {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl ToolBackend for McpToolBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> anyhow::Result<Vec<ToolDefinition>> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/list",
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let tools = body
            .get("result")
            .and_then(|r| r.get("tools"))
            .and_then(|t| t.as_array())
            .ok_or_else(|| anyhow::anyhow!("malformed tools/list response from {}", self.name))?;

        tools
            .iter()
            .map(|t| serde_json::from_value(t.clone()).map_err(Into::into))
            .collect()
    }
}

/// Builds the external runtime from the discovered tool set.
pub type RuntimeFactory =
    Arc<dyn Fn(Vec<ToolDefinition>) -> Arc<dyn AgentRuntime> + Send + Sync>;

/// The fully initialized agent: runtime plus its tool set.
#[derive(Clone)]
pub struct AgentService {
    pub runtime: Arc<dyn AgentRuntime>,
    pub tools: Vec<ToolDefinition>,
    /// Backends that failed to connect (excluded from the active set).
    pub failed_backends: Vec<String>,
}

impl AgentService {
    /// Connect configured MCP backends (in parallel), merge base tools
    /// with whatever the reachable backends advertise, and build the
    /// runtime. Never fails on backend unreachability alone.
    pub async fn initialize(
        config: &Config,
        base_tools: Vec<ToolDefinition>,
        factory: &RuntimeFactory,
    ) -> AgentService {
        let backends: Vec<McpToolBackend> = config
            .mcp_servers()
            .into_iter()
            .map(|s| McpToolBackend::new(s.name, s.url))
            .collect();

        let mut tools = base_tools;
        let mut failed = Vec::new();

        let connects = backends.iter().map(|b| async move {
            (b.name().to_string(), b.connect().await)
        });
        for (name, result) in futures::future::join_all(connects).await {
            match result {
                Ok(mut backend_tools) => {
                    info!(server = %name, tools = backend_tools.len(), "MCP server connected");
                    tools.append(&mut backend_tools);
                }
                Err(e) => {
                    warn!(server = %name, %e, "MCP server failed to connect, continuing without it");
                    failed.push(name);
                }
            }
        }

        info!(tools = tools.len(), failed = failed.len(), "Agent initialized");
        AgentService {
            runtime: factory(tools.clone()),
            tools,
            failed_backends: failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::EchoRuntime;

    fn echo_factory() -> RuntimeFactory {
        Arc::new(|_tools| Arc::new(EchoRuntime::new("Basic Agent")) as Arc<dyn AgentRuntime>)
    }

    #[tokio::test]
    async fn test_initialize_without_backends() {
        let service = AgentService::initialize(
            &Config::default(),
            vec![ToolDefinition {
                name: "getWeather".into(),
                description: "Get the weather for a given city".into(),
                input_schema: json!({"type": "object"}),
            }],
            &echo_factory(),
        )
        .await;

        assert_eq!(service.tools.len(), 1);
        assert!(service.failed_backends.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_partial_degradation() {
        let config: Config = json5::from_str(
            r#"{ mcp: { servers: [{ name: "dead", url: "http://127.0.0.1:1/rpc" }] } }"#,
        )
        .unwrap();

        let service = AgentService::initialize(&config, vec![], &echo_factory()).await;
        assert_eq!(service.failed_backends, vec!["dead".to_string()]);
        assert!(service.tools.is_empty());
    }
}
