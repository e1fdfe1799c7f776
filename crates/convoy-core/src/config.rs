//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Convoy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp: Option<McpConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Allow cross-origin requests from browser clients (default: true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name reported in `agent_update` frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

/// A single MCP tool server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for persisted run state. Defaults to `~/.convoy/state`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Substitute `${ENV_VAR}` references in a raw config string.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

/// Resolve the Convoy data directory (`~/.convoy`, overridable via `CONVOY_HOME`).
pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("CONVOY_HOME") {
        return PathBuf::from(home);
    }
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(".convoy"))
        .unwrap_or_else(|_| PathBuf::from(".convoy"))
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::ConvoyError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::ConvoyError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().and_then(|g| g.port).unwrap_or(8787)
    }

    pub fn cors_enabled(&self) -> bool {
        self.gateway.as_ref().and_then(|g| g.cors).unwrap_or(true)
    }

    pub fn agent_name(&self) -> String {
        self.agent
            .as_ref()
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| "Basic Agent".to_string())
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .as_ref()
            .and_then(|s| s.path.clone())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir().join("state"))
    }

    /// Enabled MCP server endpoints.
    pub fn mcp_servers(&self) -> Vec<McpServerConfig> {
        self.mcp
            .as_ref()
            .map(|m| m.servers.iter().filter(|s| s.enabled).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let config = Config::load(Path::new("/nonexistent/convoy.json")).unwrap();
        assert_eq!(config.gateway_port(), 8787);
        assert_eq!(config.agent_name(), "Basic Agent");
        assert!(config.mcp_servers().is_empty());
    }

    #[test]
    fn test_parse_json5() {
        let json_str = r#"{
            // gateway section
            gateway: { port: 9000, bind: "127.0.0.1" },
            mcp: { servers: [{ name: "python", url: "http://127.0.0.1:8000" }] },
        }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        assert_eq!(config.gateway_port(), 9000);
        assert_eq!(config.gateway_bind(), "127.0.0.1");
        let servers = config.mcp_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "python");
    }

    #[test]
    fn test_env_substitution() {
        unsafe { std::env::set_var("CONVOY_TEST_PORT", "9999") };
        let raw = r#"{ gateway: { port: ${CONVOY_TEST_PORT} } }"#;
        let substituted = substitute_env_vars(raw);
        let config: Config = json5::from_str(&substituted).unwrap();
        assert_eq!(config.gateway_port(), 9999);
    }

    #[test]
    fn test_disabled_server_excluded() {
        let json_str = r#"{
            mcp: { servers: [
                { name: "a", url: "http://a" },
                { name: "b", url: "http://b", enabled: false },
            ] }
        }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let servers = config.mcp_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "a");
    }
}
