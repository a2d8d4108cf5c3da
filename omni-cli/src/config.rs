//! Client configuration.

use std::path::Path;
use std::time::Duration;

use omni_core::{SessionConfig, TerminalOptions};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the `omni` client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server endpoint and credential.
    pub server: ServerConfig,
    /// File transfer settings.
    pub transfer: TransferConfig,
    /// Remote shell settings.
    pub terminal: TerminalConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the console, e.g. `https://console.example/`.
    pub base_url: String,
    /// API key sent with every connection.
    pub api_key: String,
}

/// File transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Per-request deadline in milliseconds. 0 waits forever.
    pub timeout_ms: u64,
    /// Re-download and hash-compare after every upload.
    pub verify: bool,
}

/// Remote shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub cmd: String,
    pub args: Vec<String>,
    /// `KEY=VALUE` entries.
    pub env: Vec<String>,
    pub inherit_env: bool,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level filter used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            api_key: String::new(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            verify: false,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            cmd: "sh".into(),
            args: Vec::new(),
            env: Vec::new(),
            inherit_env: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Default configuration as pretty TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Per-request deadline, or `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.transfer.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn session_config(&self, agent_name: &str, agent_id: Option<u64>) -> SessionConfig {
        let config = SessionConfig::new(&self.server.base_url, agent_name, &self.server.api_key);
        match agent_id {
            Some(id) => config.with_agent_id(id),
            None => config,
        }
    }

    pub fn terminal_options(&self) -> TerminalOptions {
        TerminalOptions {
            cmd: self.terminal.cmd.clone(),
            args: self.terminal.args.clone(),
            env: self.terminal.env.clone(),
            inherit_env: self.terminal.inherit_env,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = ClientConfig::default_toml().unwrap();
        assert!(text.contains("base_url"));
        assert!(text.contains("timeout_ms"));
        assert!(text.contains("inherit_env"));
    }

    #[test]
    fn roundtrip_config() {
        let text = ClientConfig::default_toml().unwrap();
        let parsed = ClientConfig::parse(&text).unwrap();
        assert_eq!(parsed.server.base_url, "http://127.0.0.1:8080");
        assert_eq!(parsed.transfer.timeout_ms, 30_000);
        assert_eq!(parsed.terminal.cmd, "sh");
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed = ClientConfig::parse(
            r#"
            [server]
            api_key = "abc"

            [terminal]
            cmd = "bash"
            env = ["TERM=xterm"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.base_url, "http://127.0.0.1:8080");
        assert_eq!(parsed.server.api_key, "abc");

        let options = parsed.terminal_options();
        assert_eq!(options.cmd, "bash");
        assert_eq!(options.env, vec!["TERM=xterm".to_string()]);
        assert!(options.inherit_env);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let mut config = ClientConfig::default();
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        config.transfer.timeout_ms = 0;
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn session_config_carries_credentials() {
        let mut config = ClientConfig::default();
        config.server.api_key = "k".into();
        let session = config.session_config("build-01", Some(3));
        assert_eq!(
            session.url().unwrap().as_str(),
            "ws://127.0.0.1:8080/api/agent/build-01/omni/?api_key=k&agent_id=3"
        );
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("omni.toml");
        std::fs::write(&path, "[transfer]\ntimeout_ms = \"soon\"").unwrap();
        assert_eq!(ClientConfig::load(&path).transfer.timeout_ms, 30_000);
        assert_eq!(
            ClientConfig::load(&dir.path().join("missing.toml")).logging.level,
            "info"
        );
    }
}
