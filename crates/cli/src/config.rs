use agent::{DEFAULT_SYSTEM_PROMPT, RetentionBudget, SessionConfig};
use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tools::Viewport;
use tracing::{debug, warn};

const CONFIG_FILE_NAME: &str = "browserpilot.toml";

/// Environment variables applied on top of the config file.
pub const ENV_OVERRIDES: [&str; 6] = [
    "ANTHROPIC_API_KEY",
    "BROWSERPILOT_MODEL",
    "STEEL_API_KEY",
    "WEBSOCKET_URL",
    "API_URL",
    "BROWSERPILOT_PORT",
];

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Model and prompt settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Hosted browser connection and action timing.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Screenshot retention budget.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    /// Anthropic API key (or OAuth token). `ANTHROPIC_API_KEY` overrides it.
    pub api_key: String,
    /// Explicit Messages API base URL.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
    /// Tool-dispatching rounds per session; unbounded when unset.
    pub max_rounds: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_key: String::new(),
            base_url: None,
            max_tokens: 4096,
            temperature: 1.0,
            system_prompt: None,
            max_rounds: None,
        }
    }
}

/// Hosted browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// CDP WebSocket endpoint of the browser host.
    pub websocket_url: String,
    /// Session API of the browser host.
    pub api_url: String,
    pub api_key: String,
    /// Wait between an action and its screenshot.
    pub settle_delay_ms: u64,
    pub navigation_timeout_secs: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Screen size advertised to the model by the computer tool.
    pub display_width: u32,
    pub display_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            websocket_url: "ws://connect.steel.dev".to_string(),
            api_url: "https://api.steel.dev".to_string(),
            api_key: String::new(),
            settle_delay_ms: 1000,
            navigation_timeout_secs: 30,
            viewport_width: 1280,
            viewport_height: 800,
            display_width: 1366,
            display_height: 768,
        }
    }
}

impl BrowserConfig {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.viewport_width,
            height: self.viewport_height,
        }
    }
}

/// Screenshot retention: keep this many, remove in batches of `granularity`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub keep: usize,
    pub granularity: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let budget = RetentionBudget::default();
        Self {
            keep: budget.keep,
            granularity: budget.granularity,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Lifetime requested for new hosted browser sessions.
    pub session_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            session_timeout_ms: 900_000,
        }
    }
}

impl ServerConfig {
    /// Parses `host:port` into a bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                field: "server.host".to_string(),
                reason: e.to_string(),
            })
    }
}

impl Config {
    /// Load config from an explicit path, `./browserpilot.toml`, or
    /// `~/.browserpilot/config.toml`, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            let cwd = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
            if cwd.exists() {
                return Some(cwd);
            }
            let home_config = home_dir()?.join(".browserpilot").join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        config.apply_env();
        config.validate()?;

        debug!(
            model = %config.agent.model,
            api_url = %config.browser.api_url,
            port = config.server.port,
            "Config loaded"
        );
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.agent.api_key = key;
        }
        if let Ok(model) = std::env::var("BROWSERPILOT_MODEL")
            && !model.trim().is_empty()
        {
            self.agent.model = model;
        }
        if let Ok(key) = std::env::var("STEEL_API_KEY") {
            self.browser.api_key = key;
        }
        if let Ok(url) = std::env::var("WEBSOCKET_URL") {
            self.browser.websocket_url = url;
        }
        if let Ok(url) = std::env::var("API_URL") {
            self.browser.api_url = url;
        }
        if let Ok(port) = std::env::var("BROWSERPILOT_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid BROWSERPILOT_PORT"),
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.model.trim().is_empty() {
            return Err(ConfigError::MissingField("agent.model".to_string()));
        }
        if !(0.0..=1.0).contains(&self.agent.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "agent.temperature".to_string(),
                reason: format!("{} is outside 0..=1", self.agent.temperature),
            });
        }
        if self.agent.max_rounds == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_rounds".to_string(),
                reason: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }

    /// Default per-session settings derived from the config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            system_prompt: self
                .agent
                .system_prompt
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: self.agent.temperature,
            retention: RetentionBudget {
                keep: self.retention.keep,
                granularity: self.retention.granularity,
            },
            settle_delay: Duration::from_millis(self.browser.settle_delay_ms),
            api_key: None,
            max_rounds: self.agent.max_rounds,
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.navigation_timeout_secs)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScopedEnv, with_locked_env};

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write config");
    }

    fn scoped_env() -> ScopedEnv {
        let mut keys = ENV_OVERRIDES.to_vec();
        keys.push("HOME");
        ScopedEnv::cleared(&keys)
    }

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.agent.model, "claude-3-5-sonnet-20241022");
        assert_eq!(cfg.agent.max_tokens, 4096);
        assert_eq!(cfg.agent.max_rounds, None);
        assert_eq!(cfg.browser.websocket_url, "ws://connect.steel.dev");
        assert_eq!(cfg.browser.api_url, "https://api.steel.dev");
        assert_eq!(cfg.browser.settle_delay_ms, 1000);
        assert_eq!(cfg.browser.viewport(), Viewport::default());
        assert_eq!(cfg.retention.keep, 10);
        assert_eq!(cfg.retention.granularity, 10);
        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.server.session_timeout_ms, 900_000);
    }

    #[test]
    fn load_reads_file_sections() {
        with_locked_env(|| {
            let _env = scoped_env();
            let tmp = tempfile::tempdir().expect("tempdir");
            let config_path = tmp.path().join("config.toml");
            write_file(
                &config_path,
                r#"
[agent]
model = "claude-test"
temperature = 0.5
max_rounds = 12
system_prompt = "be terse"

[browser]
settle_delay_ms = 250
viewport_width = 1024

[retention]
keep = 4
granularity = 2

[server]
host = "127.0.0.1"
port = 8080
"#,
            );

            let cfg = Config::load(Some(&config_path)).expect("config should parse");
            assert_eq!(cfg.agent.model, "claude-test");
            assert_eq!(cfg.agent.max_tokens, 4096);
            assert_eq!(cfg.browser.viewport_width, 1024);
            assert_eq!(cfg.browser.viewport_height, 800);
            assert_eq!(
                cfg.server.socket_addr().expect("addr"),
                "127.0.0.1:8080".parse::<SocketAddr>().expect("addr")
            );

            let session = cfg.session_config();
            assert_eq!(session.system_prompt, "be terse");
            assert_eq!(session.temperature, 0.5);
            assert_eq!(session.settle_delay, Duration::from_millis(250));
            assert_eq!(
                session.retention,
                RetentionBudget {
                    keep: 4,
                    granularity: 2
                }
            );
            assert_eq!(session.max_rounds, Some(12));
        });
    }

    #[test]
    fn env_overrides_win_over_file() {
        with_locked_env(|| {
            let env = scoped_env();
            let tmp = tempfile::tempdir().expect("tempdir");
            let config_path = tmp.path().join("config.toml");
            write_file(
                &config_path,
                r#"
[agent]
api_key = "from_file"

[browser]
api_key = "steel_file"
"#,
            );
            env.set("ANTHROPIC_API_KEY", "from_env");
            env.set("STEEL_API_KEY", "steel_env");
            env.set("WEBSOCKET_URL", "ws://localhost:9222");
            env.set("API_URL", "http://localhost:3000");
            env.set("BROWSERPILOT_MODEL", "claude-env");
            env.set("BROWSERPILOT_PORT", "4000");

            let cfg = Config::load(Some(&config_path)).expect("config");

            assert_eq!(cfg.agent.api_key, "from_env");
            assert_eq!(cfg.agent.model, "claude-env");
            assert_eq!(cfg.browser.api_key, "steel_env");
            assert_eq!(cfg.browser.websocket_url, "ws://localhost:9222");
            assert_eq!(cfg.browser.api_url, "http://localhost:3000");
            assert_eq!(cfg.server.port, 4000);
        });
    }

    #[test]
    fn invalid_port_env_is_ignored() {
        with_locked_env(|| {
            let env = scoped_env();
            let tmp = tempfile::tempdir().expect("tempdir");
            let config_path = tmp.path().join("config.toml");
            write_file(&config_path, "");
            env.set("BROWSERPILOT_PORT", "not-a-port");

            let cfg = Config::load(Some(&config_path)).expect("config");
            assert_eq!(cfg.server.port, 3001);
        });
    }

    #[test]
    fn home_config_is_used_when_no_path_given() {
        with_locked_env(|| {
            let env = scoped_env();
            let original_cwd = std::env::current_dir().expect("cwd");
            let home = tempfile::tempdir().expect("home");
            let cwd = tempfile::tempdir().expect("cwd");
            write_file(
                &home.path().join(".browserpilot").join("config.toml"),
                "[server]\nport = 5555\n",
            );
            env.set("HOME", &home.path().to_string_lossy());
            std::env::set_current_dir(cwd.path()).expect("chdir");

            let cfg = Config::load(None);

            std::env::set_current_dir(original_cwd).expect("restore cwd");
            assert_eq!(cfg.expect("config").server.port, 5555);
        });
    }

    #[test]
    fn malformed_toml_is_error() {
        with_locked_env(|| {
            let _env = scoped_env();
            let tmp = tempfile::tempdir().expect("tempdir");
            let config_path = tmp.path().join("config.toml");
            write_file(&config_path, "[agent\nmodel = ");
            let err = Config::load(Some(&config_path)).expect_err("bad toml");
            assert!(matches!(err, ConfigError::Toml(_)));
        });
    }

    #[test]
    fn missing_file_is_io_error() {
        with_locked_env(|| {
            let _env = scoped_env();
            let err = Config::load(Some(Path::new("/nonexistent/browserpilot.toml")))
                .expect_err("missing");
            assert!(matches!(err, ConfigError::Io(_)));
        });
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut cfg = Config::default();
        cfg.agent.temperature = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "agent.temperature"
        ));

        let mut cfg = Config::default();
        cfg.agent.max_rounds = Some(0);
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.agent.model = " ".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn empty_system_prompt_falls_back_to_builtin() {
        let mut cfg = Config::default();
        cfg.agent.system_prompt = Some(String::new());
        assert_eq!(cfg.session_config().system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn bad_host_is_invalid_value() {
        let server = ServerConfig {
            host: "not a host".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            server.socket_addr(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
