use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use url::Url;

pub const CONFIG_PATH_ENV: &str = "GATEWATCH_CONFIG";

const ENV_GATEWAY_URL: &str = "GATEWAY_URL";
const ENV_GATEWAY_TOKEN: &str = "GATEWAY_TOKEN";
const ENV_BACKGROUND_TOOL: &str = "GATEWAY_BACKGROUND_TOOL";
const ENV_RISK_LEVEL: &str = "GATEWATCH_RISK_LEVEL";
const ENV_RISK_NOTE: &str = "GATEWATCH_RISK_NOTE";

/// reqwest fails every request at once with a zero timeout.
const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;

/// Runtime settings, built once at startup and shared by `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// `None` is a valid state: every gateway-backed endpoint degrades to
    /// "unavailable".
    pub gateway_url: Option<Url>,
    pub gateway_token: Option<String>,
    /// Tried before the built-in process tools.
    pub background_tool: Option<String>,
    pub risk_level: Option<String>,
    pub risk_note: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub request_timeout_secs: u64,
    pub session_limit: u32,
    pub history_limit: u32,
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            gateway_token: None,
            background_tool: None,
            risk_level: None,
            risk_note: None,
            api_host: "127.0.0.1".to_string(),
            api_port: 17900,
            request_timeout_secs: 15,
            session_limit: 50,
            history_limit: 40,
            log_level: "info".to_string(),
        }
    }
}

/// On-disk shape. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    gateway_url: Option<String>,
    gateway_token: Option<String>,
    background_tool: Option<String>,
    risk_level: Option<String>,
    risk_note: Option<String>,
    api_host: Option<String>,
    api_port: Option<u16>,
    request_timeout_secs: Option<u64>,
    session_limit: Option<u32>,
    history_limit: Option<u32>,
    log_level: Option<String>,
}

impl DashboardConfig {
    /// Loads the file (if any) and overlays the process environment.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| non_empty(env.get(CONFIG_PATH_ENV).cloned()).map(PathBuf::from))
            .or_else(default_config_path);

        let content = match path {
            Some(path) if explicit_path.is_some() || path.exists() => {
                info!("Loading config from {}", path.display());
                Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read config {}", path.display()))?,
                )
            }
            _ => None,
        };

        Self::from_sources(content.as_deref(), &env)
    }

    /// Defaults, then TOML `file_content`, then `env`.
    pub fn from_sources(file_content: Option<&str>, env: &HashMap<String, String>) -> Result<Self> {
        let file: ConfigFile = match file_content {
            Some(content) => toml::from_str(content).context("Invalid config file")?,
            None => ConfigFile::default(),
        };

        let mut config = Self::default();
        let mut raw_url = non_empty(file.gateway_url);
        config.gateway_token = non_empty(file.gateway_token);
        config.background_tool = non_empty(file.background_tool);
        config.risk_level = non_empty(file.risk_level);
        config.risk_note = non_empty(file.risk_note);
        if let Some(host) = non_empty(file.api_host) {
            config.api_host = host;
        }
        if let Some(port) = file.api_port {
            config.api_port = port;
        }
        if let Some(secs) = file.request_timeout_secs {
            if secs < MIN_REQUEST_TIMEOUT_SECS {
                warn!(
                    "request_timeout_secs = {} is too short, using {}",
                    secs, MIN_REQUEST_TIMEOUT_SECS
                );
            }
            config.request_timeout_secs = secs.max(MIN_REQUEST_TIMEOUT_SECS);
        }
        if let Some(limit) = file.session_limit {
            config.session_limit = limit;
        }
        if let Some(limit) = file.history_limit {
            config.history_limit = limit;
        }
        if let Some(level) = non_empty(file.log_level) {
            config.log_level = level;
        }

        let from_env = |key: &str| non_empty(env.get(key).cloned());
        if let Some(url) = from_env(ENV_GATEWAY_URL) {
            raw_url = Some(url);
        }
        if let Some(token) = from_env(ENV_GATEWAY_TOKEN) {
            config.gateway_token = Some(token);
        }
        if let Some(tool) = from_env(ENV_BACKGROUND_TOOL) {
            config.background_tool = Some(tool);
        }
        if let Some(level) = from_env(ENV_RISK_LEVEL) {
            config.risk_level = Some(level);
        }
        if let Some(note) = from_env(ENV_RISK_NOTE) {
            config.risk_note = Some(note);
        }

        config.set_gateway_url(raw_url.as_deref());
        Ok(config)
    }

    /// Unparsable values leave the gateway unconfigured.
    pub fn set_gateway_url(&mut self, raw: Option<&str>) {
        self.gateway_url = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| match Url::parse(s) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                Ok(url) => {
                    warn!("Ignoring gateway URL with unsupported scheme: {}", url.scheme());
                    None
                }
                Err(e) => {
                    warn!("Ignoring invalid gateway URL '{}': {}", s, e);
                    None
                }
            });
    }

    pub fn gateway_configured(&self) -> bool {
        self.gateway_url.is_some()
    }

    pub fn tracing_level(&self) -> Level {
        self.log_level.trim().parse().unwrap_or(Level::INFO)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gatewatch").join("config.toml"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
