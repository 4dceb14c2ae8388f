use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::PathBuf};

use common::crypto::CipherMode;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "flowgate";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEYS_DIR_NAME: &str = "keys";
pub const LOGS_DIR_NAME: &str = "logs";
/// Overrides `app_secret` from the config file
pub const APP_SECRET_ENV: &str = "FLOWGATE_APP_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the flow endpoint server
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Write a daily-rolling log file under the app directory as well as stdout
    #[serde(default)]
    pub log_to_file: bool,
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Shared secret for request signatures, applied to every flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    /// Must be set before any flow may use `legacy-aes-256-cbc`
    #[serde(default)]
    pub allow_legacy_cipher: bool,
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
}

fn default_listen_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_handler_timeout_secs() -> u64 {
    service::config::DEFAULT_HANDLER_TIMEOUT.as_secs()
}

fn default_max_body_bytes() -> usize {
    service::config::DEFAULT_MAX_BODY_BYTES
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            log_level: default_log_level(),
            log_to_file: false,
            handler_timeout_secs: default_handler_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            app_secret: None,
            allow_legacy_cipher: false,
            flows: Vec::new(),
        }
    }
}

/// One served flow. Its key pair lives at `keys/<id>.pem`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    pub id: String,
    #[serde(default)]
    pub cipher: CipherMode,
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

/// A handler answered from configuration alone.
///
/// Either navigates to `screen` with fixed `data`, or closes the flow with the
/// submitted data as the close params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Action or screen this handler answers
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Copy the request's flow token into the reply data as `flow_token`
    #[serde(default)]
    pub echo_flow_token: bool,
    #[serde(default)]
    pub close: bool,
}

impl AppConfig {
    /// Reject configurations that would only fail once traffic arrives
    pub fn validate(&self) -> Result<(), StateError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))?;

        let mut seen = HashSet::new();
        for flow in &self.flows {
            if !seen.insert(flow.id.as_str()) {
                return Err(StateError::DuplicateFlow(flow.id.clone()));
            }
            if flow.cipher == CipherMode::LegacyAesCbc && !self.allow_legacy_cipher {
                return Err(StateError::LegacyCipherNotAllowed(flow.id.clone()));
            }
            for handler in &flow.handlers {
                let reason = match (handler.screen.is_some(), handler.close) {
                    (true, true) => Some("set either `screen` or `close`, not both"),
                    (false, false) => Some("one of `screen` or `close` is required"),
                    _ => None,
                };
                if let Some(reason) = reason {
                    return Err(StateError::InvalidHandler {
                        flow: flow.id.clone(),
                        key: handler.key.clone(),
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn flow(&self, id: &str) -> Option<&FlowConfig> {
        self.flows.iter().find(|flow| flow.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the app directory (~/.flowgate)
    pub app_dir: PathBuf,
    /// Path to the directory of `<flow>.pem` private keys
    pub keys_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the app directory path (custom or default ~/.flowgate)
    pub fn app_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new app directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if app_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        config.validate()?;

        fs::create_dir_all(&app_dir)?;

        let keys_dir = app_dir.join(KEYS_DIR_NAME);
        fs::create_dir_all(&keys_dir)?;

        let config_path = app_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            app_dir,
            keys_dir,
            config_path,
            config,
        })
    }

    /// Load and validate existing state from the app directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if !app_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let keys_dir = app_dir.join(KEYS_DIR_NAME);
        let config_path = app_dir.join(CONFIG_FILE_NAME);

        if !keys_dir.exists() {
            return Err(StateError::MissingFile(format!("{}/", KEYS_DIR_NAME)));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;
        config.validate()?;

        Ok(Self {
            app_dir,
            keys_dir,
            config_path,
            config,
        })
    }

    /// Runtime server configuration derived from the app config
    pub fn service_config(&self) -> Result<service::Config, StateError> {
        let log_level = tracing::Level::from_str(&self.config.log_level)
            .map_err(|_| StateError::InvalidLogLevel(self.config.log_level.clone()))?;

        Ok(service::Config {
            listen_addr: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                self.config.listen_port,
            ),
            max_body_bytes: self.config.max_body_bytes,
            handler_timeout: Duration::from_secs(self.config.handler_timeout_secs),
            log_level,
            log_dir: self
                .config
                .log_to_file
                .then(|| self.app_dir.join(LOGS_DIR_NAME)),
        })
    }

    /// The signing secret, with the environment taking precedence over the file
    pub fn app_secret(&self) -> Option<String> {
        resolve_app_secret(
            std::env::var(APP_SECRET_ENV).ok(),
            self.config.app_secret.as_deref(),
        )
    }
}

fn resolve_app_secret(from_env: Option<String>, from_file: Option<&str>) -> Option<String> {
    from_env
        .filter(|secret| !secret.is_empty())
        .or_else(|| from_file.map(str::to_string))
        .filter(|secret| !secret.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine home directory")]
    NoHomeDirectory,

    #[error("flowgate directory already initialized")]
    AlreadyInitialized,

    #[error("flowgate directory not initialized, run `flowgate init` first")]
    NotInitialized,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("flow '{0}' is declared more than once")]
    DuplicateFlow(String),

    #[error("flow '{0}' uses legacy-aes-256-cbc but allow_legacy_cipher is not set")]
    LegacyCipherNotAllowed(String),

    #[error("handler '{key}' in flow '{flow}': {reason}")]
    InvalidHandler {
        flow: String,
        key: String,
        reason: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),
}
