//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend base URL, endpoint path templates, refresh
//! timing and the last used login email.
//!
//! Configuration is stored at `~/.config/devcmd/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "devcmd";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "DEVCMD_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Access tokens live five minutes on the backend; refresh a minute early.
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 240;

/// Endpoint path templates, relative to `api_base_url`.
///
/// `{id}` and `{name}` are replaced with the percent-encoded argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPaths {
    pub login: String,
    pub register: String,
    pub me: String,
    pub refresh: String,
    pub devices: String,
    pub all_devices: String,
    pub device_capabilities: String,
    pub device_commands: String,
    pub action_parameters: String,
    pub execute_command: String,
    pub command_status: String,
    pub commands: String,
    pub generate_token: String,
    pub tokens: String,
    pub server_key: String,
    pub reconnect_device: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            login: "/api/login/".to_string(),
            register: "/api/register/".to_string(),
            me: "/api/me/".to_string(),
            refresh: "/api/refresh/".to_string(),
            devices: "/api/devices".to_string(),
            all_devices: "/api/devices/all".to_string(),
            device_capabilities: "/api/devices/{id}/capabilities".to_string(),
            device_commands: "/api/devices/{id}/commands".to_string(),
            action_parameters: "/api/actions/{name}/parameters".to_string(),
            execute_command: "/api/execute-command".to_string(),
            command_status: "/api/commands/{id}".to_string(),
            commands: "/api/commands".to_string(),
            generate_token: "/api/admin/generate-token".to_string(),
            tokens: "/api/admin/tokens".to_string(),
            server_key: "/api/server-key".to_string(),
            reconnect_device: "/api/reconnect-device".to_string(),
        }
    }
}

/// Which set of endpoint paths the backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiLayout {
    #[default]
    Standard,
    /// `/commands/{id}/status`, `/commands/all`, `/tokens/generate` and
    /// `/tokens/active`.
    Alternative,
}

impl ApiLayout {
    pub fn paths(self) -> ApiPaths {
        match self {
            ApiLayout::Standard => ApiPaths::default(),
            ApiLayout::Alternative => ApiPaths::alternative(),
        }
    }
}

impl ApiPaths {
    pub fn alternative() -> Self {
        Self {
            command_status: "/api/commands/{id}/status".to_string(),
            commands: "/api/commands/all".to_string(),
            generate_token: "/api/tokens/generate".to_string(),
            tokens: "/api/tokens/active".to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub last_email: Option<String>,
    pub log_file: Option<PathBuf>,
    pub layout: ApiLayout,
    /// Explicit templates; replaces `layout` when present. Keys left out
    /// take the standard defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<ApiPaths>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            last_email: None,
            log_file: None,
            layout: ApiLayout::default(),
            paths: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }

    /// Endpoint templates in effect.
    pub fn api_paths(&self) -> ApiPaths {
        match self.paths {
            Some(ref paths) => paths.clone(),
            None => self.layout.paths(),
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the durable session file.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
