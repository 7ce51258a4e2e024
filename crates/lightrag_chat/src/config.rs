//! Client config load/save for `~/.lightrag-chat/config.yaml`.
//! Sections: backend.*, page.*, auth.*.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port the LightRAG service listens on.
pub const DEFAULT_SERVICE_PORT: u16 = 9621;

/// Host used when no page host can be extracted at all.
pub const DEFAULT_FALLBACK_HOST: &str = "192.168.3.18";

/// Timeout for the non-streaming API calls (login, health, plain query).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Environment variable that overrides `backend.base_url`.
pub const BACKEND_URL_ENV: &str = "LIGHTRAG_BACKEND_URL";

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "LIGHTRAG_CHAT_CONFIG";

/// Backend section (base_url override, service_port, fallback_host, request_timeout_secs).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BackendSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Page section: the location the client is viewed from.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Auth section (token, or username/password).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuthSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Full config file.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub page: PageSection,
    #[serde(default)]
    pub auth: AuthSection,
}

impl Config {
    /// Apply `LIGHTRAG_BACKEND_URL` on top of the file value. Blank values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = Some(url);
            }
        }
        self
    }

    pub fn service_port(&self) -> u16 {
        self.backend.service_port.unwrap_or(DEFAULT_SERVICE_PORT)
    }

    pub fn fallback_host(&self) -> &str {
        self.backend
            .fallback_host
            .as_deref()
            .unwrap_or(DEFAULT_FALLBACK_HOST)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.backend
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}

/// Returns the default config file path: `~/.lightrag-chat/config.yaml` (platform-specific).
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".lightrag-chat").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Load config if the file exists, otherwise return defaults.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file missing, using defaults");
        return Ok(Config::default());
    }
    load(path)
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_missing() {
        let cfg: Config = serde_yaml::from_str("backend: {}\n").unwrap();
        assert_eq!(cfg.service_port(), 9621);
        assert_eq!(cfg.fallback_host(), "192.168.3.18");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert!(cfg.page.url.is_none());
    }

    #[test]
    fn explicit_values_win_over_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "backend:\n  service_port: 8000\n  fallback_host: 10.0.0.2\n  request_timeout_secs: 5",
        )
        .unwrap();
        assert_eq!(cfg.service_port(), 8000);
        assert_eq!(cfg.fallback_host(), "10.0.0.2");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(5));
    }
}
