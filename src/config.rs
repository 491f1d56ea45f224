use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";
const CONFIG_FILE: &str = ".patch-pilot.toml";
const API_BASE_ENV: &str = "PATCH_PILOT_API_BASE_URL";
const TOKEN_ENV: &str = "PATCH_PILOT_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file: {0}")]
    FileWrite(std::io::Error),
}

/// Top-level configuration loaded from .patch-pilot.toml.
/// All fields are optional, the client works against a local backend with zero config.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Backend connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Completion polling settings
    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the REST API, e.g. https://pilot.example.com/api.
    /// Falls back to PATCH_PILOT_API_BASE_URL, then DEFAULT_API_BASE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Bearer token sent with every request. Falls back to PATCH_PILOT_TOKEN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PollConfig {
    /// How long to wait for a run to reach a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Delay between run lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

impl Config {
    /// Load configuration from .patch-pilot.toml in the current directory.
    /// Returns default config if the file doesn't exist, then applies
    /// environment overrides.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path without consulting the environment.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn default_path() -> &'static Path {
        Path::new(CONFIG_FILE)
    }

    /// Store a login token in the config file at `path`, keeping its other
    /// settings. Creates the file when missing.
    pub fn save_token(path: &Path, token: &str) -> Result<(), ConfigError> {
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };
        config.api.token = Some(token.to_string());
        let contents = toml::to_string_pretty(&config)?;
        fs::write(path, contents).map_err(ConfigError::FileWrite)?;
        Ok(())
    }

    /// Environment variables win over file values.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(API_BASE_ENV).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = Some(base_url);
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.api.token = Some(token);
        }
    }

    pub fn api_base(&self) -> &str {
        self.api.base_url.as_deref().unwrap_or(DEFAULT_API_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api.token.is_none());
        assert!(config.poll.timeout_secs.is_none());
        assert_eq!(config.api_base(), DEFAULT_API_BASE);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[api]
base_url = "https://pilot.example.com/api"
token = "abc"
request_timeout_secs = 10

[poll]
timeout_secs = 120
interval_ms = 500
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_base(), "https://pilot.example.com/api");
        assert_eq!(config.api.token.as_deref(), Some("abc"));
        assert_eq!(config.api.request_timeout_secs, Some(10));
        assert_eq!(config.poll.timeout_secs, Some(120));
        assert_eq!(config.poll.interval_ms, Some(500));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config: Config = toml::from_str("[api]\nbase_url = \"http://file\"\ntoken = \"file-token\"\n").unwrap();
        config.apply_env(|key| match key {
            API_BASE_ENV => Some("http://env".to_string()),
            TOKEN_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base(), "http://env");
        // blank env values are ignored
        assert_eq!(config.api.token.as_deref(), Some("file-token"));
    }

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("patch_pilot_{}_{}.toml", name, std::process::id()))
    }

    #[test]
    fn test_load_from_file() {
        let path = scratch_path("config");
        std::fs::write(&path, "[poll]\ninterval_ms = 250\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.poll.interval_ms, Some(250));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_rejects_bad_toml() {
        let path = scratch_path("bad_config");
        std::fs::write(&path, "[poll\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_token_keeps_other_settings() {
        let path = scratch_path("save_token");
        std::fs::write(&path, "[api]\nbase_url = \"http://pilot/api\"\n[poll]\ninterval_ms = 250\n").unwrap();
        Config::save_token(&path, "jwt-abc").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api.token.as_deref(), Some("jwt-abc"));
        assert_eq!(config.api_base(), "http://pilot/api");
        assert_eq!(config.poll.interval_ms, Some(250));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_token_creates_file() {
        let path = scratch_path("new_token");
        std::fs::remove_file(&path).ok();
        Config::save_token(&path, "jwt-new").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("token = \"jwt-new\""));
        assert!(!contents.contains("base_url"));
        std::fs::remove_file(&path).ok();
    }
}
