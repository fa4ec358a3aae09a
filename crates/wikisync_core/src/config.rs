use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

pub const ACCESS_TOKEN_ENV: &str = "FEMIWIKI_ACCESS_TOKEN";
pub const DEFAULT_REST_URL: &str = "https://femiwiki.com/rest.php/";
pub const DEFAULT_API_URL: &str = "https://femiwiki.com/w/api.php";
pub const DEFAULT_WIKI_URL: &str = "https://femiwiki.com";
pub const DEFAULT_SITE_ID: &str = "femiwiki";
pub const DEFAULT_USER_AGENT: &str = concat!("wikisync/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// On-disk shape of `config.json`. Every key is optional.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub access_token: Option<String>,
    pub rest_url: Option<String>,
    pub api_url: Option<String>,
    pub wiki_url: Option<String>,
    pub site_id: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Fully resolved settings handed to the clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub access_token: Option<String>,
    pub rest_url: String,
    pub api_url: String,
    pub wiki_url: String,
    pub site_id: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl ClientSettings {
    /// Returns the token or fails; called at client construction.
    pub fn require_token(&self) -> SyncResult<&str> {
        self.access_token
            .as_deref()
            .ok_or(SyncError::MissingToken {
                env: ACCESS_TOKEN_ENV,
            })
    }
}

impl SyncConfig {
    /// Resolve against the process environment.
    pub fn resolve(&self) -> ClientSettings {
        self.resolve_with(|key| env::var(key).ok())
    }

    /// Token: file > env. Everything else: env > file > default.
    pub fn resolve_with<F>(&self, lookup: F) -> ClientSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| non_blank(lookup(key));
        let pick = |key: &str, file: &Option<String>, default: &str| {
            env_value(key)
                .or_else(|| non_blank(file.clone()))
                .unwrap_or_else(|| default.to_string())
        };

        let timeout_ms = env_value("WIKISYNC_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        ClientSettings {
            access_token: non_blank(self.access_token.clone())
                .or_else(|| env_value(ACCESS_TOKEN_ENV)),
            rest_url: pick("WIKISYNC_REST_URL", &self.rest_url, DEFAULT_REST_URL),
            api_url: pick("WIKISYNC_API_URL", &self.api_url, DEFAULT_API_URL),
            wiki_url: pick("WIKISYNC_WIKI_URL", &self.wiki_url, DEFAULT_WIKI_URL)
                .trim_end_matches('/')
                .to_string(),
            site_id: pick("WIKISYNC_SITE_ID", &self.site_id, DEFAULT_SITE_ID),
            user_agent: pick("WIKISYNC_USER_AGENT", &self.user_agent, DEFAULT_USER_AGENT),
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// Load a SyncConfig from JSON. Returns default if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SyncConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.json")).expect("load config");
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn load_config_parses_access_token() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.json");
        fs::write(&config_path, r#"{"access_token": "abc", "timeout_ms": 5000}"#)
            .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.access_token.as_deref(), Some("abc"));
        assert_eq!(config.timeout_ms, Some(5000));
        assert!(config.rest_url.is_none());
    }

    #[test]
    fn load_config_returns_error_for_invalid_json() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.json");
        fs::write(&config_path, "{\"access_token\": ").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn file_token_wins_over_env() {
        let config = SyncConfig {
            access_token: Some("from-file".to_string()),
            ..SyncConfig::default()
        };
        let settings = config.resolve_with(lookup(&[(ACCESS_TOKEN_ENV, "from-env")]));
        assert_eq!(settings.access_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn env_token_used_when_file_has_none() {
        let settings =
            SyncConfig::default().resolve_with(lookup(&[(ACCESS_TOKEN_ENV, " from-env ")]));
        assert_eq!(settings.access_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let config = SyncConfig {
            access_token: Some("   ".to_string()),
            ..SyncConfig::default()
        };
        let settings = config.resolve_with(lookup(&[]));
        assert!(settings.access_token.is_none());
        assert!(matches!(
            settings.require_token(),
            Err(SyncError::MissingToken { .. })
        ));
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let settings = SyncConfig::default().resolve_with(lookup(&[]));
        assert_eq!(settings.rest_url, DEFAULT_REST_URL);
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.wiki_url, DEFAULT_WIKI_URL);
        assert_eq!(settings.site_id, DEFAULT_SITE_ID);
        assert_eq!(settings.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert!(settings.user_agent.starts_with("wikisync/"));
    }

    #[test]
    fn env_overrides_file_for_endpoints() {
        let config = SyncConfig {
            api_url: Some("https://file.example/api.php".to_string()),
            wiki_url: Some("https://file.example/".to_string()),
            timeout_ms: Some(1000),
            ..SyncConfig::default()
        };
        let settings = config.resolve_with(lookup(&[
            ("WIKISYNC_API_URL", "https://env.example/api.php"),
            ("WIKISYNC_HTTP_TIMEOUT_MS", "not-a-number"),
        ]));
        assert_eq!(settings.api_url, "https://env.example/api.php");
        assert_eq!(settings.wiki_url, "https://file.example");
        assert_eq!(settings.timeout, Duration::from_millis(1000));
    }
}
