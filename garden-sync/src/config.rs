//! Sync layer configuration
//!
//! Loaded from defaults, a TOML document, and `GARDEN_*` environment
//! variables, in that order of precedence (later wins).

use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointResolver;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Explicit base URL; always wins when set
    #[serde(default)]
    pub api_url_override: Option<String>,

    /// Build-time default used when there is no network context
    #[serde(default)]
    pub build_default_url: Option<String>,

    /// Production backend
    #[serde(default = "default_production_url")]
    pub production_url: String,

    /// Local development backend
    #[serde(default = "default_local_url")]
    pub local_url: String,

    /// Hardcoded fallback for cloud-hosted frontends without an override
    #[serde(default = "default_cloud_fallback_url")]
    pub cloud_fallback_url: String,

    /// Production builds refuse to guess a base URL
    #[serde(default)]
    pub production_build: bool,

    /// Skip credentials entirely (local development only)
    #[serde(default)]
    pub auth_bypass: bool,

    /// Public base URL of the object storage bucket holding photos
    #[serde(default)]
    pub storage_public_url: Option<String>,

    /// Path prefix of resources that require the bearer credential
    #[serde(default = "default_protected_prefix")]
    pub protected_prefix: String,

    #[serde(default = "default_credential_cookie")]
    pub credential_cookie: String,

    #[serde(default = "default_csrf_cookie")]
    pub csrf_cookie: String,

    #[serde(default = "default_credential_cookie")]
    pub credential_store_key: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

// Defaults
fn default_production_url() -> String { "https://api.jardinbotanico.org".to_string() }
fn default_local_url() -> String { "http://localhost:8000".to_string() }
fn default_cloud_fallback_url() -> String { "https://api.jardinbotanico.org".to_string() }
fn default_protected_prefix() -> String { "/photos/file/".to_string() }
fn default_credential_cookie() -> String { "access_token".to_string() }
fn default_csrf_cookie() -> String { "csrftoken".to_string() }
fn default_request_timeout() -> u64 { 30 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url_override: None,
            build_default_url: None,
            production_url: default_production_url(),
            local_url: default_local_url(),
            cloud_fallback_url: default_cloud_fallback_url(),
            production_build: false,
            auth_bypass: false,
            storage_public_url: None,
            protected_prefix: default_protected_prefix(),
            credential_cookie: default_credential_cookie(),
            csrf_cookie: default_csrf_cookie(),
            credential_store_key: default_credential_cookie(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay `GARDEN_*` variables read through `lookup`.
    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("GARDEN_API_URL") {
            self.api_url_override = Some(url);
        }
        if let Some(url) = non_empty("GARDEN_DEFAULT_API_URL") {
            self.build_default_url = Some(url);
        }
        if let Some(url) = non_empty("GARDEN_STORAGE_PUBLIC_URL") {
            self.storage_public_url = Some(url);
        }
        if let Some(flag) = non_empty("GARDEN_AUTH_BYPASS") {
            self.auth_bypass = parse_flag(&flag);
        }
        if let Some(flag) = non_empty("GARDEN_PRODUCTION") {
            self.production_build = parse_flag(&flag);
        }
        self
    }

    /// Build the endpoint resolver described by this configuration.
    pub fn endpoint_resolver(&self) -> EndpointResolver {
        EndpointResolver::from_config(self)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.local_url, "http://localhost:8000");
        assert_eq!(config.protected_prefix, "/photos/file/");
        assert_eq!(config.request_timeout_secs, 30);
        assert!(!config.production_build);
        assert!(config.api_url_override.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
api_url_override = "https://staging.example.org"
production_build = true
"#,
        )
        .unwrap();

        assert_eq!(config.api_url_override.as_deref(), Some("https://staging.example.org"));
        assert!(config.production_build);
        assert_eq!(config.credential_cookie, "access_token");
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = SyncConfig::from_toml_str("production_build = \"maybe\"").unwrap_err();
        assert!(matches!(err, crate::SyncError::Configuration(_)));
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            ("GARDEN_API_URL", "https://override.example.org"),
            ("GARDEN_AUTH_BYPASS", "true"),
            ("GARDEN_PRODUCTION", "0"),
            ("GARDEN_STORAGE_PUBLIC_URL", ""),
        ]
        .into_iter()
        .collect();

        let config = SyncConfig::default().with_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_url_override.as_deref(), Some("https://override.example.org"));
        assert!(config.auth_bypass);
        assert!(!config.production_build);
        assert!(config.storage_public_url.is_none());
    }
}
