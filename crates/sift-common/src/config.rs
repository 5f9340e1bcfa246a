//! Domain configuration loading.
//!
//! Configuration is read from `--config`, `SIFT_CONFIG`, or
//! `~/.config/sift/config.toml`. When none of those exist a single domain is
//! assembled from `SIFT_*` environment variables.
//!
//! ## Example Configuration
//!
//! ```toml
//! [settings]
//! default_domain = "storefront"
//! timeout_seconds = 30
//!
//! [[domains]]
//! id = "storefront"
//! name = "Storefront search"
//! api_key_env = "STOREFRONT_API_KEY"
//! scopes = ["discover", "event"]
//!
//! [[domains]]
//! id = "content-feed"
//! api_key_env = "FEED_INGESTION_KEY"
//! scopes = ["ingestion"]
//! source_id = "1234567"
//! ```
//!
//! A domain without any API key is valid: its requests go out without an
//! `Authorization` header and rely on network-level trust.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::scope::ScopeSet;

/// Default access token lifetime: one day.
pub const DEFAULT_ACCESS_TOKEN_LIFETIME_MS: u64 = 86_400_000;
/// Default refresh token lifetime: seven days.
pub const DEFAULT_REFRESH_TOKEN_LIFETIME_MS: u64 = 604_800_000;

const DEFAULT_API_BASE_URL: &str = "https://discover.sitecorecloud.io";
const DEFAULT_AUTH_URL: &str = "https://discover.sitecorecloud.io/account/1/access-token";

/// Top-level configuration: every domain plus shared settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiftConfig {
    /// Configured domains (tenants)
    pub domains: Vec<DomainConfig>,

    /// Shared settings
    #[serde(default)]
    pub settings: Settings,
}

/// One logical tenant: its API key, scopes and endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain identifier, used in API paths and to select the domain in tools
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// API key given inline. Never serialized.
    #[serde(skip_serializing, default)]
    pub api_key: Option<SecretString>,

    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Scopes the key was issued for (default: all)
    #[serde(default)]
    pub scopes: ScopeSet,

    /// Default ingestion source for document operations
    #[serde(default)]
    pub source_id: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub search_url: String,

    #[serde(default = "default_api_base_url")]
    pub ingestion_url: String,

    #[serde(default = "default_api_base_url")]
    pub events_url: String,

    /// Token endpoint used for both generation and refresh
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_access_token_lifetime_ms")]
    pub access_token_lifetime_ms: u64,

    #[serde(default = "default_refresh_token_lifetime_ms")]
    pub refresh_token_lifetime_ms: u64,
}

// Keep the API key out of logs
impl fmt::Debug for DomainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("scopes", &self.scopes)
            .field("source_id", &self.source_id)
            .field("search_url", &self.search_url)
            .field("ingestion_url", &self.ingestion_url)
            .field("events_url", &self.events_url)
            .field("auth_url", &self.auth_url)
            .field("access_token_lifetime_ms", &self.access_token_lifetime_ms)
            .field("refresh_token_lifetime_ms", &self.refresh_token_lifetime_ms)
            .finish()
    }
}

/// Shared settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Domain used when a tool call does not name one. Falls back to the
    /// first configured domain.
    #[serde(default)]
    pub default_domain: Option<String>,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retries for transient HTTP failures (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_domain: None,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

const fn default_access_token_lifetime_ms() -> u64 {
    DEFAULT_ACCESS_TOKEN_LIFETIME_MS
}

const fn default_refresh_token_lifetime_ms() -> u64 {
    DEFAULT_REFRESH_TOKEN_LIFETIME_MS
}

const fn default_timeout_seconds() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

impl DomainConfig {
    /// Creates a domain with default endpoints, all scopes and no API key.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            api_key: None,
            api_key_env: None,
            scopes: ScopeSet::default(),
            source_id: None,
            search_url: default_api_base_url(),
            ingestion_url: default_api_base_url(),
            events_url: default_api_base_url(),
            auth_url: default_auth_url(),
            access_token_lifetime_ms: DEFAULT_ACCESS_TOKEN_LIFETIME_MS,
            refresh_token_lifetime_ms: DEFAULT_REFRESH_TOKEN_LIFETIME_MS,
        }
    }

    /// Sets the API key inline.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into().into()));
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Points every API (and the token endpoint) at one base URL.
    ///
    /// Used against local mocks and proxies.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.auth_url = format!("{base_url}/account/1/access-token");
        self.search_url.clone_from(&base_url);
        self.ingestion_url.clone_from(&base_url);
        self.events_url = base_url;
        self
    }

    #[must_use]
    pub const fn with_token_lifetimes(mut self, access_ms: u64, refresh_ms: u64) -> Self {
        self.access_token_lifetime_ms = access_ms;
        self.refresh_token_lifetime_ms = refresh_ms;
        self
    }

    /// Display name, falling back to the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Fills `api_key` from `api_key_env` when no inline key is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] if the named variable is not set.
    pub fn resolve_api_key(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if self.api_key.is_some() {
            return Ok(());
        }
        if let Some(var) = &self.api_key_env {
            let value = lookup(var).ok_or_else(|| ConfigError::MissingEnv(var.clone()))?;
            self.api_key = Some(SecretString::new(value.into()));
        }
        Ok(())
    }

    /// Validates a single domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the id or scopes are empty, a URL does not parse,
    /// or the token lifetimes are zero or inverted.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Invalid("domain id must not be empty".to_string()));
        }

        if self.scopes.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "domain '{}' declares no scopes",
                self.id
            )));
        }

        for (field, value) in [
            ("search_url", &self.search_url),
            ("ingestion_url", &self.ingestion_url),
            ("events_url", &self.events_url),
            ("auth_url", &self.auth_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                ConfigError::Invalid(format!("domain '{}': invalid {field} '{value}': {e}", self.id))
            })?;
        }

        if self.access_token_lifetime_ms == 0 || self.refresh_token_lifetime_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "domain '{}': token lifetimes must be positive",
                self.id
            )));
        }

        if self.access_token_lifetime_ms > self.refresh_token_lifetime_ms {
            return Err(ConfigError::Invalid(format!(
                "domain '{}': access token lifetime ({} ms) exceeds refresh token lifetime ({} ms)",
                self.id, self.access_token_lifetime_ms, self.refresh_token_lifetime_ms
            )));
        }

        Ok(())
    }
}

impl SiftConfig {
    /// Loads configuration from an explicit path, the default path, or the
    /// environment, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen source cannot be read, parsed, or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        if let Some(path) = Self::config_path().filter(|p| p.exists()) {
            log::info!("Loading configuration from {}", path.display());
            return Self::from_file(&path);
        }

        log::info!("No configuration file found, reading SIFT_* environment variables");
        Self::from_env()
    }

    /// Returns the default configuration file path.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sift").join("config.toml"))
    }

    /// Load from file based on extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, has an unsupported
    /// extension, references an unset environment variable, or fails
    /// validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&contents)?,
            Some("yaml" | "yml") => serde_yaml::from_str(&contents)?,
            Some("json") => serde_json::from_str(&contents)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };
        config.resolve_api_keys(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a single-domain configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`SiftConfig::from_env_with`].
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|var| std::env::var(var).ok())
    }

    /// Builds a single-domain configuration from `SIFT_*` variables.
    ///
    /// `SIFT_DOMAIN_ID` is required. `SIFT_API_KEY`, `SIFT_SCOPES`,
    /// `SIFT_SOURCE_ID`, `SIFT_SEARCH_URL`, `SIFT_INGESTION_URL`,
    /// `SIFT_EVENTS_URL`, `SIFT_AUTH_URL`, `SIFT_ACCESS_TOKEN_LIFETIME_MS`,
    /// `SIFT_REFRESH_TOKEN_LIFETIME_MS` and `SIFT_TIMEOUT_SECONDS` are
    /// optional.
    ///
    /// # Errors
    ///
    /// Returns an error if `SIFT_DOMAIN_ID` is unset, a value does not parse,
    /// or the result fails validation.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let id = lookup("SIFT_DOMAIN_ID")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("SIFT_DOMAIN_ID".to_string()))?;

        let mut domain = DomainConfig::new(id);
        domain.api_key = lookup("SIFT_API_KEY")
            .filter(|key| !key.is_empty())
            .map(|key| SecretString::new(key.into()));
        if let Some(scopes) = lookup("SIFT_SCOPES") {
            domain.scopes = scopes.parse()?;
        }
        domain.source_id = lookup("SIFT_SOURCE_ID");
        if let Some(url) = lookup("SIFT_SEARCH_URL") {
            domain.search_url = url;
        }
        if let Some(url) = lookup("SIFT_INGESTION_URL") {
            domain.ingestion_url = url;
        }
        if let Some(url) = lookup("SIFT_EVENTS_URL") {
            domain.events_url = url;
        }
        if let Some(url) = lookup("SIFT_AUTH_URL") {
            domain.auth_url = url;
        }
        if let Some(ms) = lookup("SIFT_ACCESS_TOKEN_LIFETIME_MS") {
            domain.access_token_lifetime_ms = parse_number("SIFT_ACCESS_TOKEN_LIFETIME_MS", &ms)?;
        }
        if let Some(ms) = lookup("SIFT_REFRESH_TOKEN_LIFETIME_MS") {
            domain.refresh_token_lifetime_ms =
                parse_number("SIFT_REFRESH_TOKEN_LIFETIME_MS", &ms)?;
        }

        let mut settings = Settings::default();
        if let Some(secs) = lookup("SIFT_TIMEOUT_SECONDS") {
            settings.timeout_seconds = parse_number("SIFT_TIMEOUT_SECONDS", &secs)?;
        }

        let config = Self {
            domains: vec![domain],
            settings,
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolves `api_key_env` references for every domain.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced variable is not set.
    pub fn resolve_api_keys(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        for domain in &mut self.domains {
            domain.resolve_api_key(&lookup)?;
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No domains are defined
    /// - A domain id is duplicated
    /// - The default domain does not exist
    /// - Any domain fails its own validation
    pub fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            return Err(ConfigError::Invalid(
                "No domains defined in configuration".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for domain in &self.domains {
            domain.validate()?;
            if !seen.insert(domain.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate domain id '{}'",
                    domain.id
                )));
            }
        }

        if let Some(default) = &self.settings.default_domain
            && !seen.contains(default.as_str())
        {
            return Err(ConfigError::Invalid(format!(
                "Default domain '{default}' not found in domains"
            )));
        }

        Ok(())
    }

    /// Id of the domain used when a request does not name one.
    #[must_use]
    pub fn default_domain_id(&self) -> Option<&str> {
        self.settings
            .default_domain
            .as_deref()
            .or_else(|| self.domains.first().map(|d| d.id.as_str()))
    }

    /// Gets a domain by id.
    #[must_use]
    pub fn get_domain(&self, id: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.id == id)
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{var} must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::collections::HashMap;
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::scope::Scope;

    fn sample_config_toml() -> &'static str {
        r#"
[settings]
default_domain = "storefront"
timeout_seconds = 10

[[domains]]
id = "storefront"
name = "Storefront search"
api_key = "01-inline-key"
scopes = ["discover", "event"]

[[domains]]
id = "feed"
api_key_env = "FEED_KEY"
scopes = ["ingestion"]
source_id = "1234567"
access_token_lifetime_ms = 1000
refresh_token_lifetime_ms = 5000
        "#
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_parse_config() {
        let config: SiftConfig = toml::from_str(sample_config_toml()).unwrap();

        assert_eq!(config.domains.len(), 2);
        assert_eq!(config.settings.timeout_seconds, 10);
        assert_eq!(config.settings.max_retries, 3);

        let storefront = config.get_domain("storefront").unwrap();
        assert_eq!(storefront.display_name(), "Storefront search");
        assert_eq!(
            storefront.api_key.as_ref().unwrap().expose_secret(),
            "01-inline-key"
        );
        assert_eq!(storefront.search_url, DEFAULT_API_BASE_URL);
        assert_eq!(
            storefront.access_token_lifetime_ms,
            DEFAULT_ACCESS_TOKEN_LIFETIME_MS
        );

        let feed = config.get_domain("feed").unwrap();
        assert!(feed.scopes.is_ingestion_only());
        assert_eq!(feed.source_id.as_deref(), Some("1234567"));
        assert_eq!(feed.refresh_token_lifetime_ms, 5000);
    }

    #[test]
    fn test_resolve_api_key_from_env() {
        let mut config: SiftConfig = toml::from_str(sample_config_toml()).unwrap();
        config
            .resolve_api_keys(env(&[("FEED_KEY", "02-from-env")]))
            .unwrap();

        let feed = config.get_domain("feed").unwrap();
        assert_eq!(feed.api_key.as_ref().unwrap().expose_secret(), "02-from-env");
    }

    #[test]
    fn test_resolve_api_key_missing_env() {
        let mut config: SiftConfig = toml::from_str(sample_config_toml()).unwrap();
        let err = config.resolve_api_keys(env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(var) if var == "FEED_KEY"));
    }

    #[test]
    fn test_inline_key_wins_over_env() {
        let mut domain = DomainConfig::new("d").with_api_key("inline");
        domain.api_key_env = Some("OTHER".to_string());
        domain.resolve_api_key(env(&[("OTHER", "env")])).unwrap();
        assert_eq!(domain.api_key.unwrap().expose_secret(), "inline");
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let config = SiftConfig {
            domains: vec![DomainConfig::new("a"), DomainConfig::new("a")],
            settings: Settings::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_default_domain() {
        let config = SiftConfig {
            domains: vec![DomainConfig::new("a")],
            settings: Settings {
                default_domain: Some("b".to_string()),
                ..Settings::default()
            },
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_lifetimes() {
        let domain = DomainConfig::new("a").with_token_lifetimes(10_000, 1_000);
        assert!(domain.validate().is_err());
    }

    #[test]
    fn test_validate_empty_scopes() {
        let domain = DomainConfig::new("a").with_scopes(ScopeSet::new([]));
        assert!(domain.validate().is_err());
    }

    #[test]
    fn test_validate_bad_url() {
        let mut domain = DomainConfig::new("a");
        domain.auth_url = "not a url".to_string();
        assert!(domain.validate().is_err());
    }

    #[test]
    fn test_default_domain_falls_back_to_first() {
        let config = SiftConfig {
            domains: vec![DomainConfig::new("first"), DomainConfig::new("second")],
            settings: Settings::default(),
        };
        assert_eq!(config.default_domain_id(), Some("first"));
    }

    #[test]
    fn test_from_env() {
        let config = SiftConfig::from_env_with(env(&[
            ("SIFT_DOMAIN_ID", "123-456"),
            ("SIFT_API_KEY", "01-XXXX"),
            ("SIFT_SCOPES", "discover,event"),
            ("SIFT_ACCESS_TOKEN_LIFETIME_MS", "1000"),
            ("SIFT_REFRESH_TOKEN_LIFETIME_MS", "5000"),
            ("SIFT_TIMEOUT_SECONDS", "5"),
        ]))
        .unwrap();

        let domain = &config.domains[0];
        assert_eq!(domain.id, "123-456");
        assert_eq!(domain.api_key.as_ref().unwrap().expose_secret(), "01-XXXX");
        assert!(domain.scopes.contains(Scope::Event));
        assert!(!domain.scopes.contains(Scope::Ingestion));
        assert_eq!(domain.access_token_lifetime_ms, 1000);
        assert_eq!(config.settings.timeout_seconds, 5);
    }

    #[test]
    fn test_from_env_without_key_is_valid() {
        let config = SiftConfig::from_env_with(env(&[("SIFT_DOMAIN_ID", "d")])).unwrap();
        assert!(config.domains[0].api_key.is_none());
    }

    #[test]
    fn test_from_env_requires_domain_id() {
        assert!(matches!(
            SiftConfig::from_env_with(env(&[])),
            Err(ConfigError::MissingEnv(_))
        ));
    }

    #[test]
    fn test_from_env_bad_number() {
        let result = SiftConfig::from_env_with(env(&[
            ("SIFT_DOMAIN_ID", "d"),
            ("SIFT_ACCESS_TOKEN_LIFETIME_MS", "soon"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"domains": [{{"id": "d", "api_key": "k", "scopes": ["ingestion"]}}]}}"#
        )
        .unwrap();

        let config = SiftConfig::from_file(file.path()).unwrap();
        assert!(config.domains[0].scopes.is_ingestion_only());
    }

    #[test]
    fn test_from_file_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(file, "domains:\n  - id: d\n    scopes: [discover]\n").unwrap();

        let config = SiftConfig::from_file(file.path()).unwrap();
        assert_eq!(config.domains[0].scopes.names(), vec!["discover"]);
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            SiftConfig::from_file(file.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let domain = DomainConfig::new("d").with_api_key("super-secret");
        let debug = format!("{domain:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_with_base_url() {
        let domain = DomainConfig::new("d").with_base_url("http://127.0.0.1:9000/");
        assert_eq!(domain.search_url, "http://127.0.0.1:9000");
        assert_eq!(domain.auth_url, "http://127.0.0.1:9000/account/1/access-token");
        assert!(domain.validate().is_ok());
    }
}
