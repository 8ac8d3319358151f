//! Configuration file parser for ~/.config/feedbridge/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning for each so
//! typos are visible.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::tabs::ApplicationUrls;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// The file parsed but describes an unusable setup.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Exact page URLs of the application, one per host identity.
    pub application_urls: Vec<String>,

    /// Page opened when no application tab exists. Defaults to the first
    /// entry of `application_urls`.
    pub application_page: Option<String>,

    /// Keep the tab records of a previous run instead of starting empty.
    pub resume_session: bool,

    /// Location of the state file. Defaults to `state.json` next to the config.
    pub state_file: Option<PathBuf>,

    pub provider: ProviderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_urls: vec![
                "chrome-extension://feedbridge/reader.html".to_string(),
                "moz-extension://feedbridge/reader.html".to_string(),
            ],
            application_page: None,
            resume_session: false,
            state_file: None,
            provider: ProviderConfig::default(),
        }
    }
}

/// OAuth provider settings.
///
/// Custom Debug impl masks `client_id` so it does not end up in logs.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Display name, shown on the login button ("Login (Dropbox)").
    pub name: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub api_base: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "Dropbox".to_string(),
            client_id: String::new(),
            redirect_uri: "chrome-extension://feedbridge/oauth_receiver.html".to_string(),
            authorize_url: "https://www.dropbox.com/oauth2/authorize".to_string(),
            api_base: "https://api.dropboxapi.com".to_string(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field(
                "client_id",
                &(!self.client_id.is_empty()).then_some("[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - No application page → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            application_urls = config.application_urls.len(),
            provider = %config.provider.name,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.application_page().is_none() {
            return Err(ConfigError::Invalid(
                "no application_page and application_urls is empty".to_string(),
            ));
        }
        if self.provider.name.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.name is empty".to_string()));
        }
        Ok(())
    }

    /// Page opened for a new application tab.
    pub fn application_page(&self) -> Option<&str> {
        self.application_page
            .as_deref()
            .or_else(|| self.application_urls.first().map(String::as_str))
    }

    pub fn application_urls(&self) -> ApplicationUrls {
        ApplicationUrls::new(self.application_urls.iter().cloned())
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    const KNOWN_KEYS: [&str; 5] = [
        "application_urls",
        "application_page",
        "resume_session",
        "state_file",
        "provider",
    ];
    const KNOWN_PROVIDER_KEYS: [&str; 5] = [
        "name",
        "client_id",
        "redirect_uri",
        "authorize_url",
        "api_base",
    ];

    for key in raw.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
    }
    if let Some(provider) = raw.get("provider").and_then(|v| v.as_table()) {
        for key in provider.keys() {
            if !KNOWN_PROVIDER_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "Unknown key in [provider], ignoring");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
