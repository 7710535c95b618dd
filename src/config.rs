//! Client configuration management.
//!
//! This module handles loading and saving the client configuration:
//! the backend base URL plus default username, domain, and tenant.
//!
//! Configuration is stored at `~/.config/authcache/config.json`.
//! Environment variables (`AUTHCACHE_URL`, `AUTHCACHE_USERNAME`,
//! `AUTHCACHE_DOMAIN`, `AUTHCACHE_TENANT`, `AUTHCACHE_TIMEOUT_SECS`),
//! loaded from a `.env` file when present, override values from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::ConnectOptions;

/// Application name used for the config directory path
const APP_NAME: &str = "authcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub domain: Option<String>,
    pub tenant: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("AUTHCACHE_URL") {
            self.base_url = Some(url);
        }
        if let Ok(username) = std::env::var("AUTHCACHE_USERNAME") {
            self.username = Some(username);
        }
        if let Ok(domain) = std::env::var("AUTHCACHE_DOMAIN") {
            self.domain = Some(domain);
        }
        if let Ok(tenant) = std::env::var("AUTHCACHE_TENANT") {
            self.tenant = Some(tenant);
        }
        if let Ok(timeout) = std::env::var("AUTHCACHE_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.timeout_secs = Some(secs),
                Err(_) => warn!(value = %timeout, "ignoring unparsable AUTHCACHE_TIMEOUT_SECS"),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Configured request timeout, for
    /// [`ReqwestTransport::with_timeout`](crate::api::ReqwestTransport::with_timeout).
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Connection options for this configuration, if a base URL is set.
    /// The password is left unset; callers fetch it from the
    /// [`CredentialStore`](crate::auth::CredentialStore) or prompt for it.
    pub fn connect_options(&self) -> Option<ConnectOptions> {
        let base_url = self.base_url.clone()?;
        Some(ConnectOptions {
            base_url,
            username: self.username.clone(),
            password: None,
            domain: self.domain.clone(),
            force_reauthenticate: false,
        })
    }
}
