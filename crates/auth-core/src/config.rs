//! Configuration for the session core

use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{AuthError, Result};
use crate::guard::DEFAULT_LOGIN_ROUTE;

/// Prefix of environment overrides, e.g. `RENTAL_API_BASE_URL`
pub const ENV_PREFIX: &str = "RENTAL";

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the REST API; endpoint paths are appended to it
    pub api_base_url: String,
    /// Where the file-backed token store keeps the credential pair
    pub token_store_path: PathBuf,
    pub request_timeout_secs: u64,
    /// Redirect target for sessions that fail a route check
    pub login_route: String,
    pub logging_level: String,
    /// Emit one JSON object per log event
    pub logging_json: bool,
    /// Include source file and line in log events
    pub logging_file_info: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            token_store_path: PathBuf::from(".rental/session.json"),
            request_timeout_secs: 30,
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            logging_level: "info".to_string(),
            logging_json: false,
            logging_file_info: false,
        }
    }
}

impl AuthConfig {
    /// Defaults, overlaid by an optional TOML file, overlaid by `RENTAL_*`
    /// environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default(
                "token_store_path",
                defaults.token_store_path.to_string_lossy().into_owned(),
            )?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .set_default("login_route", defaults.login_route)?
            .set_default("logging_level", defaults.logging_level)?
            .set_default("logging_json", defaults.logging_json)?
            .set_default("logging_file_info", defaults.logging_file_info)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let config: AuthConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.request_timeout_secs == 0 {
            return Err(AuthError::Config("request_timeout_secs must be positive".to_string()));
        }
        if !self.login_route.starts_with('/') {
            return Err(AuthError::Config(format!(
                "login_route must be an absolute path, got '{}'",
                self.login_route
            )));
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.api_base_url)
            .map_err(|e| AuthError::Config(format!("Invalid api_base_url '{}': {}", self.api_base_url, e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
