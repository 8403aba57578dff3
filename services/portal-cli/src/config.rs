//! Configuration types and loading
//!
//! The config path comes from the command line (see `cli`). The account
//! password is read from the PORTAL_PASSWORD env var or from `password_file`,
//! never from the TOML itself.

use common::Secret;
use portal_auth::{CHANGE_PASSWORD_PATH, Endpoints, LOGIN_PATH, REFRESH_PATH};
use portal_session::SessionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionSettings,
    #[serde(default)]
    pub account: AccountConfig,
}

/// Portal API location
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_change_password_path")]
    pub change_password_path: String,
}

/// Where credentials live and when to renew them
#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    pub state_file: PathBuf,
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_secs: u64,
}

/// Login identity
#[derive(Debug, Default, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// File holding the password (alternative to PORTAL_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_threshold() -> u64 {
    portal_auth::DEFAULT_REFRESH_THRESHOLD.as_secs()
}

fn default_login_path() -> String {
    LOGIN_PATH.to_string()
}

fn default_refresh_path() -> String {
    REFRESH_PATH.to_string()
}

fn default_change_password_path() -> String {
    CHANGE_PASSWORD_PATH.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then resolve the password.
    ///
    /// Password resolution order:
    /// 1. PORTAL_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let Ok(password) = std::env::var("PORTAL_PASSWORD") {
            config.account.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.account.password_file {
            config.account.password = Secret::from_file(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            endpoints: Endpoints {
                login: self.api.login_path.clone(),
                refresh: self.api.refresh_path.clone(),
                change_password: self.api.change_password_path.clone(),
            },
            refresh_threshold: Duration::from_secs(self.session.refresh_threshold_secs),
        }
    }
}
