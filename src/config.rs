// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::store::StoreType;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current settings file version. Increment when making breaking changes.
const CONFIG_VERSION: u32 = 1;

/// Default TCP connect timeout for [`crate::HttpsClient`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum response body size (10 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

pub const DEFAULT_TRUST_STORE_PASSWORD_ENV: &str = "TLSCONN_TRUST_STORE_PASSWORD";
pub const DEFAULT_KEY_STORE_PASSWORD_ENV: &str = "TLSCONN_KEY_STORE_PASSWORD";

const MAX_CONNECT_TIMEOUT_SECS: u64 = 300;
const MIN_BODY_SIZE: usize = 1024;
const MAX_BODY_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub store_type: StoreType,
    #[serde(default)]
    pub trust_store: StoreSettings,
    #[serde(default)]
    pub key_store: StoreSettings,
    #[serde(default)]
    pub client: ClientSettings,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

/// Location of one store and the environment variable holding its password.
///
/// Either field may be left out of a section. An unset `password_env` falls
/// back to the per-side default, see [`Settings::trust_password_env`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoreSettings {
    fn password_env_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.password_env.as_deref().unwrap_or(default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl ClientSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            store_type: StoreType::default(),
            trust_store: StoreSettings::default(),
            key_store: StoreSettings::default(),
            client: ClientSettings::default(),
        }
    }
}

impl Settings {
    /// Default settings location: `$TLSCONN_CONFIG`, else the per-user config
    /// directory.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(custom) = std::env::var("TLSCONN_CONFIG") {
            return Ok(PathBuf::from(custom));
        }

        ProjectDirs::from("", "", "tlsconn")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or_else(|| {
                Error::Config(
                    "Cannot determine config directory; set TLSCONN_CONFIG".to_string(),
                )
            })
    }

    /// Environment variable holding the trust-store password.
    pub fn trust_password_env(&self) -> &str {
        self.trust_store.password_env_or(DEFAULT_TRUST_STORE_PASSWORD_ENV)
    }

    /// Environment variable holding the key-store password.
    pub fn key_password_env(&self) -> &str {
        self.key_store.password_env_or(DEFAULT_KEY_STORE_PASSWORD_ENV)
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Self = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            Self::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.config_version > CONFIG_VERSION {
            tracing::warn!(
                "Settings version {} is newer than supported version {}; some settings may be ignored",
                self.config_version,
                CONFIG_VERSION
            );
        }

        if self.client.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "client.connect_timeout_secs must be at least 1".into(),
            ));
        }
        if self.client.connect_timeout_secs > MAX_CONNECT_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "client.connect_timeout_secs must be at most {}",
                MAX_CONNECT_TIMEOUT_SECS
            )));
        }
        if !(MIN_BODY_SIZE..=MAX_BODY_SIZE).contains(&self.client.max_body_size) {
            return Err(Error::Config(format!(
                "client.max_body_size must be between {} and {} bytes",
                MIN_BODY_SIZE, MAX_BODY_SIZE
            )));
        }

        for (name, env) in [
            ("trust_store", self.trust_password_env()),
            ("key_store", self.key_password_env()),
        ] {
            if env.trim().is_empty() {
                return Err(Error::Config(format!(
                    "{}.password_env cannot be empty",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::WriteFile {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        crate::fs::atomic_write(path, content.as_bytes())
    }
}
