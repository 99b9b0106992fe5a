// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Turns store locations and passwords into a [`SecurityContext`].

use crate::client::HttpsClient;
use crate::config::Settings;
use crate::context::SecurityContext;
use crate::error::Result;
use crate::secret::{SealedSecret, Sealer};
use crate::store::{check_file, configured_path, load_key_store, load_trust_store, StoreType};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroize;

/// Store locations and sealed passwords. Fixed once constructed.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub trust_store_path: Option<String>,
    pub trust_store_password: SealedSecret,
    pub key_store_path: Option<String>,
    pub key_store_password: SealedSecret,
    pub store_type: StoreType,
}

/// Builds TLS client contexts for one-way or mutual authentication.
///
/// Construction never touches the filesystem; store paths are only checked
/// when a context is built. Every build reloads the stores from disk.
#[derive(Clone)]
pub struct SecureContextBuilder {
    config: ConnectionConfig,
    sealer: Arc<dyn Sealer>,
    connect_timeout: Duration,
    max_body_size: usize,
}

impl SecureContextBuilder {
    /// One-way server authentication against `trust_store_path`.
    pub fn one_way(
        sealer: Arc<dyn Sealer>,
        trust_store_path: Option<&str>,
        trust_store_password: Option<&str>,
    ) -> Self {
        Self::mutual(sealer, trust_store_path, trust_store_password, None, None)
    }

    /// Server authentication plus a client certificate from
    /// `key_store_path`. Either store may be absent.
    pub fn mutual(
        sealer: Arc<dyn Sealer>,
        trust_store_path: Option<&str>,
        trust_store_password: Option<&str>,
        key_store_path: Option<&str>,
        key_store_password: Option<&str>,
    ) -> Self {
        let config = ConnectionConfig {
            trust_store_path: trust_store_path.map(String::from),
            trust_store_password: sealer.seal(trust_store_password.unwrap_or_default()),
            key_store_path: key_store_path.map(String::from),
            key_store_password: sealer.seal(key_store_password.unwrap_or_default()),
            store_type: StoreType::default(),
        };

        Self {
            config,
            sealer,
            connect_timeout: crate::config::DEFAULT_CONNECT_TIMEOUT,
            max_body_size: crate::config::DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Build from a settings file. Passwords come from the environment
    /// variables named in the settings; unset variables mean no password.
    pub fn from_settings(sealer: Arc<dyn Sealer>, settings: &Settings) -> Self {
        let mut trust_password = std::env::var(settings.trust_password_env()).ok();
        let mut key_password = std::env::var(settings.key_password_env()).ok();

        let builder = Self::mutual(
            sealer,
            settings.trust_store.path.as_deref(),
            trust_password.as_deref(),
            settings.key_store.path.as_deref(),
            key_password.as_deref(),
        )
        .with_store_type(settings.store_type)
        .with_connect_timeout(settings.client.connect_timeout())
        .with_max_body_size(settings.client.max_body_size);

        trust_password.zeroize();
        key_password.zeroize();
        builder
    }

    pub fn with_store_type(mut self, store_type: StoreType) -> Self {
        self.config.store_type = store_type;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Load the configured stores and assemble a fresh context.
    pub fn build_security_context(&self) -> Result<SecurityContext> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let store_type = self.config.store_type;

        let anchors = match configured_path(self.config.trust_store_path.as_deref()) {
            Some(path) => {
                let file = check_file(path)?;
                let password = self.sealer.reveal(&self.config.trust_store_password)?;
                let anchors = load_trust_store(&file, &password, store_type)?;
                debug!("Loaded {} trust anchor(s) from {}", anchors.len(), path);
                Some(anchors)
            }
            None => {
                info!("No trust store configured, using platform default trust anchors");
                None
            }
        };

        let identity = match configured_path(self.config.key_store_path.as_deref()) {
            Some(path) => {
                let file = check_file(path)?;
                let password = self.sealer.reveal(&self.config.key_store_password)?;
                let identity = load_key_store(&file, &password, store_type, &provider)?;
                debug!("Loaded client identity from {}", path);
                Some(identity)
            }
            None => {
                info!("No key store configured, no client certificate will be presented");
                None
            }
        };

        SecurityContext::assemble(provider, anchors, identity)
    }

    /// Build a fresh context and wrap it in an HTTPS client.
    pub fn build_http_client(&self) -> Result<HttpsClient> {
        let context = self.build_security_context()?;
        Ok(HttpsClient::new(context)
            .with_connect_timeout(self.connect_timeout)
            .with_max_body_size(self.max_body_size))
    }
}

impl std::fmt::Debug for SecureContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureContextBuilder")
            .field("config", &self.config)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}
