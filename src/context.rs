// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! The assembled transport security context.

use crate::error::{Error, Result};
use crate::store::ClientIdentity;
use crate::x509::parse_cert_der;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// Where the context gets its trust anchors from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSource {
    /// Built-in platform roots (Mozilla root program via `webpki-roots`).
    PlatformDefault,
    /// Certificates loaded from a configured trust store.
    Custom {
        anchors: Vec<CertificateDer<'static>>,
    },
}

/// Trust anchors plus optional client identity, ready to open connections.
///
/// Holds no per-connection state: any number of connections may share one
/// context.
#[derive(Clone)]
pub struct SecurityContext {
    config: Arc<ClientConfig>,
    trust: TrustSource,
    identity_chain: Option<Vec<CertificateDer<'static>>>,
}

impl SecurityContext {
    /// Assemble a context. `None` on either side selects the default for that
    /// side: platform roots for trust, no certificate for identity.
    pub(crate) fn assemble(
        provider: Arc<CryptoProvider>,
        anchors: Option<Vec<CertificateDer<'static>>>,
        identity: Option<ClientIdentity>,
    ) -> Result<Self> {
        let (roots, trust) = match anchors {
            Some(anchors) => {
                let mut roots = RootCertStore::empty();
                let (added, ignored) = roots.add_parsable_certificates(anchors.iter().cloned());
                if ignored > 0 {
                    warn!("Ignored {} unusable certificate(s) in trust store", ignored);
                }
                if added == 0 {
                    return Err(Error::ContextInit(rustls::Error::General(
                        "trust store holds no usable anchors".into(),
                    )));
                }
                for anchor in &anchors {
                    if let Ok(info) = parse_cert_der(anchor) {
                        debug!(
                            "Trust anchor: {} (expires {})",
                            info.display_name(),
                            info.expiry_string()
                        );
                    }
                }
                (roots, TrustSource::Custom { anchors })
            }
            None => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                (roots, TrustSource::PlatformDefault)
            }
        };

        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots);

        let (config, identity_chain) = match identity {
            Some(ClientIdentity { chain, key }) => {
                if let Some(leaf) = chain.first() {
                    if let Ok(info) = parse_cert_der(leaf) {
                        if info.is_expired() {
                            warn!(
                                "Client certificate {} expired on {}",
                                info.display_name(),
                                info.expiry_string()
                            );
                        } else {
                            debug!("Client identity: {}", info.display_name());
                        }
                    }
                }
                let config = builder.with_client_auth_cert(chain.clone(), key)?;
                (config, Some(chain))
            }
            None => (builder.with_no_client_auth(), None),
        };

        Ok(Self {
            config: Arc::new(config),
            trust,
            identity_chain,
        })
    }

    /// True when trust comes from a configured store rather than the
    /// platform defaults.
    pub fn has_custom_trust(&self) -> bool {
        matches!(self.trust, TrustSource::Custom { .. })
    }

    /// True when a client certificate will be presented to servers that ask.
    pub fn has_client_identity(&self) -> bool {
        self.identity_chain.is_some()
    }

    pub fn trust_source(&self) -> &TrustSource {
        &self.trust
    }

    /// Anchors loaded from the trust store, `None` for platform defaults.
    pub fn trust_anchors(&self) -> Option<&[CertificateDer<'static>]> {
        match &self.trust {
            TrustSource::Custom { anchors } => Some(anchors),
            TrustSource::PlatformDefault => None,
        }
    }

    pub fn identity_chain(&self) -> Option<&[CertificateDer<'static>]> {
        self.identity_chain.as_deref()
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.client_config())
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let trust = match &self.trust {
            TrustSource::PlatformDefault => "platform-default".to_string(),
            TrustSource::Custom { anchors } => format!("custom({} anchors)", anchors.len()),
        };
        f.debug_struct("SecurityContext")
            .field("trust", &trust)
            .field(
                "identity_chain_len",
                &self.identity_chain.as_ref().map(Vec::len),
            )
            .finish()
    }
}
