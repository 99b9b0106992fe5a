// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! TLS client contexts built from trust and key stores.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tlsconn::{SecureContextBuilder, SessionSealer};
//!
//! let sealer = Arc::new(SessionSealer::new()?);
//! let builder = SecureContextBuilder::mutual(
//!     sealer,
//!     Some("/etc/tlsconn/truststore.p12"),
//!     Some("changeit"),
//!     Some("/etc/tlsconn/keystore.p12"),
//!     Some("changeit"),
//! );
//!
//! let context = builder.build_security_context()?;
//! assert!(context.has_client_identity());
//!
//! let client = builder.build_http_client()?;
//! # drop(client);
//! # Ok::<(), tlsconn::Error>(())
//! ```

/// Context builder.
pub mod builder;
/// HTTPS client.
pub mod client;
/// Settings file handling.
pub mod config;
/// Assembled TLS client context.
pub mod context;
/// Error types.
pub mod error;
/// Writing trust and key stores.
pub mod export;
/// Filesystem utilities.
pub mod fs;
/// Password sealing.
pub mod secret;
/// Store loading.
pub mod store;
/// X.509 certificate parsing.
pub mod x509;

#[cfg(test)]
mod test_pki;

pub use builder::{ConnectionConfig, SecureContextBuilder};
pub use client::HttpsClient;
pub use config::{Settings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_BODY_SIZE};
pub use context::{SecurityContext, TrustSource};
pub use error::{Error, ErrorKind, Result};
pub use export::{encrypt_key_pem, export_key_store, export_pem_key_store, export_trust_store};
pub use fs::{atomic_write, atomic_write_secret};
pub use secret::{SealedSecret, Sealer, SessionSealer, ZeroizingString};
pub use store::{check_file, load_key_store, load_trust_store, ClientIdentity, StoreType};
pub use x509::{parse_cert_der, CertInfo, CertType};
