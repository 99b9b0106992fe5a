// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Loading of trust and key stores from disk.

use crate::error::{BoxError, Error, Result};
use p12_keystore::{KeyStore, KeyStoreEntry};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

/// Container format of a trust or key store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// PKCS#12 (`.p12` / `.pfx`), the common platform keystore default.
    #[default]
    Pkcs12,
    /// PEM bundle. Key stores hold the certificate chain followed by a
    /// private key, optionally encrypted as PKCS#8.
    Pem,
}

impl std::str::FromStr for StoreType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pkcs12" | "p12" | "pfx" => Ok(StoreType::Pkcs12),
            "pem" => Ok(StoreType::Pem),
            other => Err(Error::Config(format!(
                "Unknown store type '{}': expected pkcs12 or pem",
                other
            ))),
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreType::Pkcs12 => f.write_str("pkcs12"),
            StoreType::Pem => f.write_str("pem"),
        }
    }
}

/// Client certificate chain and private key taken from a key store.
pub struct ClientIdentity {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Returns the path if it points at an existing file.
///
/// Pure existence check: permissions are left to the subsequent read.
pub fn check_file(path: &str) -> Result<PathBuf> {
    let file = PathBuf::from(path);
    if !file.exists() {
        return Err(Error::StoreNotFound(path.to_string()));
    }
    Ok(file)
}

/// A store path that is absent or blank means "skip this side".
pub(crate) fn configured_path(path: Option<&str>) -> Option<&str> {
    path.filter(|p| !p.trim().is_empty())
}

fn read_store(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    std::fs::read(path)
        .map(Zeroizing::new)
        .map_err(|e| Error::ReadStore {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Load the trusted certificates of a trust store.
pub fn load_trust_store(
    path: &Path,
    password: &str,
    store_type: StoreType,
) -> Result<Vec<CertificateDer<'static>>> {
    let data = read_store(path)?;

    let anchors = match store_type {
        StoreType::Pkcs12 => {
            let keystore = open_pkcs12(path, &data, password)?;
            let mut anchors = Vec::new();
            for (alias, entry) in keystore.entries() {
                match entry {
                    KeyStoreEntry::Certificate(cert) => {
                        anchors.push(CertificateDer::from(cert.as_der().to_vec()));
                    }
                    // A key entry's own certificate is trusted as well
                    KeyStoreEntry::PrivateKeyChain(chain) => {
                        if let Some(leaf) = chain.chain().first() {
                            anchors.push(CertificateDer::from(leaf.as_der().to_vec()));
                        }
                    }
                    #[allow(unreachable_patterns)]
                    _ => {
                        debug!(
                            "Skipping non-certificate entry '{}' in {}",
                            alias,
                            path.display()
                        );
                    }
                }
            }
            if anchors.is_empty() {
                return Err(integrity(path, "no certificate entry found"));
            }
            anchors
        }
        StoreType::Pem => {
            let mut reader = std::io::Cursor::new(&data[..]);
            let anchors = rustls_pemfile::certs(&mut reader)
                .collect::<std::io::Result<Vec<_>>>()
                .map_err(|e| integrity(path, e))?;
            if anchors.is_empty() {
                return Err(integrity(path, "no CERTIFICATE block found"));
            }
            anchors
        }
    };

    Ok(anchors)
}

/// Load the client identity of a key store and check that `provider` can sign
/// with its key.
pub fn load_key_store(
    path: &Path,
    password: &str,
    store_type: StoreType,
    provider: &CryptoProvider,
) -> Result<ClientIdentity> {
    let data = read_store(path)?;

    let identity = match store_type {
        StoreType::Pkcs12 => {
            let keystore = open_pkcs12(path, &data, password)?;
            let (alias, chain) = keystore.private_key_chain().ok_or_else(|| Error::KeyAccess {
                path: path.to_path_buf(),
                reason: "store contains no private key entry".into(),
            })?;
            debug!("Using key entry '{}' from {}", alias, path.display());

            let certs: Vec<CertificateDer<'static>> = chain
                .chain()
                .iter()
                .map(|c| CertificateDer::from(c.as_der().to_vec()))
                .collect();
            let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(chain.key().to_vec()));
            ClientIdentity { chain: certs, key }
        }
        StoreType::Pem => load_pem_identity(path, &data, password)?,
    };

    if identity.chain.is_empty() {
        return Err(Error::KeyAccess {
            path: path.to_path_buf(),
            reason: "private key has no certificate chain".into(),
        });
    }

    provider
        .key_provider
        .load_private_key(identity.key.clone_key())
        .map_err(|e| Error::Algorithm {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(identity)
}

fn integrity(path: &Path, cause: impl Into<BoxError>) -> Error {
    Error::Integrity {
        path: path.to_path_buf(),
        source: cause.into(),
    }
}

fn open_pkcs12(path: &Path, data: &[u8], password: &str) -> Result<KeyStore> {
    KeyStore::from_pkcs12(data, password).map_err(|e| integrity(path, e))
}

fn load_pem_identity(path: &Path, data: &[u8], password: &str) -> Result<ClientIdentity> {
    let blocks = pem::parse_many(data).map_err(|e| integrity(path, e))?;

    let mut chain = Vec::new();
    let mut key = None;

    for block in blocks {
        let tag = block.tag().to_string();
        match tag.as_str() {
            "CERTIFICATE" => chain.push(CertificateDer::from(block.into_contents())),
            "ENCRYPTED PRIVATE KEY" => {
                let der = decrypt_pkcs8(path, block.contents(), password)?;
                key = Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der.to_vec())));
            }
            "PRIVATE KEY" => {
                key = Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                    block.into_contents(),
                )));
            }
            "RSA PRIVATE KEY" => {
                key = Some(PrivateKeyDer::Pkcs1(block.into_contents().into()));
            }
            "EC PRIVATE KEY" => {
                key = Some(PrivateKeyDer::Sec1(block.into_contents().into()));
            }
            other => {
                debug!("Ignoring PEM block '{}' in {}", other, path.display());
            }
        }
    }

    let key = key.ok_or_else(|| Error::KeyAccess {
        path: path.to_path_buf(),
        reason: "no private key block found".into(),
    })?;

    Ok(ClientIdentity { chain, key })
}

fn decrypt_pkcs8(path: &Path, der: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>> {
    use pkcs8::der::Decode;
    use pkcs8::EncryptedPrivateKeyInfo;

    let encrypted = EncryptedPrivateKeyInfo::from_der(der).map_err(|e| integrity(path, e))?;
    let decrypted = encrypted.decrypt(password).map_err(|e| integrity(path, e))?;

    Ok(Zeroizing::new(decrypted.as_bytes().to_vec()))
}
