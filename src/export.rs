// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Writing trust and key stores that the builder can load.

use crate::error::{Error, Result};
use crate::fs::atomic_write_secret;
use p12_keystore::{Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};
use pkcs8::{LineEnding, PrivateKeyInfo};
use std::path::Path;
use zeroize::Zeroizing;

fn parse_certificates(certs_pem: &str) -> Result<Vec<Certificate>> {
    let blocks = pem::parse_many(certs_pem)
        .map_err(|e| Error::Export(format!("Failed to parse certificate PEM: {}", e)))?;

    let certs = blocks
        .iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| {
            Certificate::from_der(block.contents())
                .map_err(|e| Error::Export(format!("Failed to parse certificate DER: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

    if certs.is_empty() {
        return Err(Error::Export("No certificates found in PEM input".into()));
    }
    Ok(certs)
}

fn parse_private_key(key_pem: &str) -> Result<Zeroizing<Vec<u8>>> {
    let block = pem::parse(key_pem)
        .map_err(|e| Error::Export(format!("Failed to parse private key PEM: {}", e)))?;
    if block.tag() != "PRIVATE KEY" {
        return Err(Error::Export(format!(
            "Expected an unencrypted PKCS#8 PRIVATE KEY, got {}",
            block.tag()
        )));
    }
    Ok(Zeroizing::new(block.into_contents()))
}

/// Write a PKCS#12 trust store with one trusted-certificate entry per
/// certificate in `certs_pem`. Returns the number of entries written.
pub fn export_trust_store(path: &Path, certs_pem: &str, password: &str) -> Result<usize> {
    let certs = parse_certificates(certs_pem)?;
    let count = certs.len();

    let mut keystore = KeyStore::new();
    for (i, cert) in certs.into_iter().enumerate() {
        let alias = format!("trusted-{}", i + 1);
        keystore.add_entry(&alias, KeyStoreEntry::Certificate(cert));
    }

    let p12_data = keystore
        .writer(password)
        .write()
        .map_err(|e| Error::Export(format!("Failed to create PKCS12: {}", e)))?;

    atomic_write_secret(path, &p12_data)?;
    Ok(count)
}

/// Write a PKCS#12 key store holding a single private key and its chain.
pub fn export_key_store(path: &Path, chain_pem: &str, key_pem: &str, password: &str) -> Result<()> {
    let chain = parse_certificates(chain_pem)?;
    let key_der = parse_private_key(key_pem)?;

    let mut keystore = KeyStore::new();
    let key_chain = PrivateKeyChain::new(&key_der[..], [], chain);
    keystore.add_entry("client", KeyStoreEntry::PrivateKeyChain(key_chain));

    let p12_data = keystore
        .writer(password)
        .write()
        .map_err(|e| Error::Export(format!("Failed to create PKCS12: {}", e)))?;

    atomic_write_secret(path, &p12_data)
}

/// Write a PEM key store: the certificate chain followed by the private key,
/// encrypted with `password` unless it is empty.
pub fn export_pem_key_store(
    path: &Path,
    chain_pem: &str,
    key_pem: &str,
    password: &str,
) -> Result<()> {
    // Validates the chain before anything is written
    parse_certificates(chain_pem)?;

    let key_block = if password.is_empty() {
        Zeroizing::new(key_pem.to_string())
    } else {
        encrypt_key_pem(key_pem, password)?
    };

    let mut contents = Zeroizing::new(String::with_capacity(chain_pem.len() + key_block.len() + 1));
    contents.push_str(chain_pem.trim_end());
    contents.push('\n');
    contents.push_str(&key_block);

    atomic_write_secret(path, contents.as_bytes())
}

/// Encrypt a PEM private key with a password using PKCS#8 with AES-256-CBC
pub fn encrypt_key_pem(key_pem: &str, password: &str) -> Result<Zeroizing<String>> {
    use pkcs8::der::Decode;
    use rand::RngCore;

    if password.is_empty() {
        return Err(Error::Export("Password cannot be empty".to_string()));
    }

    let key_der = parse_private_key(key_pem)?;
    let pki = PrivateKeyInfo::from_der(&key_der)
        .map_err(|e| Error::Export(format!("Failed to parse key: {}", e)))?;

    let mut rng = rand::rng();
    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let encrypted = pki
        .encrypt_with_params(
            pkcs8::pkcs5::pbes2::Parameters::scrypt_aes256cbc(
                pkcs8::pkcs5::scrypt::Params::recommended(),
                &salt,
                &iv,
            )
            .map_err(|e| Error::Export(format!("Failed to create encryption params: {}", e)))?,
            password,
        )
        .map_err(|e| Error::Export(format!("Encryption failed: {}", e)))?;

    let pem_str = encrypted
        .to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
        .map_err(|e| Error::Export(format!("Failed to convert to PEM: {}", e)))?;

    Ok(Zeroizing::new(pem_str.to_string()))
}
