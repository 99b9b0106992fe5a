// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Throwaway CA and client certificate for unit tests.

use crate::export::{export_key_store, export_pem_key_store, export_trust_store};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    KeyUsagePurpose,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TEST_CA_NAME: &str = "tlsconn Test CA";

fn with_newline(mut pem: String) -> String {
    if !pem.ends_with('\n') {
        pem.push('\n');
    }
    pem
}

pub struct TestPki {
    dir: TempDir,
    ca_pem: String,
    ca_der: Vec<u8>,
    client_pem: String,
    client_der: Vec<u8>,
    client_key_pem: String,
}

impl TestPki {
    pub fn new() -> Self {
        let now = time::OffsetDateTime::now_utc();

        let ca_key = KeyPair::generate().expect("CA key pair should be generated");
        let mut ca_params = CertificateParams::default();
        ca_params
            .distinguished_name
            .push(DnType::CommonName, TEST_CA_NAME);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        ca_params.not_before = now - time::Duration::days(1);
        ca_params.not_after = now + time::Duration::days(365);
        let ca_cert = ca_params
            .self_signed(&ca_key)
            .expect("CA certificate should be self-signed");
        let issuer = Issuer::new(ca_params, ca_key);

        let client_key = KeyPair::generate().expect("client key pair should be generated");
        let mut client_params = CertificateParams::default();
        client_params
            .distinguished_name
            .push(DnType::CommonName, "tlsconn test client");
        client_params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        client_params.not_before = now - time::Duration::days(1);
        client_params.not_after = now + time::Duration::days(90);
        let client_cert = client_params
            .signed_by(&client_key, &issuer)
            .expect("client certificate should be signed");

        Self {
            dir: TempDir::new().expect("temp dir should be created"),
            ca_pem: with_newline(ca_cert.pem()),
            ca_der: ca_cert.der().to_vec(),
            client_pem: with_newline(client_cert.pem()),
            client_der: client_cert.der().to_vec(),
            client_key_pem: client_key.serialize_pem(),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("fixture file should be written");
        path
    }

    pub fn ca_pem(&self) -> String {
        self.ca_pem.clone()
    }

    pub fn ca_der(&self) -> Vec<u8> {
        self.ca_der.clone()
    }

    pub fn client_cert_pem(&self) -> String {
        self.client_pem.clone()
    }

    pub fn client_der(&self) -> Vec<u8> {
        self.client_der.clone()
    }

    pub fn client_key_pem(&self) -> String {
        self.client_key_pem.clone()
    }

    /// PKCS#12 store trusting the test CA.
    pub fn trust_store(&self, password: &str) -> PathBuf {
        let path = self.dir.path().join("truststore.p12");
        export_trust_store(&path, &self.ca_pem, password).expect("trust store should be written");
        path
    }

    /// PKCS#12 store holding the client key and certificate.
    pub fn key_store(&self, password: &str) -> PathBuf {
        let path = self.dir.path().join("keystore.p12");
        export_key_store(&path, &self.client_pem, &self.client_key_pem, password)
            .expect("key store should be written");
        path
    }

    /// PEM key store, key encrypted with `password`.
    pub fn pem_key_store(&self, password: &str) -> PathBuf {
        let path = self.dir.path().join("keystore.pem");
        export_pem_key_store(&path, &self.client_pem, &self.client_key_pem, password)
            .expect("PEM key store should be written");
        path
    }
}
