//! Shared fixtures: a throwaway PKI and a local HTTPS server.

#![allow(dead_code)]

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub const STORE_PASSWORD: &str = "password";
pub const KEY_PASSWORD: &str = "password2";

/// A leaf certificate and its private key.
pub struct Leaf {
    pub cert_pem: String,
    pub cert_der: CertificateDer<'static>,
    pub key_pem: String,
    pub key_der: Vec<u8>,
}

/// A CA able to sign server and client leaves.
pub struct TestCa {
    pub cert_pem: String,
    pub cert_der: CertificateDer<'static>,
    issuer: Issuer<'static, KeyPair>,
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let key = KeyPair::generate().expect("CA key pair should be generated");
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        set_validity(&mut params);

        let cert = params.self_signed(&key).expect("CA should self-sign");
        Self {
            cert_pem: cert.pem(),
            cert_der: cert.der().clone(),
            issuer: Issuer::new(params, key),
        }
    }

    pub fn server_leaf(&self) -> Leaf {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "localhost");
        params.subject_alt_names = vec![
            SanType::DnsName("localhost".try_into().expect("valid DNS name")),
            SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        self.sign(params)
    }

    pub fn client_leaf(&self, name: &str) -> Leaf {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        self.sign(params)
    }

    fn sign(&self, mut params: CertificateParams) -> Leaf {
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        set_validity(&mut params);

        let key = KeyPair::generate().expect("leaf key pair should be generated");
        let cert: Certificate = params
            .signed_by(&key, &self.issuer)
            .expect("leaf should be signed");
        Leaf {
            cert_pem: cert.pem(),
            cert_der: cert.der().clone(),
            key_pem: key.serialize_pem(),
            key_der: key.serialize_der(),
        }
    }
}

fn set_validity(params: &mut CertificateParams) {
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::days(1);
    params.not_after = now + time::Duration::days(30);
}

/// Trusted CA, a server certificate it issued, a client certificate it
/// issued, and a second unrelated CA with its own client and server.
pub struct Pki {
    pub dir: TempDir,
    pub ca: TestCa,
    pub server: Leaf,
    pub client: Leaf,
    pub rogue_ca: TestCa,
    pub rogue_client: Leaf,
    pub rogue_server: Leaf,
}

impl Pki {
    pub fn new() -> Self {
        let ca = TestCa::new("tlsconn Test CA");
        let rogue_ca = TestCa::new("Unknown CA");
        Self {
            dir: TempDir::new().expect("temp dir should be created"),
            server: ca.server_leaf(),
            client: ca.client_leaf("tlsconn test client"),
            rogue_client: rogue_ca.client_leaf("unknown client"),
            rogue_server: rogue_ca.server_leaf(),
            ca,
            rogue_ca,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// PKCS#12 trust store holding the trusted CA.
    pub fn trust_store(&self) -> String {
        self.write_trust_store("truststore.p12", &self.ca.cert_pem)
    }

    /// PKCS#12 trust store holding only the unrelated CA.
    pub fn rogue_trust_store(&self) -> String {
        self.write_trust_store("rogue-truststore.p12", &self.rogue_ca.cert_pem)
    }

    /// PKCS#12 key store with the trusted client identity.
    pub fn key_store(&self) -> String {
        self.write_key_store("keystore.p12", &self.client)
    }

    /// PKCS#12 key store with a client identity no server trusts.
    pub fn rogue_key_store(&self) -> String {
        self.write_key_store("rogue-keystore.p12", &self.rogue_client)
    }

    fn write_trust_store(&self, name: &str, pem: &str) -> String {
        let path = self.path(name);
        tlsconn::export_trust_store(&path, pem, STORE_PASSWORD)
            .expect("trust store should be written");
        path.to_string_lossy().to_string()
    }

    fn write_key_store(&self, name: &str, leaf: &Leaf) -> String {
        let path = self.path(name);
        tlsconn::export_key_store(&path, &leaf.cert_pem, &leaf.key_pem, KEY_PASSWORD)
            .expect("key store should be written");
        path.to_string_lossy().to_string()
    }
}

/// Whether the test server demands a client certificate.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    None,
    Required,
}

/// Handle to a running test server. The accept loop stops when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn server_config(pki: &Pki, server: &Leaf, auth: ClientAuth) -> ServerConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .expect("protocol versions should be supported");

    let builder = match auth {
        ClientAuth::None => builder.with_no_client_auth(),
        ClientAuth::Required => {
            let mut roots = RootCertStore::empty();
            roots
                .add(pki.ca.cert_der.clone())
                .expect("CA should be a valid anchor");
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .expect("client verifier should build");
            builder.with_client_cert_verifier(verifier)
        }
    };

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(server.key_der.clone()));
    builder
        .with_single_cert(vec![server.cert_der.clone()], key)
        .expect("server certificate should be accepted")
}

/// Start an HTTPS server on 127.0.0.1 presenting the trusted server leaf.
pub async fn start_server(pki: &Pki, auth: ClientAuth) -> TestServer {
    start_server_with(server_config(pki, &pki.server, auth)).await
}

/// Start an HTTPS server presenting a certificate from the unrelated CA.
pub async fn start_rogue_server(pki: &Pki) -> TestServer {
    start_server_with(server_config(pki, &pki.rogue_server, ClientAuth::None)).await
}

async fn start_server_with(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener has an address");
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let task = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(stream).await else {
                    return;
                };
                let peer_certs = tls
                    .get_ref()
                    .1
                    .peer_certificates()
                    .map(|c| c.len())
                    .unwrap_or(0);

                let service = service_fn(move |req: Request<Incoming>| async move {
                    let body = format!("hello {} client_certs={}", req.uri().path(), peer_certs);
                    Ok::<_, hyper::Error>(Response::new(Full::new(Bytes::from(body))))
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(tls), service)
                    .await;
            });
        }
    });

    TestServer { addr, task }
}
