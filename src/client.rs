// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! HTTPS client bound to a [`SecurityContext`].

use crate::context::SecurityContext;
use crate::error::{Error, Result};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Bytes;
use hyper::{Method, Request, Response, Uri};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use std::error::Error as StdError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Issues HTTP/1.1 requests over TLS using one [`SecurityContext`].
///
/// Each request opens its own connection; nothing is pooled or retried.
#[derive(Clone)]
pub struct HttpsClient {
    connector: TlsConnector,
    context: SecurityContext,
    connect_timeout: Duration,
    max_body_size: usize,
}

impl HttpsClient {
    pub fn new(context: SecurityContext) -> Self {
        Self {
            connector: context.connector(),
            context,
            connect_timeout: crate::config::DEFAULT_CONNECT_TIMEOUT,
            max_body_size: crate::config::DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn context(&self) -> &SecurityContext {
        &self.context
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub async fn get(&self, uri: &str) -> Result<Response<Bytes>> {
        self.send(build_request(Method::GET, uri, Bytes::new())?)
            .await
    }

    pub async fn post(&self, uri: &str, body: impl Into<Bytes>) -> Result<Response<Bytes>> {
        self.send(build_request(Method::POST, uri, body.into())?)
            .await
    }

    /// Send one request and collect the full response body.
    pub async fn send(&self, req: Request<Full<Bytes>>) -> Result<Response<Bytes>> {
        let target = Target::from_uri(req.uri())?;
        let addr = format!("{}:{}", target.host, target.port);

        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Connect {
                addr: addr.clone(),
                reason: format!("timed out after {}s", self.connect_timeout.as_secs()),
            })?
            .map_err(|e| Error::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let server_name = ServerName::try_from(target.host.clone()).map_err(|e| {
            Error::InvalidUri {
                uri: req.uri().to_string(),
                reason: e.to_string(),
            }
        })?;

        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Handshake {
                host: target.host.clone(),
                source: e,
            })?;
        debug!("TLS session established with {}", addr);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls))
            .await
            .map_err(|e| Error::Http(format!("HTTP handshake with {} failed: {}", addr, e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Connection closed with error: {}", e);
            }
        });

        let req = into_origin_form(req, &target)?;
        let response = sender
            .send_request(req)
            .await
            .map_err(|e| classify_hyper_error(&target.host, e))?;

        let (parts, body) = response.into_parts();
        let body = Limited::new(body, self.max_body_size)
            .collect()
            .await
            .map_err(|e| {
                Error::Http(format!(
                    "Failed to read response body (limit {} bytes): {}",
                    self.max_body_size, e
                ))
            })?
            .to_bytes();

        Ok(Response::from_parts(parts, body))
    }
}

impl std::fmt::Debug for HttpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpsClient")
            .field("context", &self.context)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

fn build_request(method: Method, uri: &str, body: Bytes) -> Result<Request<Full<Bytes>>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(body))
        .map_err(|e| Error::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })
}

#[derive(Debug, PartialEq, Eq)]
struct Target {
    host: String,
    port: u16,
    authority: String,
}

impl Target {
    fn from_uri(uri: &Uri) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        match uri.scheme_str() {
            Some("https") => {}
            Some(other) => return Err(invalid(&format!("unsupported scheme '{}'", other))),
            None => return Err(invalid("missing scheme")),
        }

        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            host,
            port: authority.port_u16().unwrap_or(443),
            authority: authority.as_str().to_string(),
        })
    }
}

/// Rewrite an absolute-form request into origin-form with a Host header.
fn into_origin_form(req: Request<Full<Bytes>>, target: &Target) -> Result<Request<Full<Bytes>>> {
    let (mut parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    parts.uri = path.parse::<Uri>().map_err(|e| Error::InvalidUri {
        uri: path.to_string(),
        reason: e.to_string(),
    })?;

    if !parts.headers.contains_key(hyper::header::HOST) {
        let value = target.authority.parse().map_err(|_| Error::InvalidUri {
            uri: target.authority.clone(),
            reason: "invalid Host header".to_string(),
        })?;
        parts.headers.insert(hyper::header::HOST, value);
    }

    Ok(Request::from_parts(parts, body))
}

/// With TLS 1.3 the server checks the client certificate after the client
/// considers the handshake done, so a rejection surfaces on the first read.
fn classify_hyper_error(host: &str, err: hyper::Error) -> Error {
    match tls_failure(&err) {
        Some(reason) => Error::Handshake {
            host: host.to_string(),
            source: std::io::Error::other(reason),
        },
        None => Error::Http(format!("Request to {} failed: {}", host, err)),
    }
}

fn tls_failure(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(tls.to_string());
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(tls) = io.get_ref().and_then(|i| i.downcast_ref::<rustls::Error>()) {
                return Some(tls.to_string());
            }
        }
        current = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn client() -> HttpsClient {
        let ctx = SecurityContext::assemble(
            std::sync::Arc::new(rustls::crypto::ring::default_provider()),
            None,
            None,
        )
        .unwrap();
        HttpsClient::new(ctx)
    }

    #[test]
    fn test_target_defaults_to_port_443() {
        let uri: Uri = "https://example.com/path?q=1".parse().unwrap();
        let target = Target::from_uri(&uri).unwrap();

        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);
        assert_eq!(target.authority, "example.com");
    }

    #[test]
    fn test_target_explicit_port_and_ipv6() {
        let uri: Uri = "https://[::1]:8443/".parse().unwrap();
        let target = Target::from_uri(&uri).unwrap();

        assert_eq!(target.host, "::1");
        assert_eq!(target.port, 8443);
    }

    #[test]
    fn test_target_rejects_plain_http() {
        let uri: Uri = "http://example.com/".parse().unwrap();
        let err = Target::from_uri(&uri).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidUri);
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_target_rejects_relative_uri() {
        let uri: Uri = "/just/a/path".parse().unwrap();
        assert!(Target::from_uri(&uri).is_err());
    }

    #[test]
    fn test_origin_form_sets_host() {
        let uri: Uri = "https://example.com:8443/a/b?c=d".parse().unwrap();
        let target = Target::from_uri(&uri).unwrap();
        let req = build_request(Method::GET, "https://example.com:8443/a/b?c=d", Bytes::new())
            .unwrap();

        let req = into_origin_form(req, &target).unwrap();
        assert_eq!(req.uri().to_string(), "/a/b?c=d");
        assert_eq!(
            req.headers().get(hyper::header::HOST).unwrap(),
            "example.com:8443"
        );
    }

    #[test]
    fn test_defaults_and_overrides() {
        let client = client();
        assert_eq!(client.connect_timeout(), Duration::from_secs(10));

        let client = client
            .with_connect_timeout(Duration::from_secs(2))
            .with_max_body_size(2048);
        assert_eq!(client.connect_timeout(), Duration::from_secs(2));
        assert_eq!(client.max_body_size(), 2048);
        assert!(!client.context().has_custom_trust());
    }

    #[tokio::test]
    async fn test_get_rejects_http_scheme() {
        let err = client().get("http://127.0.0.1:1/").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUri);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = client()
            .get(&format!("https://127.0.0.1:{}/", port))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
    }

    #[test]
    fn test_tls_failure_found_inside_io_error() {
        let io = std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            rustls::Error::AlertReceived(rustls::AlertDescription::CertificateRequired),
        );
        assert!(tls_failure(&io).is_some());

        let plain = std::io::Error::other("connection reset");
        assert!(tls_failure(&plain).is_none());
    }
}
