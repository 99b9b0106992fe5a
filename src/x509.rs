// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Summaries of X.509 certificates found in stores.

use crate::error::{Error, Result};
use ::time::OffsetDateTime;
use x509_parser::prelude::*;

/// Intended use, taken from the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertType {
    Server,
    Client,
    /// Both serverAuth and clientAuth.
    Dual,
    /// No EKU extension, or neither TLS purpose listed.
    Unknown,
}

impl CertType {
    fn from_eku(server_auth: bool, client_auth: bool) -> Self {
        match (server_auth, client_auth) {
            (true, true) => CertType::Dual,
            (true, false) => CertType::Server,
            (false, true) => CertType::Client,
            (false, false) => CertType::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub common_name: Option<String>,
    pub issuer_common_name: Option<String>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub is_ca: bool,
    pub cert_type: CertType,
}

impl CertInfo {
    /// `not_after` as `YYYY-MM-DD`.
    pub fn expiry_string(&self) -> String {
        let date = self.not_after.date();
        format!(
            "{}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    }

    /// Whole days until expiry; negative once expired.
    pub fn days_remaining(&self) -> i64 {
        (self.not_after - OffsetDateTime::now_utc()).whole_days()
    }

    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.not_after
    }

    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    pub fn display_name(&self) -> &str {
        self.common_name.as_deref().unwrap_or("<no CN>")
    }
}

fn first_common_name(name: &X509Name<'_>) -> Option<String> {
    name.iter_common_name()
        .find_map(|cn| cn.as_str().ok())
        .map(str::to_owned)
}

/// Parse a DER certificate into a [`CertInfo`].
pub fn parse_cert_der(der: &[u8]) -> Result<CertInfo> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::Config(format!("Invalid X.509 certificate: {}", e)))?;

    let is_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .map(|ext| ext.value.ca)
        .unwrap_or(false);

    let cert_type = cert
        .extended_key_usage()
        .ok()
        .flatten()
        .map(|ext| CertType::from_eku(ext.value.server_auth, ext.value.client_auth))
        .unwrap_or(CertType::Unknown);

    let validity = cert.validity();
    Ok(CertInfo {
        common_name: first_common_name(cert.subject()),
        issuer_common_name: first_common_name(cert.issuer()),
        not_before: validity.not_before.to_datetime(),
        not_after: validity.not_after.to_datetime(),
        is_ca,
        cert_type,
    })
}
