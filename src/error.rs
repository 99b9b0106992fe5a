// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of an [`Error`].
///
/// Callers that only need to decide how to react to a failed build or request
/// should match on this rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A store path was given but does not point at a usable file, or the
    /// settings file is invalid.
    Configuration,
    /// A store was read but could not be unlocked or verified.
    Integrity,
    /// Key material uses an algorithm the crypto provider does not support.
    Algorithm,
    /// A key store holds no usable private key.
    KeyAccess,
    /// The TLS client configuration could not be assembled.
    ContextInit,
    /// A sealed secret could not be revealed.
    Secret,
    /// The TCP connection could not be established.
    Connect,
    /// The TLS handshake with the peer failed.
    Handshake,
    /// The HTTP exchange failed after the handshake.
    Http,
    /// The request target is not a usable https URI.
    InvalidUri,
}

/// Underlying cause carried by errors that wrap third-party parsers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("TLS Exception :: {0} does not exist")]
    StoreNotFound(String),

    #[error("Failed to read store {path}: {source}")]
    ReadStore {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid path (non-UTF8): {0}")]
    InvalidPath(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load store {path}: password verification failed ({source})")]
    Integrity {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Unsupported key algorithm in {path}: {reason}")]
    Algorithm { path: PathBuf, reason: String },

    #[error("No usable private key in {path}: {reason}")]
    KeyAccess { path: PathBuf, reason: String },

    #[error("Failed to initialize TLS context: {0}")]
    ContextInit(#[from] rustls::Error),

    #[error("Failed to reveal sealed secret: {0}")]
    Secret(String),

    #[error("Failed to export store: {0}")]
    Export(String),

    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Invalid request URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StoreNotFound(_)
            | Error::ReadStore { .. }
            | Error::ReadFile { .. }
            | Error::WriteFile { .. }
            | Error::InvalidPath(_)
            | Error::Config(_)
            | Error::Export(_) => ErrorKind::Configuration,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::Algorithm { .. } => ErrorKind::Algorithm,
            Error::KeyAccess { .. } => ErrorKind::KeyAccess,
            Error::ContextInit(_) => ErrorKind::ContextInit,
            Error::Secret(_) => ErrorKind::Secret,
            Error::Connect { .. } => ErrorKind::Connect,
            Error::Handshake { .. } => ErrorKind::Handshake,
            Error::Http(_) => ErrorKind::Http,
            Error::InvalidUri { .. } => ErrorKind::InvalidUri,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
