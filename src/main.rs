// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tlsconn::{
    export_key_store, export_trust_store, load_key_store, load_trust_store, parse_cert_der,
    CertInfo, CertType, Error, ErrorKind, Result, SecureContextBuilder, SessionSealer, Settings,
    StoreType,
};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

// ============================================================================
// Helper functions
// ============================================================================

/// Read a password from the named environment variable, or prompt for one.
fn read_password(env_var: Option<&str>, prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(name) = env_var {
        return std::env::var(name)
            .map(Zeroizing::new)
            .map_err(|_| Error::Config(format!("Environment variable {} is not set", name)));
    }

    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .map_err(|e| Error::Config(format!("Failed to read password: {}", e)))
}

/// Prompt for a new store password with confirmation
fn prompt_new_password() -> Result<Zeroizing<String>> {
    let password = Zeroizing::new(
        rpassword::prompt_password("Enter store password: ")
            .map_err(|e| Error::Config(format!("Failed to read password: {}", e)))?,
    );
    let confirm = Zeroizing::new(
        rpassword::prompt_password("Confirm store password: ")
            .map_err(|e| Error::Config(format!("Failed to read password: {}", e)))?,
    );

    if *password != *confirm {
        return Err(Error::Config("Passwords do not match".to_string()));
    }
    if password.is_empty() {
        return Err(Error::Config("Password cannot be empty".to_string()));
    }

    Ok(password)
}

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn describe_cert(info: &CertInfo) -> String {
    let kind = match info.cert_type {
        _ if info.is_ca => "CA",
        CertType::Server => "server",
        CertType::Client => "client",
        CertType::Dual => "server+client",
        CertType::Unknown => "unspecified",
    };
    let status = if info.is_expired() {
        "EXPIRED".to_string()
    } else {
        format!("{} days left", info.days_remaining())
    };
    format!(
        "{} [{}] issued by {}, expires {} ({})",
        info.display_name(),
        kind,
        info.issuer_common_name.as_deref().unwrap_or("unknown"),
        info.expiry_string(),
        status
    )
}

// ============================================================================
// CLI definitions
// ============================================================================

#[derive(Parser)]
#[command(name = "tlsconn")]
#[command(about = "Build TLS client contexts from trust and key stores")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    tlsconn check --trust-store truststore.p12
    tlsconn request https://api.internal/health --key-store client.p12
    tlsconn inspect client.p12
    tlsconn bundle trust ca.pem --out truststore.p12

Store passwords are read from TLSCONN_TRUST_STORE_PASSWORD and
TLSCONN_KEY_STORE_PASSWORD unless the settings file names other variables.")]
struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Settings file (default: $TLSCONN_CONFIG or the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct StoreArgs {
    /// Trust store path (overrides settings)
    #[arg(long)]
    trust_store: Option<String>,

    /// Key store path (overrides settings)
    #[arg(long)]
    key_store: Option<String>,

    /// Store format: pkcs12 or pem (overrides settings)
    #[arg(long)]
    store_type: Option<StoreType>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the security context and report what it contains
    Check {
        #[command(flatten)]
        stores: StoreArgs,
    },

    /// Send one HTTPS request using the configured stores
    Request {
        /// Target URL (https only)
        url: String,

        /// HTTP method
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,

        /// Request body; use '-' to read from stdin
        #[arg(long, short = 'd')]
        data: Option<String>,

        #[command(flatten)]
        stores: StoreArgs,
    },

    /// List the certificates and key entries in a store
    Inspect {
        /// Store file
        path: PathBuf,

        /// Store format: pkcs12 or pem (default: from file extension)
        #[arg(long)]
        store_type: Option<StoreType>,

        /// Environment variable holding the store password
        #[arg(long)]
        password_env: Option<String>,
    },

    /// Convert PEM files into a PKCS#12 store
    Bundle {
        #[command(subcommand)]
        kind: BundleKind,
    },
}

#[derive(Subcommand)]
enum BundleKind {
    /// Trust store with one entry per certificate
    Trust {
        /// PEM file with one or more CA certificates
        certs: PathBuf,

        /// Output PKCS#12 file
        #[arg(long, short)]
        out: PathBuf,

        /// Environment variable holding the store password (default: prompt)
        #[arg(long)]
        password_env: Option<String>,
    },

    /// Key store with a private key and its certificate chain
    Key {
        /// PEM file with the certificate chain, leaf first
        #[arg(long)]
        cert: PathBuf,

        /// PEM file with an unencrypted PKCS#8 private key
        #[arg(long)]
        key: PathBuf,

        /// Output PKCS#12 file
        #[arg(long, short)]
        out: PathBuf,

        /// Environment variable holding the store password (default: prompt)
        #[arg(long)]
        password_env: Option<String>,
    },
}

/// Output helper that respects quiet and verbose modes
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }

    /// Print a standard message (suppressed with --quiet)
    fn print(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a verbose message (only shown with --verbose)
    fn verbose(&self, msg: &str) {
        if self.verbose {
            eprintln!("{}", msg);
        }
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "tlsconn=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("TLSCONN_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    let out = Output::new(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Check { stores } => {
            let settings = load_settings(cli.config.as_deref(), &stores)?;
            cmd_check(&out, &settings)
        }
        Commands::Request {
            url,
            method,
            data,
            stores,
        } => {
            let settings = load_settings(cli.config.as_deref(), &stores)?;
            cmd_request(&out, &settings, &url, &method, data)
        }
        Commands::Inspect {
            path,
            store_type,
            password_env,
        } => cmd_inspect(&out, &path, store_type, password_env.as_deref()),
        Commands::Bundle { kind } => cmd_bundle(&out, kind),
    }
}

fn load_settings(config: Option<&Path>, stores: &StoreArgs) -> Result<Settings> {
    let path = match config {
        Some(p) => p.to_path_buf(),
        None => Settings::default_path()?,
    };
    let mut settings = Settings::load(&path)?;
    tracing::debug!("Settings loaded from {}", path.display());

    if let Some(ts) = &stores.trust_store {
        settings.trust_store.path = Some(ts.clone());
    }
    if let Some(ks) = &stores.key_store {
        settings.key_store.path = Some(ks.clone());
    }
    if let Some(store_type) = stores.store_type {
        settings.store_type = store_type;
    }
    Ok(settings)
}

fn builder_for(settings: &Settings) -> Result<SecureContextBuilder> {
    let sealer = Arc::new(SessionSealer::new()?);
    Ok(SecureContextBuilder::from_settings(sealer, settings))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_check(out: &Output, settings: &Settings) -> Result<()> {
    let context = builder_for(settings)?.build_security_context()?;

    match context.trust_anchors() {
        Some(anchors) => {
            out.print(&format!(
                "Trust:    {} anchor(s) from {}",
                anchors.len(),
                settings.trust_store.path.as_deref().unwrap_or("")
            ));
            for anchor in anchors {
                if let Ok(info) = parse_cert_der(anchor) {
                    out.verbose(&format!("  - {}", describe_cert(&info)));
                }
            }
        }
        None => out.print("Trust:    platform default roots"),
    }

    match context.identity_chain() {
        Some(chain) => {
            let leaf = chain.first().map(|c| parse_cert_der(c)).transpose()?;
            match leaf {
                Some(info) => out.print(&format!("Identity: {}", describe_cert(&info))),
                None => out.print("Identity: (empty chain)"),
            }
            out.verbose(&format!("  chain length: {}", chain.len()));
        }
        None => out.print("Identity: none (one-way authentication)"),
    }

    out.print("Security context OK");
    Ok(())
}

fn cmd_request(
    out: &Output,
    settings: &Settings,
    url: &str,
    method: &str,
    data: Option<String>,
) -> Result<()> {
    let method = hyper::Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| Error::Config(format!("Invalid HTTP method: {}", method)))?;

    let body = match data.as_deref() {
        Some("-") => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|e| Error::Config(format!("Failed to read stdin: {}", e)))?;
            buf
        }
        Some(s) => s.as_bytes().to_vec(),
        None => Vec::new(),
    };

    let client = builder_for(settings)?.build_http_client()?;
    let request = hyper::Request::builder()
        .method(method)
        .uri(url)
        .body(http_body_util::Full::new(hyper::body::Bytes::from(body)))
        .map_err(|e| Error::InvalidUri {
            uri: url.to_string(),
            reason: e.to_string(),
        })?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Config(format!("Failed to create runtime: {}", e)))?;
    let response = runtime.block_on(client.send(request))?;

    out.verbose(&format!("HTTP {}", response.status()));
    for (name, value) in response.headers() {
        out.verbose(&format!("{}: {}", name, value.to_str().unwrap_or("<binary>")));
    }

    use std::io::Write;
    let mut stdout = std::io::stdout();
    stdout
        .write_all(response.body())
        .and_then(|_| stdout.flush())
        .map_err(|e| Error::Http(format!("Failed to write response: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::Http(format!("Server returned {}", response.status())));
    }
    Ok(())
}

fn guess_store_type(path: &Path) -> StoreType {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.parse().ok())
        .unwrap_or_default()
}

fn cmd_inspect(
    out: &Output,
    path: &Path,
    store_type: Option<StoreType>,
    password_env: Option<&str>,
) -> Result<()> {
    let file = tlsconn::check_file(&path.to_string_lossy())?;
    let store_type = store_type.unwrap_or_else(|| guess_store_type(&file));

    let password = match (store_type, password_env) {
        (StoreType::Pem, None) => Zeroizing::new(String::new()),
        (_, env) => read_password(env, "Store password: ")?,
    };

    let certs = load_trust_store(&file, &password, store_type)?;
    out.print(&format!(
        "{} ({}): {} certificate(s)",
        file.display(),
        store_type,
        certs.len()
    ));
    for cert in &certs {
        let info = parse_cert_der(cert)?;
        out.print(&format!("  - {}", describe_cert(&info)));
    }

    let provider = rustls::crypto::ring::default_provider();
    match load_key_store(&file, &password, store_type, &provider) {
        Ok(identity) => out.print(&format!(
            "Private key: present (chain of {})",
            identity.chain.len()
        )),
        Err(e) if e.kind() == ErrorKind::KeyAccess => out.print("Private key: none"),
        Err(e) => return Err(e),
    }

    Ok(())
}

fn cmd_bundle(out: &Output, kind: BundleKind) -> Result<()> {
    let password_for = |env: Option<&str>| match env {
        Some(_) => read_password(env, ""),
        None => prompt_new_password(),
    };

    match kind {
        BundleKind::Trust {
            certs,
            out: dest,
            password_env,
        } => {
            let pem = read_pem(&certs)?;
            let password = password_for(password_env.as_deref())?;
            let count = export_trust_store(&dest, &pem, &password)?;
            out.print(&format!(
                "Wrote trust store {} with {} certificate(s)",
                dest.display(),
                count
            ));
        }
        BundleKind::Key {
            cert,
            key,
            out: dest,
            password_env,
        } => {
            let chain = read_pem(&cert)?;
            let key_pem = Zeroizing::new(read_pem(&key)?);
            let password = password_for(password_env.as_deref())?;
            export_key_store(&dest, &chain, &key_pem, &password)?;
            out.print(&format!("Wrote key store {}", dest.display()));
        }
    }

    Ok(())
}
