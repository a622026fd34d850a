//! TLS certificate management for the RemoteStash server.
//!
//! Provides self-signed certificate generation and RustlsConfig loading.
//! The server is TLS-only; a missing certificate pair is fatal at startup.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Resolved TLS certificate paths.
pub struct TlsCertPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsCertPaths {
    /// Resolve the default certificate paths (~/.remotestash/{cert,key}.pem).
    pub fn resolve() -> Result<Self> {
        let dir = directories::BaseDirs::new()
            .context("Could not determine certificate directory (HOME not set?)")?
            .home_dir()
            .join(".remotestash");

        Ok(Self {
            cert: dir.join("cert.pem"),
            key: dir.join("key.pem"),
        })
    }

    /// Check if both cert and key exist.
    pub fn exists(&self) -> bool {
        self.cert.exists() && self.key.exists()
    }
}

/// Generate a self-signed certificate and key.
pub fn generate_self_signed(hostname: &str, paths: &TlsCertPaths) -> Result<()> {
    use rcgen::{generate_simple_self_signed, CertifiedKey};

    if let Some(parent) = paths.cert.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cert directory: {}", parent.display()))?;
    }

    let subject_alt_names = vec![
        hostname.to_string(),
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ];

    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(subject_alt_names)
        .context("Failed to generate self-signed certificate")?;

    std::fs::write(&paths.cert, cert.pem())
        .with_context(|| format!("Failed to write certificate to {}", paths.cert.display()))?;

    std::fs::write(&paths.key, key_pair.serialize_pem())
        .with_context(|| format!("Failed to write private key to {}", paths.key.display()))?;

    Ok(())
}

/// Load TLS configuration from the certificate files.
pub async fn load_rustls_config(
    paths: &TlsCertPaths,
) -> Result<axum_server::tls_rustls::RustlsConfig> {
    if !paths.exists() {
        anyhow::bail!(
            "TLS certificates not found.\n\
             Expected:\n  cert: {}\n  key: {}\n\n\
             Generate certificates with:\n  remotestash generate-cert --hostname <your-hostname>",
            paths.cert.display(),
            paths.key.display()
        );
    }

    axum_server::tls_rustls::RustlsConfig::from_pem_file(&paths.cert, &paths.key)
        .await
        .with_context(|| {
            format!(
                "Failed to load TLS config from {} and {}",
                paths.cert.display(),
                paths.key.display()
            )
        })
}
