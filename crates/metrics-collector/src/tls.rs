use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

/// TLS material loaded from the directory named by `-crypto-key`/`CRYPTO_KEY`.
///
/// Expected layout: `server.crt` + `server.key` for the server identity, and
/// an optional `client-ca.crt` that, when present, turns on mTLS: the
/// collector then requires and verifies a client certificate against that
/// root on every connection.
pub(crate) struct TlsMaterial {
    dir: PathBuf,
}

impl TlsMaterial {
    pub(crate) fn from_dir(dir: &Path) -> Self {
        TlsMaterial { dir: dir.to_path_buf() }
    }

    pub(crate) async fn rustls_config(&self) -> Result<RustlsConfig> {
        let cert_path = self.dir.join("server.crt");
        let key_path = self.dir.join("server.key");
        let certs = load_certs(&cert_path)
            .with_context(|| format!("failed to load TLS certificate '{}'", cert_path.display()))?;
        let key = load_private_key(&key_path)
            .with_context(|| format!("failed to load TLS private key '{}'", key_path.display()))?;

        let client_ca_path = self.dir.join("client-ca.crt");
        let server_config = if client_ca_path.exists() {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(&client_ca_path)? {
                roots
                    .add(cert)
                    .context("failed to add client CA certificate to root store")?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .context("failed to build mTLS client certificate verifier")?;
            ServerConfig::builder()
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
                .context("failed to build mTLS server config")?
        } else {
            ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(certs, key)
                .context("failed to build TLS server config")?
        };

        Ok(RustlsConfig::from_config(Arc::new(server_config)))
    }

    pub(crate) fn mtls_enabled(&self) -> bool {
        self.dir.join("client-ca.crt").exists()
    }
}

fn load_certs(path: &Path) -> Result<Vec<rustls_pki_types::CertificateDer<'static>>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse PEM certificates")
}

fn load_private_key(path: &Path) -> Result<rustls_pki_types::PrivateKeyDer<'static>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .context("failed to parse PEM private key")?
        .ok_or_else(|| anyhow::anyhow!("no private key found in '{}'", path.display()))
}
