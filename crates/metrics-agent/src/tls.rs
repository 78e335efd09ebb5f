use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Client-side TLS material loaded from the directory named by
/// `-crypto-key`/`CRYPTO_KEY`. Expected layout: `ca.crt` (the collector's
/// root, or the CA that issued its certificate) plus an optional
/// `client.crt`/`client.key` pair that, when both present, is presented as
/// the client identity for mTLS.
pub(crate) struct ClientTlsMaterial {
    dir: PathBuf,
}

impl ClientTlsMaterial {
    pub(crate) fn from_dir(dir: &Path) -> Self {
        ClientTlsMaterial { dir: dir.to_path_buf() }
    }

    fn ca_path(&self) -> PathBuf {
        self.dir.join("ca.crt")
    }

    fn client_cert_path(&self) -> PathBuf {
        self.dir.join("client.crt")
    }

    fn client_key_path(&self) -> PathBuf {
        self.dir.join("client.key")
    }

    fn has_client_identity(&self) -> bool {
        self.client_cert_path().exists() && self.client_key_path().exists()
    }

    /// Builds the root certificate and optional client identity `reqwest`
    /// needs for the HTTPS transport.
    pub(crate) async fn reqwest_material(&self) -> Result<(reqwest::Certificate, Option<reqwest::Identity>)> {
        let ca_bytes = tokio::fs::read(self.ca_path())
            .await
            .with_context(|| format!("failed to read CA certificate '{}'", self.ca_path().display()))?;
        let ca = reqwest::Certificate::from_pem(&ca_bytes).context("failed to parse CA certificate")?;

        let identity = if self.has_client_identity() {
            let mut combined = tokio::fs::read(self.client_cert_path()).await.with_context(|| {
                format!("failed to read client certificate '{}'", self.client_cert_path().display())
            })?;
            let mut key = tokio::fs::read(self.client_key_path()).await.with_context(|| {
                format!("failed to read client key '{}'", self.client_key_path().display())
            })?;
            combined.append(&mut key);
            Some(reqwest::Identity::from_pem(&combined).context("failed to build client TLS identity")?)
        } else {
            None
        };

        Ok((ca, identity))
    }

    /// Builds the `tonic` client TLS config for the gRPC transport.
    pub(crate) async fn tonic_tls_config(&self) -> Result<tonic::transport::ClientTlsConfig> {
        let ca_bytes = tokio::fs::read(self.ca_path())
            .await
            .with_context(|| format!("failed to read CA certificate '{}'", self.ca_path().display()))?;
        let mut config = tonic::transport::ClientTlsConfig::new()
            .ca_certificate(tonic::transport::Certificate::from_pem(ca_bytes));

        if self.has_client_identity() {
            let cert = tokio::fs::read(self.client_cert_path()).await.with_context(|| {
                format!("failed to read client certificate '{}'", self.client_cert_path().display())
            })?;
            let key = tokio::fs::read(self.client_key_path()).await.with_context(|| {
                format!("failed to read client key '{}'", self.client_key_path().display())
            })?;
            config = config.identity(tonic::transport::Identity::from_pem(cert, key));
        }

        Ok(config)
    }
}
