//! Resources shared by every adapter for the duration of one run.

use reqwest::{Certificate, Client};
use snafu::prelude::*;

use crate::config::TlsConfig;
use crate::error::{PipelineError, TlsCertificateReadSnafu, TransportSnafu};

/// Per-run context handed to sources and destinations.
///
/// Holds the one HTTP transport that all network adapters share, built
/// from the pipeline's TLS settings.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    client: Client,
}

impl RunContext {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build the shared transport from TLS settings.
    ///
    /// An unreadable or invalid certificate is a setup error.
    pub fn from_tls(tls: &TlsConfig) -> Result<Self, PipelineError> {
        let mut builder = Client::builder().user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")));

        if tls.enabled {
            builder = builder.https_only(true);
        }
        if !tls.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &tls.cert_path {
            let pem = std::fs::read(path).context(TlsCertificateReadSnafu { path: path.clone() })?;
            let cert = Certificate::from_pem(&pem).context(TransportSnafu)?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().context(TransportSnafu)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_tls_builds() {
        assert!(RunContext::from_tls(&TlsConfig::default()).is_ok());
    }

    #[test]
    fn test_missing_certificate_is_setup_error() {
        let tls = TlsConfig {
            enabled: true,
            cert_path: Some(PathBuf::from("/nonexistent/sluice-ca.pem")),
            verify: true,
        };
        assert!(matches!(
            RunContext::from_tls(&tls),
            Err(PipelineError::TlsCertificateRead { .. })
        ));
    }
}
