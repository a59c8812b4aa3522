// # HTTP Address Verifier
//
// This crate asks an echo service (icanhazip by default) which source
// address it sees.
//
// ## Requests
//
// - **Connectivity probe**: one GET to `connectivity_url` before anything is
//   changed. Any failure means the host has no working IPv6 path. No retries.
// - **Verification request**: GET to the literal verification address with
//   the echo service's `Host` header. The rotator routes exactly that address
//   through the freshly assigned address, so the body tells us whether the
//   new address is really used for outbound traffic.
//
// Both requests use plain HTTP with per-request timeouts from
// `VerificationConfig`.

use ipv6_rotator_core::traits::AddressVerifier;
use ipv6_rotator_core::{Error, Result, VerificationConfig};

use reqwest::header::HOST;
use std::time::Duration;
use tracing::debug;

/// Echo-service client
pub struct HttpVerifier {
    /// URL of the verification request
    request_url: String,

    /// Host header of the verification request
    host: String,

    /// URL of the connectivity probe
    connectivity_url: String,

    request_timeout: Duration,
    connectivity_timeout: Duration,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpVerifier {
    /// Create a verifier from the echo service settings
    pub fn new(config: &VerificationConfig) -> Result<Self> {
        config.validate()?;
        Self::with_urls(
            config.request_url(),
            config.host.clone(),
            config.connectivity_url.clone(),
            config.request_timeout(),
            config.connectivity_timeout(),
        )
    }

    fn with_urls(
        request_url: String,
        host: String,
        connectivity_url: String,
        request_timeout: Duration,
        connectivity_timeout: Duration,
    ) -> Result<Self> {
        // A proxy would hide the rotated source address from the echo service
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            request_url,
            host,
            connectivity_url,
            request_timeout,
            connectivity_timeout,
            client,
        })
    }
}

#[async_trait::async_trait]
impl AddressVerifier for HttpVerifier {
    async fn check_connectivity(&self) -> Result<()> {
        debug!("Probing IPv6 connectivity via {}", self.connectivity_url);

        let response = self
            .client
            .get(&self.connectivity_url)
            .timeout(self.connectivity_timeout)
            .send()
            .await
            .map_err(|e| Error::no_connectivity(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::no_connectivity(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn observed_address(&self) -> Result<String> {
        debug!(
            "Asking {} (Host: {}) which address it sees",
            self.request_url, self.host
        );

        let response = self
            .client
            .get(&self.request_url)
            .header(HOST, &self.host)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::verification_request(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::verification_request(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::verification_request(format!("Failed to read response: {}", e)))?;

        Ok(body.trim().to_string())
    }
}
