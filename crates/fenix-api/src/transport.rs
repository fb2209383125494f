// Shared transport configuration for building reqwest::Client instances.
//
// Discovery/auth calls and data calls run on different deadlines; both
// ride the same connection pool built here.

use std::time::Duration;

/// Shared transport configuration for the cloud HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for data calls (device list, state, telemetry, commands).
    pub timeout: Duration,
    /// Timeout for discovery and authentication calls.
    pub auth_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(20),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// The client-level timeout covers data calls; discovery and auth
    /// requests override it per-request with [`auth_timeout`](Self::auth_timeout).
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("fenix-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::error::Error::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })
    }
}
