// ── Runtime client configuration ──
//
// These types describe *how* to reach the cloud account. They carry
// credential data and polling cadence, but never touch disk -- the host
// constructs a `ClientConfig` and hands it in; token persistence flows
// back out through the `TokenListener`.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use fenix_api::{CloudClient, TokenListener, TokenState, TransportConfig};

use crate::error::CoreError;

/// The vendor's fixed endpoint-discovery URL.
pub const DEFAULT_DISCOVERY_URL: &str = "https://api.harvia.io/endpoints";

/// Floor for both polling cadences. The cloud rate-limits per account;
/// anything faster buys nothing but 429s.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

const DEFAULT_DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(120);
const DEFAULT_DATA_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for one cloud account connection.
///
/// Built by the host at start-up -- core never reads config files.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account username (email).
    pub username: String,
    /// Account password.
    pub password: SecretString,
    /// Endpoint discovery URL.
    pub discovery_url: Url,
    /// Token snapshot persisted from a previous session, if any.
    pub stored_tokens: Option<TokenState>,
    /// Device-list + state refresh cadence.
    pub device_poll_interval: Duration,
    /// Telemetry refresh cadence.
    pub data_poll_interval: Duration,
    /// Timeout for data calls.
    pub timeout: Duration,
    /// Timeout for discovery and auth calls.
    pub auth_timeout: Duration,
}

impl ClientConfig {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        let transport = TransportConfig::default();
        Self {
            username: username.into(),
            password,
            // The constant is known-good; parse cannot fail.
            discovery_url: Url::parse(DEFAULT_DISCOVERY_URL)
                .expect("default discovery URL is valid"),
            stored_tokens: None,
            device_poll_interval: DEFAULT_DEVICE_POLL_INTERVAL,
            data_poll_interval: DEFAULT_DATA_POLL_INTERVAL,
            timeout: transport.timeout,
            auth_timeout: transport.auth_timeout,
        }
    }

    pub fn with_discovery_url(mut self, url: Url) -> Self {
        self.discovery_url = url;
        self
    }

    pub fn with_stored_tokens(mut self, tokens: TokenState) -> Self {
        self.stored_tokens = Some(tokens);
        self
    }

    pub fn with_poll_intervals(mut self, device: Duration, data: Duration) -> Self {
        self.device_poll_interval = device;
        self.data_poll_interval = data;
        self
    }

    /// The transport slice of this config.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: self.timeout,
            auth_timeout: self.auth_timeout,
        }
    }

    /// The polling cadences, clamped to the [`MIN_POLL_INTERVAL`] floor.
    pub fn polling(&self) -> PollingConfig {
        PollingConfig {
            device_interval: self.device_poll_interval.max(MIN_POLL_INTERVAL),
            data_interval: self.data_poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Build a [`CloudClient`] from this config, wiring in stored tokens
    /// and the optional token-persistence listener.
    pub fn build_client(
        &self,
        listener: Option<Arc<dyn TokenListener>>,
    ) -> Result<CloudClient, CoreError> {
        let mut client = CloudClient::new(
            self.username.clone(),
            self.password.clone(),
            self.discovery_url.clone(),
            &self.transport(),
        )?;
        if let Some(tokens) = &self.stored_tokens {
            client = client.with_tokens(tokens.clone());
        }
        if let Some(listener) = listener {
            client = client.with_listener(listener);
        }
        Ok(client)
    }
}

/// Effective polling cadences consumed by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub device_interval: Duration,
    pub data_interval: Duration,
}
