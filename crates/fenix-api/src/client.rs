// Cloud API HTTP client
//
// Wraps `reqwest::Client` with endpoint resolution, bearer-token
// injection, and a single forced-refresh retry on authorization
// failure. Endpoint wrappers (devices, telemetry, commands) are
// implemented as inherent methods in separate files to keep this module
// focused on transport mechanics.

use std::sync::Arc;

use reqwest::Method;
use secrecy::SecretString;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;

use crate::auth::{TokenListener, TokenState};
use crate::endpoints::{preview, EndpointResolver, EndpointSet, Service};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Authenticated client for the sauna cloud REST API.
///
/// Owns the endpoint resolver, the token cache, and the underlying HTTP
/// connection pool. All data access goes through [`call`](Self::call),
/// which transparently recovers from a stale token once per request.
pub struct CloudClient {
    http: reqwest::Client,
    resolver: EndpointResolver,
    username: String,
    password: SecretString,
    transport: TransportConfig,
    tokens: Mutex<Option<TokenState>>,
    listener: Option<Arc<dyn TokenListener>>,
}

impl CloudClient {
    /// Create a new client. No network traffic happens until the first
    /// call resolves endpoints and authenticates.
    pub fn new(
        username: impl Into<String>,
        password: SecretString,
        discovery_url: Url,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let resolver =
            EndpointResolver::new(discovery_url, http.clone(), transport.auth_timeout);

        Ok(Self {
            http,
            resolver,
            username: username.into(),
            password,
            transport: transport.clone(),
            tokens: Mutex::new(None),
            listener: None,
        })
    }

    /// Seed the token cache with a persisted snapshot from a previous
    /// session. Stale tokens are fine -- the refresh path picks them up.
    pub fn with_tokens(self, tokens: TokenState) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
            ..self
        }
    }

    /// Register the listener notified after every successful
    /// authenticate/refresh.
    pub fn with_listener(self, listener: Arc<dyn TokenListener>) -> Self {
        Self {
            listener: Some(listener),
            ..self
        }
    }

    /// The current token snapshot, if any.
    pub async fn tokens(&self) -> Option<TokenState> {
        self.tokens.lock().await.clone()
    }

    /// Resolve (or return the cached) endpoint set.
    pub async fn endpoints(&self) -> Result<EndpointSet, Error> {
        self.resolver.resolve().await
    }

    /// The endpoint resolver (for an explicit discovery reset).
    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    // ── Crate-internal accessors ─────────────────────────────────────

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &SecretString {
        &self.password
    }

    pub(crate) fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    pub(crate) fn token_cache(&self) -> &Mutex<Option<TokenState>> {
        &self.tokens
    }

    pub(crate) fn listener(&self) -> Option<&Arc<dyn TokenListener>> {
        self.listener.as_ref()
    }

    // ── REST primitive ───────────────────────────────────────────────

    /// Execute one authenticated REST operation.
    ///
    /// Two attempts at most: the first with the current (validated)
    /// token, the second after a forced refresh when the first came back
    /// 401/403. A 401/403 on the second attempt is [`Error::Auth`]; any
    /// other status >= 400 is [`Error::Api`] with status and body text.
    /// An empty success body parses as `{}`.
    pub async fn call(
        &self,
        service: Service,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        // Endpoint resolution fails fast with a configuration error
        // before any authenticated traffic.
        let endpoints = self.resolver.resolve().await?;
        let url = join_url(endpoints.base(service), path)?;

        for attempt in 0..2u8 {
            let id_token = self.ensure_valid_token(attempt == 1).await?;

            debug!(%method, %url, attempt, "cloud REST request");

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .timeout(self.transport.timeout)
                .bearer_auth(&id_token)
                .header(reqwest::header::ACCEPT, "application/json");
            if let Some(query) = query {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let resp = request.send().await.map_err(Error::Transport)?;
            let status = resp.status();
            let text = resp.text().await.map_err(Error::Transport)?;

            trace!(status = status.as_u16(), body = %text, "cloud REST response");

            if status.as_u16() < 400 {
                if text.is_empty() {
                    return Ok(Value::Object(Map::new()));
                }
                return serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: text,
                });
            }

            if matches!(status.as_u16(), 401 | 403) {
                if attempt == 0 {
                    debug!(%url, status = status.as_u16(), "unauthorized; retrying with forced token refresh");
                    continue;
                }
                return Err(Error::Auth {
                    status: Some(status.as_u16()),
                    message: format!("unauthorized for {url}: {}", preview(&text)),
                });
            }

            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        Err(Error::Auth {
            status: None,
            message: format!("unauthorized after retry for {url}"),
        })
    }
}

/// Join a resolved service base with a call path, tolerating stray
/// slashes on either side.
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, Error> {
    let full = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&full).map_err(Error::InvalidUrl)
}
