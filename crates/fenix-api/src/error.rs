use thiserror::Error;

/// Top-level error type for the `fenix-api` crate.
///
/// Covers every failure mode across the cloud surface: discovery,
/// authentication, transport, and the REST data endpoints.
/// `fenix-core` maps these into consumer-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// Discovery document missing, malformed, or lacking a required
    /// service base. Fatal -- raised before any authenticated call.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected, or a call stayed unauthorized after the
    /// forced-refresh retry. Carries the HTTP status when one applies.
    #[error("Authentication failed: {message}")]
    Auth {
        status: Option<u16>,
        message: String,
    },

    // ── API ─────────────────────────────────────────────────────────
    /// Any other non-2xx response, with status and body text.
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is an authentication failure that calls
    /// for re-login rather than a retry.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns `true` for 403-class failures: the credentials are live
    /// but the requested resource is not visible to this account.
    pub fn is_not_authorized(&self) -> bool {
        matches!(
            self,
            Self::Auth {
                status: Some(403),
                ..
            } | Self::Api { status: 403, .. }
        )
    }

    /// Returns `true` if this is a transient failure worth retrying on
    /// the next poll cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// The HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } => *status,
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
