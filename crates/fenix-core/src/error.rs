// ── Core error types ──
//
// Consumer-facing errors from fenix-core. These are NOT wire-specific --
// hosts never see HTTP plumbing directly. The `From<fenix_api::Error>`
// impl translates transport-layer errors into domain-appropriate
// variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Credentials were rejected or tokens could not be renewed. The
    /// host must re-authenticate (new password / cleared tokens) before
    /// polling can resume.
    #[error("Re-authentication required: {message}")]
    AuthenticationRequired { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Cloud API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Transport errors ─────────────────────────────────────────────
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fenix_api::Error> for CoreError {
    fn from(err: fenix_api::Error) -> Self {
        match err {
            fenix_api::Error::Configuration { message } => CoreError::Config { message },
            fenix_api::Error::Auth { status, message } => {
                CoreError::AuthenticationRequired {
                    message: match status {
                        Some(code) => format!("{message} (HTTP {code})"),
                        None => message,
                    },
                }
            }
            fenix_api::Error::Api { status, body } => CoreError::Api {
                message: body,
                status: Some(status),
            },
            fenix_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::Connection {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            fenix_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            fenix_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("deserialization error: {message}"))
            }
        }
    }
}
