// Token authentication and refresh
//
// The cloud issues a short-lived id/access token pair alongside a
// long-lived refresh token. All token mutation happens under a single
// async mutex: at most one authenticate/refresh is in flight, and any
// call arriving during one waits for the holder's result instead of
// issuing its own.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{join_url, CloudClient};
use crate::endpoints::{preview, Service};
use crate::error::Error;

/// Safety margin subtracted from token expiry so a refresh lands before
/// hard expiration.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// A full token snapshot as issued by the cloud.
///
/// Handed to the registered [`TokenListener`] after every successful
/// authenticate/refresh so the host can persist it; a persisted snapshot
/// can seed a new client via [`CloudClient::with_tokens`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub id_token: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Absolute expiry instant (`obtained_at + expiresIn`).
    pub expires_at: Option<DateTime<Utc>>,
    pub obtained_at: DateTime<Utc>,
}

impl TokenState {
    /// Whether the id token is inside the refresh window.
    ///
    /// Absent token: always. No known expiry: never (the server decides).
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    /// [`needs_refresh`](Self::needs_refresh) against an explicit clock.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        if self.id_token.is_empty() {
            return true;
        }
        match self.expires_at {
            Some(at) => now >= at - ChronoDuration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }
}

/// Receives every successful token change, at most once per change.
///
/// Token persistence is entirely the host's concern -- this crate only
/// reports.
pub trait TokenListener: Send + Sync {
    fn on_tokens_changed(&self, tokens: &TokenState);
}

/// Wire shape of `/auth/token` and `/auth/refresh` responses. The service
/// has emitted both camelCase and snake_case spellings over time.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "idToken", alias = "id_token")]
    id_token: Option<String>,
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: Option<String>,
    #[serde(rename = "refreshToken", alias = "refresh_token")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn", alias = "expires_in")]
    expires_in: Option<f64>,
}

impl CloudClient {
    /// Ensure a usable id token exists, returning it.
    ///
    /// Under the token mutex: no token -> full authenticate; `force` or
    /// an expiring/expired token -> refresh, falling back to a full
    /// authenticate when the refresh is rejected. Fails with
    /// [`Error::Auth`] if no valid id token exists afterwards.
    pub(crate) async fn ensure_valid_token(&self, force: bool) -> Result<String, Error> {
        let mut tokens = self.token_cache().lock().await;

        if tokens.is_none() {
            self.authenticate_locked(&mut tokens).await?;
        } else if force || tokens.as_ref().is_some_and(TokenState::needs_refresh) {
            if !self.refresh_locked(&mut tokens).await? {
                self.authenticate_locked(&mut tokens).await?;
            }
        }

        match tokens.as_ref() {
            Some(state) if !state.id_token.is_empty() => Ok(state.id_token.clone()),
            _ => Err(Error::Auth {
                status: None,
                message: "no valid id token after refresh/authenticate".into(),
            }),
        }
    }

    /// Full credential login: `POST <generics>/auth/token`.
    ///
    /// A login response without a refresh token clears any stored one.
    async fn authenticate_locked(
        &self,
        tokens: &mut Option<TokenState>,
    ) -> Result<(), Error> {
        let endpoints = self.endpoints().await?;
        let url = join_url(endpoints.base(Service::Generics), "/auth/token")?;

        debug!(%url, "authenticating");

        let body = json!({
            "username": self.username(),
            "password": self.password().expose_secret(),
        });

        let resp = self
            .http()
            .post(url)
            .timeout(self.transport().auth_timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Auth {
                status: Some(status.as_u16()),
                message: format!("login rejected: {}", preview(&text)),
            });
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload = parse_token_body(&text)?;
        let id_token = payload
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth {
                status: None,
                message: "login response did not contain an id token".into(),
            })?;

        let now = Utc::now();
        let state = TokenState {
            id_token,
            access_token: payload.access_token,
            // Fresh login: an absent refresh token means we no longer have one.
            refresh_token: payload.refresh_token,
            expires_at: expiry(now, payload.expires_in),
            obtained_at: now,
        };

        info!(
            has_refresh_token = state.refresh_token.is_some(),
            "cloud login succeeded"
        );

        self.notify_listener(&state);
        *tokens = Some(state);
        Ok(())
    }

    /// Token refresh: `POST <generics>/auth/refresh`.
    ///
    /// Returns `Ok(false)` on any rejection (4xx and up) so the caller
    /// can fall back to a full authenticate; transport failures are
    /// errors. A refresh response without a refresh token preserves the
    /// stored one.
    async fn refresh_locked(&self, tokens: &mut Option<TokenState>) -> Result<bool, Error> {
        let Some((refresh_token, prior_access, prior_expiry)) = tokens
            .as_ref()
            .and_then(|t| {
                t.refresh_token
                    .clone()
                    .map(|rt| (rt, t.access_token.clone(), t.expires_at))
            })
        else {
            debug!("token refresh skipped: no refresh token");
            return Ok(false);
        };

        let endpoints = self.endpoints().await?;
        let url = join_url(endpoints.base(Service::Generics), "/auth/refresh")?;

        debug!(%url, "refreshing tokens");

        let body = json!({
            "refreshToken": refresh_token,
            "username": self.username(),
        });

        let resp = self
            .http()
            .post(url)
            .timeout(self.transport().auth_timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                body = preview(&text),
                "token refresh rejected"
            );
            return Ok(false);
        }

        let payload = parse_token_body(&text)?;
        let Some(id_token) = payload.id_token.filter(|t| !t.is_empty()) else {
            warn!("token refresh response lacked an id token");
            return Ok(false);
        };

        let now = Utc::now();
        let state = TokenState {
            id_token,
            access_token: payload.access_token.or(prior_access),
            // Refresh: keep the prior refresh token when the response omits one.
            refresh_token: payload.refresh_token.or(Some(refresh_token)),
            expires_at: expiry(now, payload.expires_in).or(prior_expiry),
            obtained_at: now,
        };

        info!("token refresh succeeded");

        self.notify_listener(&state);
        *tokens = Some(state);
        Ok(true)
    }

    fn notify_listener(&self, state: &TokenState) {
        if let Some(listener) = self.listener() {
            listener.on_tokens_changed(state);
        }
    }
}

fn parse_token_body(text: &str) -> Result<TokenResponse, Error> {
    let body = if text.is_empty() { "{}" } else { text };
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("token response: {e}"),
        body: text.to_owned(),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn expiry(now: DateTime<Utc>, expires_in: Option<f64>) -> Option<DateTime<Utc>> {
    expires_in.map(|secs| now + ChronoDuration::seconds(secs as i64))
}
