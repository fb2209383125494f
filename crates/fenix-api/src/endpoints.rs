// Endpoint discovery
//
// The cloud publishes a discovery document mapping logical service names
// to REST base URLs. It is fetched once and cached; every call goes
// through the resolved `EndpointSet` afterwards. Missing or malformed
// discovery data is a fatal configuration error, never retried.

use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;

/// Logical REST services named by the discovery document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Auth and account endpoints (`/auth/token`, `/auth/refresh`).
    Generics,
    /// Device inventory and state (`/devices`, `/devices/state`).
    Device,
    /// Telemetry (`/data/latest-data`).
    Data,
}

impl Service {
    fn key(self) -> &'static str {
        match self {
            Self::Generics => "generics",
            Self::Device => "device",
            Self::Data => "data",
        }
    }
}

/// Resolved base URLs for the three required services.
///
/// Immutable once loaded -- a new set is only produced by an explicit
/// [`EndpointResolver::reset`] followed by a re-resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    pub generics: Url,
    pub device: Url,
    pub data: Url,
}

impl EndpointSet {
    /// The base URL for a service.
    pub fn base(&self, service: Service) -> &Url {
        match service {
            Service::Generics => &self.generics,
            Service::Device => &self.device,
            Service::Data => &self.data,
        }
    }
}

/// Fetches and caches the discovery document.
pub struct EndpointResolver {
    discovery_url: Url,
    http: reqwest::Client,
    timeout: Duration,
    /// Cache plus resolution lock: concurrent resolvers wait for the
    /// in-flight fetch instead of issuing their own.
    cached: Mutex<Option<EndpointSet>>,
}

impl EndpointResolver {
    pub fn new(discovery_url: Url, http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            discovery_url,
            http,
            timeout,
            cached: Mutex::new(None),
        }
    }

    /// Resolve the endpoint set, fetching the discovery document on the
    /// first call and serving the cached set afterwards.
    pub async fn resolve(&self) -> Result<EndpointSet, Error> {
        let mut cached = self.cached.lock().await;
        if let Some(set) = cached.as_ref() {
            return Ok(set.clone());
        }

        let set = self.fetch().await?;
        info!(
            generics = %set.generics,
            device = %set.device,
            data = %set.data,
            "endpoints resolved"
        );
        *cached = Some(set.clone());
        Ok(set)
    }

    /// Drop the cached set; the next [`resolve`](Self::resolve) refetches.
    pub async fn reset(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch(&self) -> Result<EndpointSet, Error> {
        debug!("loading discovery document from {}", self.discovery_url);

        let resp = self
            .http
            .get(self.discovery_url.clone())
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Configuration {
                message: format!(
                    "discovery fetch failed (HTTP {status}): {}",
                    preview(&body)
                ),
            });
        }

        let doc: Value = serde_json::from_str(&body).map_err(|e| Error::Configuration {
            message: format!("discovery document is not valid JSON: {e}"),
        })?;

        let rest_api = doc
            .get("endpoints")
            .and_then(|v| v.get("RestApi"))
            .and_then(Value::as_object)
            .ok_or_else(|| Error::Configuration {
                message: "discovery document lacks endpoints.RestApi".into(),
            })?;

        Ok(EndpointSet {
            generics: service_base(rest_api, Service::Generics)?,
            device: service_base(rest_api, Service::Device)?,
            data: service_base(rest_api, Service::Data)?,
        })
    }
}

/// Locate `<service>.https` under `RestApi`, either as a direct child or
/// one level down inside a per-environment wrapper object.
fn find_service<'a>(rest_api: &'a Map<String, Value>, service: Service) -> Option<&'a str> {
    let https_of = |node: &'a Map<String, Value>| {
        node.get(service.key())
            .and_then(|v| v.get("https"))
            .and_then(Value::as_str)
    };

    if let Some(url) = https_of(rest_api) {
        return Some(url);
    }

    rest_api.values().filter_map(Value::as_object).find_map(https_of)
}

fn service_base(rest_api: &Map<String, Value>, service: Service) -> Result<Url, Error> {
    let raw = find_service(rest_api, service).ok_or_else(|| Error::Configuration {
        message: format!("discovery document lacks a '{}' service base", service.key()),
    })?;

    Url::parse(raw.trim_end_matches('/')).map_err(|e| Error::Configuration {
        message: format!("'{}' service base is not a valid URL: {e}", service.key()),
    })
}

pub(crate) fn preview(body: &str) -> &str {
    &body[..body.len().min(200)]
}
