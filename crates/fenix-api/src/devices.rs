// Device and telemetry endpoints
//
// Raw-payload wrappers over the REST primitive. The device-state and
// telemetry documents are heterogeneous and profile-overridden, so these
// return `serde_json::Value`; `fenix-core` normalizes them into typed
// records.

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::client::CloudClient;
use crate::endpoints::Service;
use crate::error::Error;

impl CloudClient {
    /// List the account's devices.
    ///
    /// `GET <device>/devices`
    pub async fn list_devices(&self) -> Result<Value, Error> {
        debug!("listing devices");
        self.call(Service::Device, Method::GET, "/devices", None, None)
            .await
    }

    /// Fetch the current state document for one device.
    ///
    /// `GET <device>/devices/state?deviceId=<id>`
    pub async fn device_state(&self, device_id: &str) -> Result<Value, Error> {
        debug!(device_id, "fetching device state");
        self.call(
            Service::Device,
            Method::GET,
            "/devices/state",
            Some(&[("deviceId", device_id)]),
            None,
        )
        .await
    }

    /// Fetch the latest telemetry sample for one device.
    ///
    /// `GET <data>/data/latest-data?deviceId=<id>`
    pub async fn latest_data(&self, device_id: &str) -> Result<Value, Error> {
        debug!(device_id, "fetching latest telemetry");
        self.call(
            Service::Data,
            Method::GET,
            "/data/latest-data",
            Some(&[("deviceId", device_id)]),
            None,
        )
        .await
    }
}
