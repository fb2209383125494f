// Command dispatch
//
// All write operations flow through one typed surface: a structured
// `DeviceCommand` handed to a `DeviceCommandSink`. Dispatch is
// best-effort and fire-and-confirm-by-polling -- the cloud acknowledges
// acceptance, and the new state shows up on a later poll cycle.

use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::CloudClient;
use crate::endpoints::Service;
use crate::error::Error;

/// A structured command payload addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCommand {
    pub device_id: String,
    pub payload: Map<String, Value>,
}

impl DeviceCommand {
    pub fn new(device_id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            device_id: device_id.into(),
            payload,
        }
    }

    /// Select the active preset profile by index.
    pub fn set_active_profile(device_id: impl Into<String>, index: u32) -> Self {
        Self::from_entry(device_id, "activeProfile", Value::from(index))
    }

    /// Set the target temperature in degrees Celsius.
    pub fn set_target_temperature(device_id: impl Into<String>, celsius: f64) -> Self {
        Self::from_entry(device_id, "targetTemp", Value::from(celsius))
    }

    /// Set the humidity setpoint in percent.
    pub fn set_target_humidity(device_id: impl Into<String>, percent: f64) -> Self {
        Self::from_entry(device_id, "targetHum", Value::from(percent))
    }

    /// Switch the sauna on or off.
    pub fn power(device_id: impl Into<String>, on: bool) -> Self {
        let mut payload = Map::new();
        payload.insert("type".into(), Value::from("SAUNA"));
        payload.insert("state".into(), Value::from(if on { "on" } else { "off" }));
        Self::new(device_id, payload)
    }

    fn from_entry(device_id: impl Into<String>, key: &str, value: Value) -> Self {
        let mut payload = Map::new();
        payload.insert(key.to_owned(), value);
        Self::new(device_id, payload)
    }
}

/// The single write contract consumed by the presentation layer.
pub trait DeviceCommandSink {
    /// Dispatch one command. Confirmation arrives via polling, not here.
    fn dispatch(
        &self,
        cmd: &DeviceCommand,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

impl DeviceCommandSink for CloudClient {
    /// Try the known setter shapes in order until one is accepted:
    ///
    /// 1. `POST <device>/devices/target` with `{deviceId, ...payload}`
    /// 2. `POST <device>/devices/target` with `{deviceId, state: payload}`
    /// 3. `PUT  <device>/devices/state`  with `{deviceId, state: payload}`
    ///
    /// An API rejection advances to the next candidate; auth,
    /// configuration, and transport failures abort immediately since a
    /// different URL shape cannot fix them.
    async fn dispatch(&self, cmd: &DeviceCommand) -> Result<(), Error> {
        let mut flat = cmd.payload.clone();
        flat.insert("deviceId".into(), Value::from(cmd.device_id.clone()));

        let mut nested = Map::new();
        nested.insert("deviceId".into(), Value::from(cmd.device_id.clone()));
        nested.insert("state".into(), Value::Object(cmd.payload.clone()));

        let candidates = [
            (Method::POST, "/devices/target", Value::Object(flat)),
            (
                Method::POST,
                "/devices/target",
                Value::Object(nested.clone()),
            ),
            (Method::PUT, "/devices/state", Value::Object(nested)),
        ];

        let mut last_rejection = None;
        for (method, path, body) in candidates {
            match self
                .call(Service::Device, method.clone(), path, None, Some(&body))
                .await
            {
                Ok(_) => {
                    debug!(device_id = %cmd.device_id, %method, path, "command accepted");
                    return Ok(());
                }
                Err(err @ Error::Api { .. }) => {
                    debug!(
                        device_id = %cmd.device_id,
                        %method,
                        path,
                        error = %err,
                        "command candidate rejected; trying next"
                    );
                    last_rejection = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_rejection.expect("at least one dispatch candidate was attempted"))
    }
}
