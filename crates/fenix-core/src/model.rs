// ── Canonical domain records ──
//
// Everything the presentation layer reads comes from these types.
// Devices, states, and telemetry are produced fresh each poll cycle and
// published as one immutable `Snapshot`; readers never mutate them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed device attribute, coerced from the wire's stringly values.
///
/// Coercion order for strings: bool (`"true"`/`"false"`, any case),
/// then integer, then float, then left as string. First parse wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// One cloud-registered controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier. Selection priority on the wire: explicit `id`,
    /// then `deviceId`, then the human-facing `name`.
    pub id: String,
    /// Controller family, e.g. "xenio" -- empty when the cloud omits it.
    pub device_type: String,
    pub name: String,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Device {
    /// The serial-number attribute, used as the alternate identifier
    /// when the primary id is not authorized for state/telemetry reads.
    pub fn serial_number(&self) -> Option<String> {
        self.attributes
            .get("serialNumber")
            .or_else(|| self.attributes.get("serial_number"))
            .map(ToString::to_string)
    }
}

/// Canonical sauna power status.
///
/// The cloud reports this field as a boolean, an integer, or a
/// free-form string depending on firmware variant. Everything folds
/// into this integer enum: 0 = off, 1 = on, 2/3 = transitional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaunaStatus {
    Off,
    On,
    /// Heating up or shutting down -- the controller is between states.
    Transitional,
    #[default]
    Unknown,
}

impl SaunaStatus {
    /// Coerce a raw status value into the canonical enum.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Self::On,
            Value::Bool(false) => Self::Off,
            Value::Number(n) => match n.as_i64() {
                Some(0) => Self::Off,
                Some(1) => Self::On,
                Some(2 | 3) => Self::Transitional,
                _ => Self::Unknown,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "running" | "active" | "heating" | "started"
                | "start" => Self::On,
                "0" | "false" | "off" | "inactive" | "stopped" | "stop" | "standby"
                | "idle" | "ready" => Self::Off,
                "2" | "3" => Self::Transitional,
                _ => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }

    /// The documented integer code: 0 = off, 1 = on, 2 = transitional,
    /// 3 = unknown.
    pub fn code(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::Transitional => 2,
            Self::Unknown => 3,
        }
    }

    /// Boolean view for on/off consumers; `None` while transitional or
    /// unknown.
    pub fn is_on(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Transitional | Self::Unknown => None,
        }
    }
}

/// One stored preset configuration.
///
/// Keyed in [`NormalizedState::profiles`] by its original string index so
/// indexed selection ("profile 2" -> key `"2"`) keeps working.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
    pub target_temp: Option<f64>,
    pub target_hum: Option<f64>,
    pub duration: Option<i64>,
    pub heater_on: Option<bool>,
    pub steamer_on: Option<bool>,
    pub light_on: Option<bool>,
}

/// The `state.settings` diagnostics block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaunaSettings {
    pub max_on_time: Option<i64>,
    pub max_temp: Option<f64>,
    pub temp_calibration: Option<f64>,
    pub blackout_control: Option<bool>,
    pub dehumidification: Option<bool>,
    pub remote_control: Option<bool>,
    pub screen_saver_time: Option<i64>,
    pub lock_settings: Option<bool>,
    pub lock_additional: Option<bool>,
}

/// Flat record derived from a device-state document.
///
/// Target and desired-actuator fields prefer the active profile's values
/// and fall back to the root state; actual actuator states
/// (`heater_state`, `steamer_state`) always come from the root because
/// they are measured, not requested.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedState {
    pub connected: Option<bool>,
    pub display_name: Option<String>,

    pub target_temperature: Option<f64>,
    pub humidity_setpoint: Option<f64>,

    /// Desired heater state (last requested).
    pub heater_requested: Option<bool>,
    /// Actual heater state code as reported by the controller.
    pub heater_state: Option<i64>,

    pub steamer_requested: Option<bool>,
    pub steamer_state: Option<i64>,

    pub light_requested: Option<bool>,

    pub screen_lock_on: Option<bool>,
    pub settings: SaunaSettings,

    pub remote_allowed: Option<bool>,
    pub demo_mode: Option<bool>,

    pub active_profile: Option<i64>,
    pub sauna_status: SaunaStatus,

    /// All stored profiles, keyed by their original string index.
    pub profiles: BTreeMap<String, Profile>,
}

/// A latest-data telemetry payload.
///
/// The nested `data` map passes through unchanged -- type coercion is
/// the telemetry source's responsibility, not ours.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp: Option<String>,
    pub shadow_name: Option<String>,
    pub sub_id: Option<String>,
    pub kind: Option<String>,
    pub data: serde_json::Map<String, Value>,
}

/// The merged read model published after each poll cycle.
///
/// Immutable: readers hold an `Arc<Snapshot>` and the previous snapshot
/// stays visible until a new one is fully assembled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub devices: BTreeMap<String, Device>,
    pub states: BTreeMap<String, NormalizedState>,
    pub telemetry: BTreeMap<String, TelemetrySample>,
    pub refreshed_at: Option<DateTime<Utc>>,
}
