// ── Raw-payload normalization ──
//
// Bridges the heterogeneous cloud JSON into canonical records. The wire
// mixes booleans, numbers, and stringly-typed values freely, and the
// active profile overrides parts of the root state; everything here is
// a pure function so identical input always yields identical output.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::model::{
    AttrValue, Device, NormalizedState, Profile, SaunaSettings, SaunaStatus, TelemetrySample,
};

// ── Devices ────────────────────────────────────────────────────────

/// Parse a device-list payload.
///
/// Accepts the list either top-level or under a `devices` key.
/// Non-object entries and entries without a usable identifier are
/// silently skipped; id priority is `id`, then `deviceId`, then `name`.
pub fn parse_devices(raw: &Value) -> Vec<Device> {
    let list = match raw {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("devices").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => {
                warn!("unexpected /devices payload shape");
                return Vec::new();
            }
        },
        _ => {
            warn!("unexpected /devices payload shape");
            return Vec::new();
        }
    };

    list.iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let id = ["id", "deviceId", "name"]
                .iter()
                .find_map(|key| item.get(*key).and_then(as_string))
                .filter(|id| !id.is_empty())?;

            let name = item
                .get("name")
                .and_then(as_string)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| id.clone());

            Some(Device {
                id,
                device_type: item
                    .get("type")
                    .and_then(as_string)
                    .unwrap_or_default(),
                name,
                attributes: item
                    .get("attr")
                    .or_else(|| item.get("attributes"))
                    .map(parse_attributes)
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Parse an attribute list of `{key, value}` entries into a typed map.
pub fn parse_attributes(raw: &Value) -> BTreeMap<String, AttrValue> {
    let Some(entries) = raw.as_array() else {
        return BTreeMap::new();
    };

    entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            let key = entry.get("key").and_then(Value::as_str)?;
            let value = coerce_attr(entry.get("value")?)?;
            Some((key.to_owned(), value))
        })
        .collect()
}

/// Coerce one attribute value. Strings try bool, then int, then float,
/// first successful parse wins; nested structures are dropped.
fn coerce_attr(value: &Value) -> Option<AttrValue> {
    match value {
        Value::Bool(b) => Some(AttrValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(AttrValue::Int)
            .or_else(|| n.as_f64().map(AttrValue::Float)),
        Value::String(s) => Some(coerce_attr_string(s)),
        _ => None,
    }
}

fn coerce_attr_string(s: &str) -> AttrValue {
    let trimmed = s.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return AttrValue::Bool(true),
        "false" => return AttrValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return AttrValue::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return AttrValue::Float(f);
    }
    AttrValue::Str(s.to_owned())
}

// ── Device state ───────────────────────────────────────────────────

/// Normalize a `/devices/state` document into the flat record.
pub fn normalize_state(raw: &Value) -> NormalizedState {
    let root = raw.as_object();
    let st = field(root, "state").and_then(Value::as_object);
    let conn = field(root, "connectionState").and_then(Value::as_object);

    let settings = field(st, "settings").and_then(Value::as_object);
    let screen_lock = field(st, "screenLock").and_then(Value::as_object);
    let heater = field(st, "heater").and_then(Value::as_object);
    let steamer = field(st, "steamer").and_then(Value::as_object);
    let light = field(st, "light").and_then(Value::as_object);

    // All profiles are retained, keyed by their original string index.
    let profiles: BTreeMap<String, Profile> = field(st, "profiles")
        .and_then(Value::as_object)
        .map(|raw_profiles| {
            raw_profiles
                .iter()
                .filter_map(|(key, p)| {
                    p.as_object().map(|p| (key.clone(), normalize_profile(p)))
                })
                .collect()
        })
        .unwrap_or_default();

    let active_profile = field(st, "activeProfile").and_then(as_i64_lenient);
    let active = active_profile.and_then(|idx| profiles.get(&idx.to_string()));

    NormalizedState {
        connected: field(conn, "connected").and_then(as_bool_lenient),
        display_name: field(st, "displayName").and_then(as_string),

        // Targets prefer the active profile, falling back to root state.
        target_temperature: active
            .and_then(|p| p.target_temp)
            .or_else(|| field(st, "targetTemp").and_then(as_f64_lenient)),
        humidity_setpoint: active
            .and_then(|p| p.target_hum)
            .or_else(|| field(st, "targetHum").and_then(as_f64_lenient)),

        // Desired state prefers the profile; actual state is measured
        // and always comes from root.
        heater_requested: active
            .and_then(|p| p.heater_on)
            .or_else(|| field(heater, "on").and_then(as_bool_lenient)),
        heater_state: field(heater, "state").and_then(as_i64_lenient),

        steamer_requested: active
            .and_then(|p| p.steamer_on)
            .or_else(|| field(steamer, "on").and_then(as_bool_lenient)),
        steamer_state: field(steamer, "state").and_then(as_i64_lenient),

        light_requested: active
            .and_then(|p| p.light_on)
            .or_else(|| field(light, "on").and_then(as_bool_lenient)),

        screen_lock_on: field(screen_lock, "on").and_then(as_bool_lenient),
        settings: normalize_settings(settings),

        remote_allowed: field(st, "remoteAllowed").and_then(as_bool_lenient),
        demo_mode: field(st, "demoMode").and_then(as_bool_lenient),

        active_profile,
        sauna_status: field(st, "saunaStatus")
            .map(SaunaStatus::from_value)
            .unwrap_or_default(),

        profiles,
    }
}

fn normalize_profile(p: &Map<String, Value>) -> Profile {
    Profile {
        name: p.get("name").and_then(as_string),
        target_temp: p.get("targetTemp").and_then(as_f64_lenient),
        target_hum: p.get("targetHum").and_then(as_f64_lenient),
        duration: p.get("duration").and_then(as_i64_lenient),
        heater_on: nested_on(p, "heater"),
        steamer_on: nested_on(p, "steamer"),
        light_on: nested_on(p, "light"),
    }
}

fn nested_on(p: &Map<String, Value>, key: &str) -> Option<bool> {
    p.get(key)
        .and_then(Value::as_object)
        .and_then(|o| o.get("on"))
        .and_then(as_bool_lenient)
}

fn normalize_settings(settings: Option<&Map<String, Value>>) -> SaunaSettings {
    SaunaSettings {
        max_on_time: field(settings, "maxOnTime").and_then(as_i64_lenient),
        max_temp: field(settings, "maxTemp").and_then(as_f64_lenient),
        temp_calibration: field(settings, "tempCalibration").and_then(as_f64_lenient),
        blackout_control: field(settings, "blackoutControl").and_then(as_bool_lenient),
        dehumidification: field(settings, "dehumidification").and_then(as_bool_lenient),
        remote_control: field(settings, "remoteControl").and_then(as_bool_lenient),
        screen_saver_time: field(settings, "screenSaverTime").and_then(as_i64_lenient),
        lock_settings: field(settings, "lockSettings").and_then(as_bool_lenient),
        lock_additional: field(settings, "lockAdditional").and_then(as_bool_lenient),
    }
}

// ── Telemetry ──────────────────────────────────────────────────────

/// Normalize a `/data/latest-data` payload.
pub fn normalize_telemetry(raw: &Value) -> TelemetrySample {
    let root = raw.as_object();
    TelemetrySample {
        timestamp: field(root, "timestamp").and_then(as_string),
        shadow_name: field(root, "shadowName").and_then(as_string),
        sub_id: field(root, "subId").and_then(as_string),
        kind: field(root, "type").and_then(as_string),
        data: field(root, "data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

// ── Lenient scalar coercion ────────────────────────────────────────

fn field<'a>(map: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Value> {
    map.and_then(|m| m.get(key))
}

/// Bool-ish coercion covering the vocabulary the controllers emit.
fn as_bool_lenient(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "running" | "active" | "heating" | "started" | "start" => {
                Some(true)
            }
            "0" | "false" | "off" | "inactive" | "stopped" | "stop" | "standby" | "idle"
            | "ready" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_f64_lenient(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_i64_lenient(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
