//! Command codes and the JSON body template for each one (spec §4.C, §6).

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

/// The Tuya well-known command codes. Values are fixed by the protocol, not
/// by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Control,
    Status,
    HeartBeat,
    DpQuery,
    ControlNew,
    DpQueryNew,
}

impl Command {
    pub const fn code(self) -> u32 {
        match self {
            Command::Control => 7,
            Command::Status => 8,
            Command::HeartBeat => 9,
            Command::DpQuery => 10,
            Command::ControlNew => 13,
            Command::DpQueryNew => 16,
        }
    }

    pub fn from_code(code: u32) -> Option<Command> {
        match code {
            7 => Some(Command::Control),
            8 => Some(Command::Status),
            9 => Some(Command::HeartBeat),
            10 => Some(Command::DpQuery),
            13 => Some(Command::ControlNew),
            16 => Some(Command::DpQueryNew),
            _ => None,
        }
    }
}

/// A caller-supplied map of DP index to value; keys are coerced to string
/// form before serialization regardless of how the caller spelled them.
pub type DpsMap = BTreeMap<String, Value>;

/// Build the JSON body for `DP_QUERY`: `{gwId, devId, uid, t}`.
pub fn build_dp_query(gateway_id: &str, device_id: &str) -> Vec<u8> {
    let body = json!({
        "gwId": gateway_id,
        "devId": device_id,
        "uid": device_id,
        "t": timestamp(),
    });
    strip_whitespace(&body)
}

/// Build the JSON body for `DP_QUERY_NEW`: `{devId, uid, t}`.
pub fn build_dp_query_new(device_id: &str) -> Vec<u8> {
    let body = json!({
        "devId": device_id,
        "uid": device_id,
        "t": timestamp(),
    });
    strip_whitespace(&body)
}

/// Build the JSON body for `CONTROL`: `{devId, uid, t, dps}`.
pub fn build_control(device_id: &str, dps: &DpsMap) -> Vec<u8> {
    let body = json!({
        "devId": device_id,
        "uid": device_id,
        "t": timestamp(),
        "dps": dps,
    });
    strip_whitespace(&body)
}

/// Build the JSON body for `CONTROL_NEW`: default `dps={"1":"","2":"","3":""}`
/// overridden field-by-field by the caller's map.
pub fn build_control_new(device_id: &str, dps: &DpsMap) -> Vec<u8> {
    let mut merged: DpsMap = ["1", "2", "3"]
        .into_iter()
        .map(|k| (k.to_string(), Value::String(String::new())))
        .collect();
    merged.extend(dps.clone());

    let body = json!({
        "devId": device_id,
        "uid": device_id,
        "t": timestamp(),
        "dps": merged,
    });
    strip_whitespace(&body)
}

/// `HEART_BEAT` carries an empty body.
pub fn build_heartbeat() -> Vec<u8> {
    Vec::new()
}

/// Coerce caller keys (ints or strings) into the string-keyed map the wire
/// format requires.
pub fn dps_from_pairs<K: ToString>(pairs: impl IntoIterator<Item = (K, Value)>) -> DpsMap {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn strip_whitespace(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("JSON serialization of a caller-provided DPS map cannot fail")
}

fn timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}
