//! TOML-backed device configuration, in the manner of the teacher's
//! `meaco.toml` loader: read the file, parse it, validate the local key.

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::version::ProtocolVersion;

#[derive(Debug, Deserialize)]
struct RawDeviceConfig {
    device_id: String,
    gateway_id: Option<String>,
    local_key: String,
    device_ip: String,
    #[serde(default = "default_protocol_version")]
    protocol_version: ProtocolVersion,
}

fn default_protocol_version() -> ProtocolVersion {
    ProtocolVersion::V33
}

/// A validated device configuration, ready to build a `DeviceSession` from.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub device_id: String,
    pub gateway_id: String,
    pub local_key: [u8; 16],
    pub device_ip: Ipv4Addr,
    pub protocol_version: ProtocolVersion,
}

/// Load and validate a device configuration from a TOML file at `path`.
pub fn load_config(path: &str) -> Result<DeviceConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound(path.to_owned()))?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<DeviceConfig, ConfigError> {
    let raw: RawDeviceConfig = toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    if raw.local_key.len() != 16 || !raw.local_key.is_ascii() {
        return Err(ConfigError::InvalidLocalKey);
    }
    let mut local_key = [0u8; 16];
    local_key.copy_from_slice(raw.local_key.as_bytes());

    let device_ip: Ipv4Addr = raw
        .device_ip
        .parse()
        .map_err(|_| ConfigError::InvalidIpAddress(raw.device_ip.clone()))?;

    let gateway_id = raw.gateway_id.unwrap_or_else(|| raw.device_id.clone());

    Ok(DeviceConfig {
        device_id: raw.device_id,
        gateway_id,
        local_key,
        device_ip,
        protocol_version: raw.protocol_version,
    })
}
