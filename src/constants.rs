//! Fixed protocol constants (spec §6). These are properties of the Tuya
//! local protocol, not configuration — there is nothing for a caller to
//! tune here.

use std::time::Duration;

pub const DEVICE_PORT: u16 = 6668;
pub const DISCOVERY_PORT: u16 = 6667;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(7);
pub const CONNECTION_STALE_GRACE: Duration = Duration::from_secs(7);
pub const RECONNECT_COOL_DOWN: Duration = Duration::from_secs(5);
pub const READINESS_SLICE: Duration = Duration::from_millis(3_500);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DISCOVERY_RECV_TIMEOUT: Duration = Duration::from_secs(3);

pub const MAX_FALLBACK_DEPTH: u32 = 3;
pub const FALLBACK_SENTINEL_PAYLOAD: &str = "json obj data unvalid";
