//! A LAN client for the Tuya local device protocol: frame codec, AES
//! payload crypto, the V3.1/V3.3 dialect split, a single-session state
//! machine with heartbeat/reconnect handling, a request/response
//! coordinator, and UDP broadcast discovery.
//!
//! This crate implements one device's session end to end; driving a
//! collection of sessions (a scheduler loop, a home-automation bus
//! integration) is left to the caller — see `types::Client`.

pub mod command;
pub mod config;
pub mod connection;
pub mod constants;
pub mod coordinator;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod session;
pub mod types;
pub mod version;

pub use command::{Command, DpsMap};
pub use config::{load_config, DeviceConfig};
pub use discovery::{DiscoveryClient, OnAnnouncement};
pub use error::{ConfigError, DecryptError, Error, FrameError};
pub use session::{DeviceSession, OnConnection, OnStatus};
pub use types::{Client, ClientType, StatusEventKind};
pub use version::ProtocolVersion;
