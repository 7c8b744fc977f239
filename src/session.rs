//! Session state machine (spec §4.E): heartbeat, stale detection, forced
//! reconnect with cool-down, sequence allocation, and reply dispatch for
//! unsolicited HEART_BEAT/STATUS frames. The request/response round-trips
//! themselves (`read_states`/`write_states`) live in `coordinator`.

use std::net::Ipv4Addr;
use std::time::Instant;

use serde_json::Value;

use crate::command::{self, Command};
use crate::config::DeviceConfig;
use crate::connection::Endpoint;
use crate::constants::{CONNECTION_STALE_GRACE, HEARTBEAT_INTERVAL, RECONNECT_COOL_DOWN};
use crate::error::Error;
use crate::frame::{self, FrameDecoder, RawFrame};
use crate::types::{Client, ClientType, StatusEventKind};
use crate::version::ProtocolVersion;

/// Callback invoked once per transition into `Connected` and once per
/// transition from `ReconnectPending` back to `Idle` (spec §6). Must not
/// re-enter the session that invoked it.
pub type OnConnection = Box<dyn FnMut(bool) + Send>;

/// Callback invoked for every STATUS reply carrying a non-empty payload
/// (spec §6). Must not re-enter the session that invoked it.
pub type OnStatus = Box<dyn FnMut(Value, StatusEventKind) + Send>;

/// A connection that's been condemned but not yet torn down — still held so
/// its close can be deferred until the reconnect cool-down elapses (spec
/// §4.E: RECONNECT_PENDING doesn't close the socket or fire `on_connection`
/// until the cool-down has passed).
struct PendingReconnect {
    dead_endpoint: Option<Endpoint>,
}

/// The session's connection state, modeled as a total sum type rather than
/// a nullable socket field (spec §9 design notes).
enum ConnectionState {
    Idle,
    Connected(Endpoint),
    ReconnectPending(PendingReconnect),
}

/// One device session: identity, crypto key, and the mutable state the
/// state machine owns (spec §3). Not thread-safe by contract — the owning
/// driver calls `handle()` from a single task.
pub struct DeviceSession {
    device_id: String,
    gateway_id: String,
    local_key: [u8; 16],
    device_ip: Ipv4Addr,
    protocol_version: ProtocolVersion,

    state: ConnectionState,
    decoder: FrameDecoder,
    next_seq: u32,
    last_msg_rcv: Instant,
    last_reconnect: Instant,

    on_connection: Option<OnConnection>,
    on_status: Option<OnStatus>,
}

impl DeviceSession {
    pub fn new(config: DeviceConfig, on_connection: Option<OnConnection>, on_status: Option<OnStatus>) -> Self {
        let now = Instant::now();
        DeviceSession {
            device_id: config.device_id,
            gateway_id: config.gateway_id,
            local_key: config.local_key,
            device_ip: config.device_ip,
            protocol_version: config.protocol_version,

            state: ConnectionState::Idle,
            decoder: FrameDecoder::new(),
            next_seq: 1,
            last_msg_rcv: now,
            // Far enough in the past that a first-ever reconnect never waits on cool-down.
            last_reconnect: now - RECONNECT_COOL_DOWN,

            on_connection,
            on_status,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub(crate) fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    pub(crate) fn local_key(&self) -> [u8; 16] {
        self.local_key
    }

    pub(crate) fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    /// IDLE -> CONNECTED on success; stays IDLE on failure (spec §4.E).
    pub async fn start(&mut self) {
        if matches!(self.state, ConnectionState::Idle) {
            self.try_connect().await;
        }
    }

    /// Orderly shutdown; failures swallowed (spec §4.D).
    pub async fn stop(&mut self) {
        match std::mem::replace(&mut self.state, ConnectionState::Idle) {
            ConnectionState::Connected(endpoint) => endpoint.close().await,
            ConnectionState::ReconnectPending(PendingReconnect { dead_endpoint: Some(e) }) => e.close().await,
            _ => {}
        }
    }

    async fn try_connect(&mut self) -> bool {
        match Endpoint::connect(self.device_ip).await {
            Ok(endpoint) => {
                tracing::info!(ip = %self.device_ip, "connected");
                self.state = ConnectionState::Connected(endpoint);
                self.decoder = FrameDecoder::new();
                self.last_msg_rcv = Instant::now();
                if let Some(cb) = self.on_connection.as_mut() {
                    cb(true);
                }
                true
            }
            Err(e) => {
                tracing::debug!(ip = %self.device_ip, error = %e, "connect failed");
                false
            }
        }
    }

    /// Test-only hook: connect to an arbitrary loopback port instead of the
    /// fixed `DEVICE_PORT`, so integration tests can stand up a mock device
    /// on an ephemeral port rather than fighting over 6668.
    #[cfg(test)]
    pub(crate) async fn connect_for_test(&mut self, port: u16) -> bool {
        match Endpoint::connect_to((self.device_ip, port)).await {
            Ok(endpoint) => {
                self.state = ConnectionState::Connected(endpoint);
                self.decoder = FrameDecoder::new();
                self.last_msg_rcv = Instant::now();
                if let Some(cb) = self.on_connection.as_mut() {
                    cb(true);
                }
                true
            }
            Err(_) => false,
        }
    }

    fn allocate_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Take the connection away from `self.state`, leaving `Idle` behind,
    /// so I/O can proceed without holding a borrow of `self`. Returns
    /// `None` if we weren't connected.
    fn take_connected(&mut self) -> Option<Endpoint> {
        match std::mem::replace(&mut self.state, ConnectionState::Idle) {
            ConnectionState::Connected(endpoint) => Some(endpoint),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Condemn the connection: it moves to `ReconnectPending`, carrying the
    /// (now unusable) endpoint so it can be closed once cool-down elapses.
    fn condemn(&mut self, endpoint: Option<Endpoint>) {
        self.state = ConnectionState::ReconnectPending(PendingReconnect { dead_endpoint: endpoint });
    }

    /// Build and send one request frame, returning the sequence number to
    /// correlate its reply against. On failure the session moves into
    /// `ReconnectPending` (spec: "Failure to send sets the force latch").
    pub(crate) async fn send_request(&mut self, command: Command, json_payload: &[u8]) -> Result<u32, Error> {
        if matches!(self.state, ConnectionState::Idle) && !self.try_connect().await {
            return Err(Error::Timeout);
        }

        let Some(mut endpoint) = self.take_connected() else {
            return Err(Error::Timeout);
        };

        let seq = self.allocate_seq();
        let body = self.protocol_version.build_body(command, json_payload, &self.local_key);
        let frame = frame::encode(seq, command.code(), &body);

        match endpoint.send(&frame).await {
            Ok(()) => {
                self.state = ConnectionState::Connected(endpoint);
                Ok(seq)
            }
            Err(e) => {
                self.condemn(Some(endpoint));
                Err(Error::Transport(e))
            }
        }
    }

    /// Read whatever is available right now (bounded by the endpoint's
    /// readiness slice) and return any complete frames it produced. Updates
    /// `last_msg_rcv` on every successful parse, and absorbs HEART_BEAT
    /// replies (PONG) before handing the rest back to the caller.
    pub(crate) async fn poll_frames(&mut self) -> Result<Vec<RawFrame>, Error> {
        let Some(mut endpoint) = self.take_connected() else {
            return Err(Error::Timeout);
        };

        if !endpoint.wait_readable().await {
            self.state = ConnectionState::Connected(endpoint);
            return Ok(Vec::new());
        }

        let mut buf = [0u8; 4096];
        let read_result = endpoint.read_available(&mut buf).await;

        let n = match read_result {
            Ok(0) => {
                self.condemn(Some(endpoint));
                return Ok(Vec::new());
            }
            Ok(n) => n,
            Err(e) => {
                self.condemn(Some(endpoint));
                return Err(Error::Transport(e));
            }
        };

        let frames = self.decoder.push(&buf[..n]);
        self.state = ConnectionState::Connected(endpoint);
        if !frames.is_empty() {
            self.last_msg_rcv = Instant::now();
        }

        let mut passthrough = Vec::with_capacity(frames.len());
        for raw in frames {
            if Command::from_code(raw.cmd) == Some(Command::HeartBeat) {
                tracing::debug!(ip = %self.device_ip, "PONG");
                continue;
            }
            passthrough.push(raw);
        }
        Ok(passthrough)
    }

    /// Decode a raw frame's payload into JSON, dispatching to `on_status`
    /// if it's a STATUS reply. Returns the decoded value either way (the
    /// coordinator still needs DP_QUERY/CONTROL echoes).
    pub(crate) fn decode_and_dispatch(&mut self, raw: &RawFrame, kind_if_status: StatusEventKind) -> Option<Value> {
        let value = self.decode_only(raw)?;

        if Command::from_code(raw.cmd) == Some(Command::Status) {
            self.fire_status(value.clone(), kind_if_status);
        }

        Some(value)
    }

    /// Decode a raw frame's payload into JSON without dispatching anything.
    /// Used by the coordinator for the one reply frame it correlates to its
    /// own request, which it dispatches explicitly (and exactly once) under
    /// rules that depend on which call is in flight, not just the frame's
    /// wire command code.
    pub(crate) fn decode_only(&self, raw: &RawFrame) -> Option<Value> {
        let decoded = self.protocol_version.parse_body(&raw.raw_body, &self.local_key).ok().flatten()?;
        serde_json::from_str(&decoded).ok()
    }

    /// Invoke `on_status` directly, bypassing the wire-command check in
    /// `decode_and_dispatch`. The coordinator uses this for values that are
    /// conceptually status updates regardless of which command code the
    /// device happened to echo them under (spec §4.F: a successful
    /// `read_states` always reports its result via `on_status`).
    pub(crate) fn fire_status(&mut self, value: Value, kind: StatusEventKind) {
        if let Some(cb) = self.on_status.as_mut() {
            cb(value, kind);
        }
    }

    fn is_stale(&self) -> bool {
        Instant::now().duration_since(self.last_msg_rcv) > HEARTBEAT_INTERVAL + CONNECTION_STALE_GRACE
    }

    fn needs_heartbeat(&self) -> bool {
        Instant::now().duration_since(self.last_msg_rcv) > HEARTBEAT_INTERVAL
    }

    /// One driver tick (spec §4.E).
    pub async fn handle(&mut self) {
        if let Err(e) = self.handle_inner().await {
            tracing::debug!(ip = %self.device_ip, error = %e, "handle tick reported an error");
        }
    }

    async fn handle_inner(&mut self) -> Result<(), Error> {
        match &self.state {
            ConnectionState::ReconnectPending(_) => return self.tick_reconnect_pending().await,
            ConnectionState::Idle => {
                self.try_connect().await;
                return Ok(());
            }
            ConnectionState::Connected(_) => {}
        }

        let frames = self.poll_frames().await?;
        for raw in &frames {
            if Command::from_code(raw.cmd) == Some(Command::Status) {
                self.decode_and_dispatch(raw, StatusEventKind::Status);
            }
        }

        if matches!(self.state, ConnectionState::Connected(_)) && self.needs_heartbeat() {
            tracing::debug!(ip = %self.device_ip, "PING");
            let body = command::build_heartbeat();
            let _ = self.send_request(Command::HeartBeat, &body).await;
        }

        if matches!(self.state, ConnectionState::Connected(_)) && self.is_stale() {
            tracing::debug!(ip = %self.device_ip, "connection stale");
            if let Some(endpoint) = self.take_connected() {
                self.condemn(Some(endpoint));
            }
        }

        Ok(())
    }

    async fn tick_reconnect_pending(&mut self) -> Result<(), Error> {
        if Instant::now().duration_since(self.last_reconnect) < RECONNECT_COOL_DOWN {
            return Ok(());
        }

        self.last_reconnect = Instant::now();
        if let ConnectionState::ReconnectPending(PendingReconnect { dead_endpoint }) =
            std::mem::replace(&mut self.state, ConnectionState::Idle)
        {
            if let Some(endpoint) = dead_endpoint {
                endpoint.close().await;
            }
        }
        if let Some(cb) = self.on_connection.as_mut() {
            cb(false);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Client for DeviceSession {
    fn client_type(&self) -> ClientType {
        ClientType::Device
    }

    async fn start(&mut self) {
        DeviceSession::start(self).await;
    }

    async fn stop(&mut self) {
        DeviceSession::stop(self).await;
    }

    fn is_connected(&self) -> bool {
        DeviceSession::is_connected(self)
    }

    async fn handle(&mut self) {
        DeviceSession::handle(self).await;
    }
}
