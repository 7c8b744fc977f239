//! Request/response coordinator (spec §4.F): `read_states`/`write_states`
//! built on the session's send/poll primitives, plus the bounded
//! DP_QUERY -> CONTROL_NEW fallback some firmware requires.
//!
//! Lives as an `impl DeviceSession` block in its own module rather than a
//! separate struct: it needs the session's connection and sequencing state
//! directly, and splitting it out as a wrapper type would just mean
//! threading every field through twice.

use serde_json::Value;

use crate::command::{self, Command, DpsMap};
use crate::constants::{FALLBACK_SENTINEL_PAYLOAD, MAX_FALLBACK_DEPTH};
use crate::error::Error;
use crate::session::DeviceSession;
use crate::types::StatusEventKind;

impl DeviceSession {
    /// Query the device's current DP values.
    ///
    /// Tries `DP_QUERY` first. Some firmware answers with the literal
    /// string `"json obj data unvalid"` instead of a DPS map when it can't
    /// service a DP_QUERY directly; in that case, fall back to
    /// `CONTROL_NEW` with an empty DPS map, retrying up to
    /// `MAX_FALLBACK_DEPTH` times before giving up and returning whatever
    /// the device last sent.
    pub async fn read_states(&mut self) -> Result<Value, Error> {
        let gateway_id = self.gateway_id().to_string();
        let device_id = self.device_id().to_string();

        let mut command = Command::DpQuery;
        let mut attempt = 0;

        loop {
            let body = match command {
                Command::DpQuery => command::build_dp_query(&gateway_id, &device_id),
                Command::ControlNew => command::build_control_new(&device_id, &DpsMap::new()),
                _ => unreachable!("read_states only ever issues DP_QUERY or its CONTROL_NEW fallback"),
            };

            let seq = self.send_request(command, &body).await?;
            let reply = self.await_reply(seq, command, StatusEventKind::Status).await?;

            if attempt < MAX_FALLBACK_DEPTH && is_fallback_sentinel(&reply.value) {
                attempt += 1;
                command = Command::ControlNew;
                continue;
            }

            // A successful read always reports its result as a status
            // update, regardless of which command code the device echoed
            // it under (spec §4.F step 4).
            self.fire_status(reply.value.clone(), StatusEventKind::Status);
            return Ok(reply.value);
        }
    }

    /// Push a full DPS map to the device. Returns `true` iff the device
    /// acknowledged with no return code, or `rc == 0`.
    pub async fn write_states(&mut self, dps: &DpsMap) -> Result<bool, Error> {
        let device_id = self.device_id().to_string();
        let body = command::build_control(&device_id, dps);
        let seq = self.send_request(Command::Control, &body).await?;
        let reply = self.await_reply(seq, Command::Control, StatusEventKind::Command).await?;
        Ok(reply.return_code.is_none_or(|rc| rc == 0))
    }

    /// Set a single DP, defaulting to index 1 (the common case — most
    /// single-function devices expose their primary state as DP 1).
    pub async fn write_state(&mut self, value: Value, idx: u32) -> Result<bool, Error> {
        let dps = command::dps_from_pairs([(idx, value)]);
        self.write_states(&dps).await
    }

    /// Poll until a frame correlated to `seq` (or carrying `expected`'s
    /// command code) arrives. Every *other* decodable frame seen along the
    /// way is dispatched via `decode_and_dispatch` under `passthrough_kind`
    /// — `STATUS` while `read_states` is in flight, `COMMAND` while
    /// `write_states` is (spec §6: "COMMAND when the STATUS arrives during
    /// a write_states round-trip"). The matched reply itself is decoded but
    /// *not* auto-dispatched here — callers decide whether and how to
    /// report it, since a DP_QUERY/CONTROL echo reported via `on_status`
    /// follows different rules than an incidental STATUS frame.
    ///
    /// Breaks out with `Error::Timeout` as soon as a poll comes back empty —
    /// a readiness timeout means nothing else is coming this tick, and the
    /// caller is expected to retry on a later `handle()` tick rather than
    /// have this loop spin forever against a device that never replies.
    async fn await_reply(&mut self, seq: u32, expected: Command, passthrough_kind: StatusEventKind) -> Result<CoordinatorReply, Error> {
        loop {
            let frames = self.poll_frames().await?;
            if frames.is_empty() {
                return Err(Error::Timeout);
            }

            for raw in &frames {
                let is_reply = raw.seq == seq || Command::from_code(raw.cmd) == Some(expected);

                if is_reply {
                    if let Some(value) = self.decode_only(raw) {
                        return Ok(CoordinatorReply { value, return_code: raw.return_code });
                    }
                    continue;
                }

                self.decode_and_dispatch(raw, passthrough_kind);
            }
        }
    }
}

struct CoordinatorReply {
    value: Value,
    return_code: Option<u32>,
}

fn is_fallback_sentinel(value: &Value) -> bool {
    value.as_str() == Some(FALLBACK_SENTINEL_PAYLOAD)
        || value.get("Error").and_then(Value::as_str) == Some(FALLBACK_SENTINEL_PAYLOAD)
        || value.get("Err").and_then(Value::as_str) == Some(FALLBACK_SENTINEL_PAYLOAD)
}
