//! Small shared vocabulary types (spec §6, and the connector-wide
//! `ClientType`/`DeviceStatusType` enums the original source keeps at the
//! package root).

/// Which of the two client shapes this is — used only for logging/dispatch
/// by whatever external scheduler wires clients together; the core itself
/// never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    Device,
    Discovery,
}

/// Why `on_status` fired: an unsolicited push, or the status that arrived
/// as a side effect of a just-issued `CONTROL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEventKind {
    Status,
    Command,
}

/// The narrow interface an external scheduler is expected to drive
/// (spec §1, §6): start it, stop it, ask if it's connected, and give it a
/// tick. The scheduler itself — iterating a collection of these — is out of
/// scope for this crate.
#[async_trait::async_trait]
pub trait Client {
    fn client_type(&self) -> ClientType;
    async fn start(&mut self);
    async fn stop(&mut self);
    fn is_connected(&self) -> bool;
    async fn handle(&mut self);
}
