//! Thin demo binary: load a device from `device.toml`, drive it with the
//! single-threaded cooperative poll loop the protocol expects (spec §5),
//! and log state transitions and DP pushes.

use std::time::Duration;

use tuya_lan_client::{load_config, DeviceSession, StatusEventKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter("tuya_lan_client=debug")
        .init();

    let config = load_config("device.toml")?;
    tracing::info!(device_ip = %config.device_ip, device_id = %config.device_id, "config loaded");

    let on_connection: tuya_lan_client::OnConnection = Box::new(|connected| {
        tracing::info!(connected, "connection state changed");
    });
    let on_status: tuya_lan_client::OnStatus = Box::new(|value, kind| {
        let as_push = matches!(kind, StatusEventKind::Status);
        tracing::info!(push = as_push, dps = %value, "status");
    });

    let mut session = DeviceSession::new(config, Some(on_connection), Some(on_status));
    session.start().await;

    loop {
        session.handle().await;

        if session.is_connected() {
            match session.read_states().await {
                Ok(value) => tracing::info!(dps = %value, "read_states"),
                Err(e) => tracing::debug!(error = %e, "read_states failed"),
            }
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
