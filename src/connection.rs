//! Connection endpoint (spec §4.D): owns one TCP socket toward a device,
//! handles its readiness probing and timeouts. Knows nothing about frames,
//! sequencing, or protocol versions — just bytes in, bytes out.

use std::net::Ipv4Addr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::constants::{CONNECT_TIMEOUT, DEVICE_PORT, READINESS_SLICE};

/// One TCP socket toward a device on the fixed Tuya LAN port.
pub struct Endpoint {
    stream: TcpStream,
}

impl Endpoint {
    /// Connect to a device on the fixed Tuya LAN port, bounded by
    /// `CONNECT_TIMEOUT`, and set `TCP_NODELAY`.
    pub async fn connect(device_ip: Ipv4Addr) -> std::io::Result<Endpoint> {
        Self::connect_to((device_ip, DEVICE_PORT)).await
    }

    /// Connect to an arbitrary `(ip, port)` pair. The port is fixed at
    /// `DEVICE_PORT` for every real device; this only exists so tests can
    /// point an `Endpoint` at an in-process mock listener bound to an
    /// ephemeral port.
    pub(crate) async fn connect_to(addr: impl Into<std::net::SocketAddr>) -> std::io::Result<Endpoint> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr.into()))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(Endpoint { stream })
    }

    /// Send a complete frame. Non-suspending in practice (spec §5).
    pub async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Non-blocking readability probe, bounded by half the stale grace
    /// (`READINESS_SLICE` = 3.5 s). Returns `true` iff the socket became
    /// readable before the deadline.
    pub async fn wait_readable(&self) -> bool {
        timeout(READINESS_SLICE, self.stream.readable()).await.is_ok()
    }

    /// Read whatever is currently available into `buf`, returning the
    /// number of bytes read (0 means the peer closed the connection).
    pub async fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf).await
    }

    /// Orderly shutdown; failures are swallowed, matching the Python
    /// original's `except socket.error: pass`.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
