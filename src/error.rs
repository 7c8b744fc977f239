use thiserror::Error;

/// Unified error taxonomy for the protocol core (spec §7).
///
/// `Frame` and `Decrypt` failures are recoverable at the call site (the
/// offending candidate frame is simply dropped); `Transport` failures set
/// the session's force-reconnect latch; `Timeout` just means "no more
/// frames right now".
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("timed out waiting for a reply")]
    Timeout,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid prefix: {0:#010x}")]
    InvalidPrefix(u32),

    #[error("invalid suffix: {0:#010x}")]
    InvalidSuffix(u32),

    #[error("crc mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("frame shorter than the minimum 28 bytes")]
    TooShort,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("invalid PKCS#7 padding")]
    InvalidPadding,

    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("local key must be exactly 16 bytes")]
    BadKeyLength,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("local_key must be exactly 16 ASCII characters")]
    InvalidLocalKey,

    #[error("invalid device IP address: {0}")]
    InvalidIpAddress(String),
}
