//! Error taxonomy for the gateway.
//!
//! Mirrors the flat, string-carrying variant shape used throughout the
//! communication-service error module this crate was grown from, narrowed to
//! the six error kinds the gateway actually distinguishes: a malformed or
//! foreign frame, a syntactically valid but unimplemented request, an
//! internal invariant violation, a broker round-trip failure, a CAN I/O
//! failure, and a fatal condition that should abort the process.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// All failure conditions the gateway can produce.
///
/// Each variant corresponds to one policy in the error handling design:
/// frame errors are swallowed, unsupported requests are logged at debug and
/// dropped, driver errors are logged at warning and the loop continues,
/// broker errors substitute the undefined sensor value, CAN I/O errors drop
/// the in-flight request, and config/fatal errors terminate the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The frame is malformed, uses an unsupported message format, or is not
    /// addressed to anything we own. Callers should treat this as "ignore
    /// and continue", never as a reason to log above debug.
    #[error("frame error: {0}")]
    Frame(String),

    /// A syntactically valid frame requested a function or program type we
    /// don't implement.
    #[error("unsupported request: {0}")]
    Unsupported(String),

    /// An invariant the gateway itself is responsible for was violated
    /// (duplicate output channel, mis-indexed mapping, codec misuse).
    #[error("driver error: {0}")]
    Driver(String),

    /// The broker could not answer a read or write: missing device, missing
    /// control, or a transport failure on the broker connection.
    #[error("broker io error: {0}")]
    BrokerIo(String),

    /// The CAN bus could not complete a write: short write, or the write
    /// timed out waiting for loopback confirmation.
    #[error("can io error: {0}")]
    CanIo(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else that should bring the process down: socket read
    /// failure, a poisoned lock, an unrecoverable startup condition.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::Config(msg.into())
    }

    pub fn driver(msg: impl Into<String>) -> Self {
        GatewayError::Driver(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        GatewayError::Unsupported(msg.into())
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        GatewayError::Frame(msg.into())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::CanIo(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Config(e.to_string())
    }
}

/// Adds short-hand constructors for wrapping a foreign error as a specific
/// `GatewayError` variant with added context, the way `ErrorExt` does
/// upstream (`result.config_error("loading controllers")?`).
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn driver_error(self, msg: &str) -> Result<T>;
    fn can_error(self, msg: &str) -> Result<T>;
    fn broker_error(self, msg: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ErrorExt<T> for std::result::Result<T, E> {
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| GatewayError::Config(format!("{msg}: {e}")))
    }

    fn driver_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| GatewayError::Driver(format!("{msg}: {e}")))
    }

    fn can_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| GatewayError::CanIo(format!("{msg}: {e}")))
    }

    fn broker_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| GatewayError::BrokerIo(format!("{msg}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_wraps_with_message() {
        let r: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "nope"));
        let wrapped = r.config_error("loading controllers");
        assert!(matches!(wrapped, Err(GatewayError::Config(_))));
    }
}
