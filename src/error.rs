//! Error types for the DHCP probe.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. Only [`Error::InvalidPacket`] and
//! [`Error::Timeout`] are expected while listening for offers; everything
//! else ends the run.

use std::time::Duration;

/// Errors that can occur while probing for DHCP servers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The network interface does not exist or has no hardware address.
    #[error("Interface error: {0}")]
    Interface(String),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 68 without administrator
    /// privileges, or when another DHCP client already owns the port.
    #[error("Socket error: {0}")]
    Socket(String),

    /// Malformed option framing handed to the codec.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed DHCP packet received.
    ///
    /// This includes packets that are too short, have invalid magic cookies
    /// or option lengths running past the end of the buffer.
    #[error("Invalid DHCP packet: {0}")]
    InvalidPacket(String),

    /// No datagram arrived within the receive window.
    #[error("Timed out after {0:?} waiting for a datagram")]
    Timeout(Duration),

    /// Sending the DISCOVER broadcast failed.
    #[error("Send error: {0}")]
    Send(String),

    /// Receive was attempted on a send-only handle.
    #[error("Transport was opened without listening")]
    NotListening,

    /// A hardware address that is not 6 bytes long.
    #[error("Invalid hardware address length: {0} (expected 6)")]
    InvalidHardwareAddress(usize),

    /// Invalid probe configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns true for errors the receive loop recovers from locally.
    pub fn is_decoding(&self) -> bool {
        matches!(self, Self::InvalidPacket(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// A specialized Result type for DHCP probe operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::InvalidPacket("bad cookie".to_string()).is_decoding());
        assert!(!Error::InvalidPacket("bad cookie".to_string()).is_timeout());
        assert!(Error::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!Error::NotListening.is_decoding());
        assert!(!Error::Send("unreachable".to_string()).is_timeout());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::InvalidHardwareAddress(4).to_string(),
            "Invalid hardware address length: 4 (expected 6)"
        );
        assert_eq!(
            Error::Interface("eth9 not found".to_string()).to_string(),
            "Interface error: eth9 not found"
        );
    }
}
