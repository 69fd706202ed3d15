//! Error taxonomy for the pedal bridge
//!
//! A read timeout is deliberately absent: it is an ordinary
//! [`ReadOutcome::Timeout`](crate::ports::ReadOutcome::Timeout), not an error.

use footpedal_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Device not found: vendor={vendor_id:#06x}, product={product_id:#06x}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Device access denied: {0}")]
    DeviceAccess(String),

    #[error("No IN endpoint on interface {interface}")]
    EndpointNotFound { interface: u8 },

    #[error("USB transport error: {0}")]
    Transport(#[source] rusb::Error),

    #[error("Failed to release device: {0}")]
    Release(#[source] rusb::Error),

    #[error("Failed to create virtual keyboard: {0}")]
    VirtualDevice(#[source] std::io::Error),

    #[error("Failed to emit key event: {0}")]
    Emit(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Errors the poll loop logs and survives. Anything else stops it.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Transport(_) | BridgeError::Protocol(_))
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::DeviceNotFound { .. } => 2,
            BridgeError::DeviceAccess(_) => 3,
            BridgeError::Config(_) => 4,
            _ => 1,
        }
    }

    pub(crate) fn access(action: &str, err: rusb::Error) -> Self {
        BridgeError::DeviceAccess(format!("{action}: {err}"))
    }
}
