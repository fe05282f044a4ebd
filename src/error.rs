//! # RDZ Error Handling
//!
//! Error types for the RDZ bridge, split along the two layers that can fail:
//!
//! ## Transport Errors
//! - **ConnectFailed**: the TCP connection to the controller could not be opened
//! - **ConnectionLost**: an established connection broke while a request was on the wire
//! - **Timeout**: a single Modbus call exceeded its configured timeout
//! - **Protocol**: malformed frames, mismatched transaction ids, Modbus exception responses
//!
//! Every transport error is recoverable: the coordinator absorbs them during polling
//! and the next cycle (or the next write) reconnects.
//!
//! ## Coordinator Errors
//! - **Validation**: a caller supplied an out-of-range value; nothing was sent to the controller
//! - **InvalidZone**: the operation is not permitted for the zone's type or configuration state
//! - **SeasonUnknown**: a season-routed write was requested before the season coil was ever read
//! - **Configuration**: the configuration file or zone registry is invalid
//! - **ShutDown**: the coordinator has released its connection
//!
//! ## Usage
//!
//! ```rust
//! use rdz_hmi_control::{RdzError, RdzResult};
//!
//! fn report(result: RdzResult<()>) {
//!     match result {
//!         Ok(()) => println!("written"),
//!         Err(error) if error.is_recoverable() => println!("try again later: {}", error),
//!         Err(RdzError::InvalidZone { zone_id, reason }) => {
//!             println!("zone {} refused the write: {}", zone_id, reason);
//!         }
//!         Err(error) => println!("rejected: {}", error),
//!     }
//! }
//! ```

use thiserror::Error;

use crate::protocol::ModbusException;

/// Result type alias for transport-level operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type alias for coordinator-level operations
pub type RdzResult<T> = Result<T, RdzError>;

/// Network and protocol layer failures
///
/// Raised by the transport and client layers. None of these carry domain
/// knowledge; the coordinator decides whether to absorb or surface them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Connection establishment failed
    ///
    /// # Examples
    /// - Connection refused by the controller
    /// - Host name does not resolve
    /// - Connect did not finish within the timeout
    #[error("Connection to {address} failed: {message}")]
    ConnectFailed { address: String, message: String },

    /// An established connection broke mid-request
    ///
    /// The socket is dropped; the next request reconnects.
    #[error("Connection lost: {message}")]
    ConnectionLost { message: String },

    /// A request exceeded its timeout
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Protocol-level errors
    ///
    /// # Examples
    /// - Truncated or oversized MBAP frame
    /// - Transaction id in the response does not match the request
    /// - Modbus exception response from the controller
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl TransportError {
    /// Create a new connect error
    ///
    /// # Arguments
    ///
    /// * `address` - The `host:port` the connection was attempted to
    /// * `message` - Descriptive error message
    pub fn connect_failed<A: Into<String>, S: Into<String>>(address: A, message: S) -> Self {
        Self::ConnectFailed {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a new connection-lost error
    pub fn connection_lost<S: Into<String>>(message: S) -> Self {
        Self::ConnectionLost { message: message.into() }
    }

    /// Create a new timeout error
    ///
    /// # Arguments
    ///
    /// * `operation` - Description of the operation that timed out
    /// * `timeout_ms` - Timeout duration in milliseconds
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol { message: message.into() }
    }

    /// Create a protocol error from a Modbus exception response
    ///
    /// Maps the standard exception codes to readable names.
    ///
    /// # Arguments
    ///
    /// * `function` - Original function code that caused the exception
    /// * `code` - Modbus exception code
    pub fn exception(function: u8, code: u8) -> Self {
        let name = ModbusException::from_u8(code)
            .map(ModbusException::description)
            .unwrap_or("Unknown Exception");
        Self::Protocol {
            message: format!(
                "Modbus exception: function={:02X}, code={:02X} ({})",
                function, code, name
            ),
        }
    }

    /// Check if the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Transport errors are always recoverable by a later retry or reconnect
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::connection_lost(err.to_string())
    }
}

/// Coordinator-level errors surfaced to collaborators
///
/// Staleness is never an error: failed poll groups are reported as flags
/// on the snapshot instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RdzError {
    /// A transport failure during an explicit write or probe
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Out-of-range or malformed value supplied by the caller
    ///
    /// # Examples
    /// - Setpoint of 40.0 °C with the default 5.0–35.0 °C band
    /// - Month 13
    /// - System id 9
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Operation not permitted for this zone
    ///
    /// # Examples
    /// - Temperature write to a virtual or unconfigured zone
    /// - Any write of the derived HVAC mode
    #[error("Invalid zone {zone_id}: {reason}")]
    InvalidZone { zone_id: u8, reason: String },

    /// Season-routed write requested before the season coil was ever read
    #[error("Season is unknown until the first successful poll")]
    SeasonUnknown,

    /// Configuration or zone registry errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The coordinator has been shut down
    #[error("Coordinator is shut down")]
    ShutDown,
}

impl RdzError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a new invalid-zone error
    ///
    /// # Arguments
    ///
    /// * `zone_id` - The zone the operation targeted
    /// * `reason` - Why the zone refuses the operation
    pub fn invalid_zone<S: Into<String>>(zone_id: u8, reason: S) -> Self {
        Self::InvalidZone {
            zone_id,
            reason: reason.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Check if this error originates from the network or protocol layer
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if the caller may reasonably retry the same request later
    ///
    /// Validation and zone errors will fail the same way every time.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_recoverable(),
            Self::SeasonUnknown => true,
            Self::Validation { .. }
            | Self::InvalidZone { .. }
            | Self::Configuration { .. }
            | Self::ShutDown => false,
        }
    }
}

impl From<std::io::Error> for RdzError {
    fn from(err: std::io::Error) -> Self {
        Self::configuration(format!("I/O error: {}", err))
    }
}

impl From<serde_yaml::Error> for RdzError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::configuration(format!("YAML error: {}", err))
    }
}

impl From<serde_json::Error> for RdzError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("JSON error: {}", err))
    }
}
