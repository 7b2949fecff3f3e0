//! Instrument transports.
//!
//! A [`Connector`] opens a [`Session`] to an instrument address. The session
//! exchanges ASCII command strings with the firmware: `write` for settings,
//! `query` for anything that produces a response line.

use crate::error::TransportError;
use std::time::Duration;

pub mod sim;
pub mod tcp;

pub use sim::SimulatedVna;
pub use tcp::{TcpConnector, TcpSession};

/// An open handle to one instrument.
pub trait Session: Send {
    /// Send a command and wait for its response line.
    fn query(&mut self, command: &str) -> Result<String, TransportError>;

    /// Send a command that produces no response.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Release the handle. Calling it more than once is harmless.
    fn close(&mut self);
}

/// Opens sessions to instruments.
pub trait Connector: Send + Sync {
    type Session: Session;

    fn open(&self, address: &str) -> Result<Self::Session, TransportError>;
}

/// Connection configuration for the TCP transport.
///
/// Contains timeout settings for different phases of the TCP connection lifecycle.
/// All timeouts have sensible defaults but can be customized for specific network conditions.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vna_driver::ConnectionConfig;
///
/// // Use default timeouts
/// let config = ConnectionConfig::default();
///
/// // Longer reads for large trace transfers
/// let config = ConnectionConfig {
///     read_timeout: Duration::from_secs(30),
///     ..config
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing the initial TCP connection
    pub connect_timeout: Duration,
    /// Timeout for reading a response line from the instrument
    pub read_timeout: Duration,
    /// Timeout for writing a command to the instrument
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}
