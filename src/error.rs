use thiserror::Error;

/// Failures raised by a transport while talking to the instrument.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
    #[error("Connection timeout")]
    Timeout,
    #[error("Instrument unreachable: {0}")]
    Unreachable(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Session closed")]
    Closed,
}

impl TransportError {
    /// Wrap an IO error, mapping socket timeouts to [`TransportError::Timeout`].
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        match source.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            _ => Self::Io {
                source,
                context: context.into(),
            },
        }
    }
}

/// Errors returned by [`crate::VnaDriver`] operations.
///
/// The display text of `IdentityMismatch` and `Connection` is the message
/// reported to callers of the connection service.
#[derive(Error, Debug)]
pub enum VnaError {
    #[error("not connected")]
    NotConnected,
    #[error("device identity mismatch")]
    IdentityMismatch { vendor: String, model: String },
    #[error("connection error")]
    Connection(#[source] TransportError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Invalid trace number: {0} (expected 1-4)")]
    InvalidTrace(u8),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}
