//! Driver and service node for the Anritsu MS2026C vector network analyzer.
//!
//! [`VnaDriver`] owns one instrument session and speaks the analyzer's
//! command syntax over any [`Connector`]. [`VnaService`] exposes the driver
//! as request/response services, and [`ServiceServer`] serves those over
//! JSON lines on TCP.

pub mod config;
pub mod driver;
pub mod error;
pub mod server;
pub mod service;
pub mod transport;

pub use crate::config::{AppConfig, load_config, load_config_or_default};
pub use driver::{
    CONNECTED_MESSAGE, CalibrationStatus, DeviceIdentity, SParameter, SweepConfig, TraceConfig,
    TraceFormat, TraceNumber, VnaDriver,
};
pub use error::{TransportError, VnaError};
pub use server::ServiceServer;
pub use service::{
    ConnectionRequest, ConnectionResponse, ServiceRequest, ServiceResponse, SweepSetupRequest,
    VnaService,
};
pub use transport::{
    ConnectionConfig, Connector, Session, SimulatedVna, TcpConnector, TcpSession,
};
