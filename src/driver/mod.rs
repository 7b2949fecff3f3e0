use crate::error::{TransportError, VnaError};
use crate::transport::{Connector, Session};
use log::{debug, info, warn};

pub mod commands;
pub mod types;

pub use types::{
    CalibrationStatus, DeviceIdentity, SParameter, SweepConfig, TraceConfig, TraceFormat,
    TraceNumber,
};

/// Message reported by the connection service on success.
pub const CONNECTED_MESSAGE: &str = "connected";

struct ActiveSession<S> {
    address: String,
    session: S,
}

/// Driver for one vector network analyzer session.
///
/// `VnaDriver` owns at most one transport session. It is connected exactly
/// when that session exists and the instrument has identified itself as the
/// expected make and model. Every operation other than [`connect`] and
/// [`disconnect`] fails with [`VnaError::NotConnected`] when there is no
/// session.
///
/// Transport failures never escape as panics: configuration and data calls
/// return them as errors, [`test_connection`] reports them as `false`, and
/// [`check_calibration_status`] folds them into [`CalibrationStatus::NoData`].
/// Nothing is retried.
///
/// # Examples
/// ```
/// use vna_driver::{SimulatedVna, TraceConfig, TraceNumber, VnaDriver};
///
/// let mut driver = VnaDriver::new(SimulatedVna::new());
/// driver.connect("192.168.0.10")?;
/// driver.set_frequency_sweep(2_000_000, 3_000_000_000, 201)?;
/// driver.set_trace(&TraceConfig::default())?;
/// let trace = driver.get_trace(TraceNumber::default())?;
/// assert!(!trace.is_empty());
/// driver.disconnect();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// [`connect`]: VnaDriver::connect
/// [`disconnect`]: VnaDriver::disconnect
/// [`test_connection`]: VnaDriver::test_connection
/// [`check_calibration_status`]: VnaDriver::check_calibration_status
pub struct VnaDriver<C: Connector> {
    connector: C,
    identity: DeviceIdentity,
    active: Option<ActiveSession<C::Session>>,
}

impl<C: Connector> VnaDriver<C> {
    /// Create a disconnected driver expecting the default identity.
    pub fn new(connector: C) -> Self {
        Self::with_identity(connector, DeviceIdentity::default())
    }

    pub fn with_identity(connector: C, identity: DeviceIdentity) -> Self {
        Self {
            connector,
            identity,
            active: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Address of the live session, if any
    pub fn address(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.address.as_str())
    }

    /// Open a session to `address` and verify the instrument identity.
    ///
    /// Any existing session is closed first, so a failed attempt always
    /// leaves the driver disconnected.
    ///
    /// # Errors
    /// - [`VnaError::Connection`] if the transport cannot open or query the instrument
    /// - [`VnaError::IdentityMismatch`] if the vendor or model differ from the expected identity
    pub fn connect(&mut self, address: &str) -> Result<(), VnaError> {
        if let Some(previous) = self.active.as_ref() {
            info!("Replacing session to {} with {address}", previous.address);
        }
        self.disconnect();

        let mut session = self.connector.open(address).map_err(|e| {
            warn!("Could not open session to {address}: {e}");
            VnaError::Connection(e)
        })?;

        let response = match session.query(commands::IDENTIFY) {
            Ok(response) => response,
            Err(e) => {
                warn!("Identification query to {address} failed: {e}");
                session.close();
                return Err(VnaError::Connection(e));
            }
        };

        let (vendor, model) = DeviceIdentity::parse_response(&response);
        if !self.identity.matches(&vendor, &model) {
            warn!(
                "Device at {address} is {vendor} {model}, expected {} {}",
                self.identity.vendor, self.identity.model
            );
            session.close();
            return Err(VnaError::IdentityMismatch { vendor, model });
        }

        info!("Connected to {vendor} {model} at {address}");
        self.active = Some(ActiveSession {
            address: address.to_string(),
            session,
        });
        Ok(())
    }

    /// Close the session if there is one. Always succeeds.
    pub fn disconnect(&mut self) -> bool {
        if let Some(mut active) = self.active.take() {
            active.session.close();
            info!("Disconnected from {}", active.address);
        }
        true
    }

    /// Ask the instrument to identify itself.
    ///
    /// Returns `Ok(false)` when the instrument does not answer. The session
    /// is kept either way; call [`disconnect`](Self::disconnect) to reset it.
    pub fn test_connection(&mut self) -> Result<bool, VnaError> {
        match self.session()?.query(commands::IDENTIFY) {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Instrument did not respond: {e}");
                Ok(false)
            }
        }
    }

    /// Read the calibration accuracy.
    ///
    /// Unreachable instruments and unparseable answers both read as
    /// [`CalibrationStatus::NoData`].
    pub fn check_calibration_status(&mut self) -> Result<CalibrationStatus, VnaError> {
        match self.session()?.query(commands::CALIBRATION_ACCURACY) {
            Ok(response) => {
                let status = CalibrationStatus::from_response(&response);
                debug!("Calibration response {response:?} -> {status:?}");
                Ok(status)
            }
            Err(e) => {
                warn!("Calibration status query failed: {e}");
                Ok(CalibrationStatus::NoData)
            }
        }
    }

    /// Write start frequency, stop frequency and point count, in that order.
    ///
    /// Values are passed through unchecked. The first failing write aborts
    /// the sequence; earlier writes are not rolled back.
    pub fn set_frequency_sweep(
        &mut self,
        start_hz: u64,
        stop_hz: u64,
        points: u32,
    ) -> Result<(), VnaError> {
        let session = self.session()?;
        session.write(&commands::start_frequency(start_hz))?;
        session.write(&commands::stop_frequency(stop_hz))?;
        session.write(&commands::sweep_points(points))?;
        debug!("Sweep set to {start_hz}-{stop_hz} Hz, {points} points");
        Ok(())
    }

    pub fn apply_sweep(&mut self, sweep: &SweepConfig) -> Result<(), VnaError> {
        self.set_frequency_sweep(sweep.start_hz, sweep.stop_hz, sweep.points)
    }

    /// Select the S-parameter and then the display format of a trace slot.
    pub fn set_trace(&mut self, trace: &TraceConfig) -> Result<(), VnaError> {
        let session = self.session()?;
        session.write(&commands::trace_parameter(trace.number, trace.s_parameter))?;
        session.write(&commands::trace_format(trace.number, trace.format))?;
        debug!(
            "Trace {} set to {} ({})",
            trace.number, trace.s_parameter, trace.format
        );
        Ok(())
    }

    /// Trace 1, S21, Smith chart.
    pub fn set_default_trace(&mut self) -> Result<(), VnaError> {
        self.set_trace(&TraceConfig::default())
    }

    /// Raw complex data of a trace slot, exactly as the instrument sent it.
    pub fn get_trace(&mut self, trace: TraceNumber) -> Result<String, VnaError> {
        self.fetch(&commands::trace_data(trace))
    }

    /// Raw frequency axis of a trace slot, exactly as the instrument sent it.
    pub fn get_frequency(&mut self, trace: TraceNumber) -> Result<String, VnaError> {
        self.fetch(&commands::frequency_data(trace))
    }

    fn fetch(&mut self, query: &str) -> Result<String, VnaError> {
        self.session()?.query(query).map_err(|e: TransportError| {
            warn!("{query} failed: {e}");
            VnaError::Transport(e)
        })
    }

    fn session(&mut self) -> Result<&mut C::Session, VnaError> {
        self.active
            .as_mut()
            .map(|active| &mut active.session)
            .ok_or(VnaError::NotConnected)
    }
}

impl<C: Connector> Drop for VnaDriver<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
