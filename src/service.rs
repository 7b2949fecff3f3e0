//! Request/response services over a shared [`VnaDriver`].
//!
//! Each service maps one request onto one driver call and reports the
//! outcome as plain flags and strings. Driver errors are logged here and
//! never passed on.

use crate::driver::{CONNECTED_MESSAGE, CalibrationStatus, SweepConfig, TraceNumber, VnaDriver};
use crate::error::VnaError;
use crate::transport::Connector;
use log::{info, warn};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

/// Largest point count accepted by the sweep setup service.
pub const MAX_SWEEP_POINTS: i64 = 4000;

pub const DISCONNECTED_MESSAGE: &str = "disconnected";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// `true` to connect to `ip_addr`, `false` to disconnect
    pub connection: bool,
    #[serde(default)]
    pub ip_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationStatusResponse {
    /// LOW = 0, MID = 1, HIGH = 2, NO_DATA = 3
    pub status: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSetupRequest {
    pub freq_start: i64,
    pub freq_stop: i64,
    pub freq_points: i64,
}

impl SweepSetupRequest {
    /// Range checks the driver leaves to its callers.
    pub fn validate(&self) -> Result<SweepConfig, VnaError> {
        if !(0..=MAX_SWEEP_POINTS).contains(&self.freq_points) {
            return Err(VnaError::InvalidRequest(format!(
                "freq_points {} outside 0-{MAX_SWEEP_POINTS}",
                self.freq_points
            )));
        }
        if self.freq_stop < 0 {
            return Err(VnaError::InvalidRequest(format!(
                "freq_stop {} is negative",
                self.freq_stop
            )));
        }
        if self.freq_start < 0 || self.freq_start > self.freq_stop {
            return Err(VnaError::InvalidRequest(format!(
                "freq_start {} outside 0-{}",
                self.freq_start, self.freq_stop
            )));
        }

        Ok(SweepConfig {
            start_hz: self.freq_start as u64,
            stop_hz: self.freq_stop as u64,
            points: self.freq_points as u32,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSetupResponse {
    pub success: bool,
}

/// Trace or frequency payload. `data` is empty when `success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponse {
    pub success: bool,
    pub data: String,
}

impl DataResponse {
    fn from_result(result: Result<String, VnaError>, what: &str) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data,
            },
            Err(e) => {
                warn!("{what} request failed: {e}");
                Self {
                    success: false,
                    data: String::new(),
                }
            }
        }
    }
}

/// A request addressed to one of the services by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service")]
pub enum ServiceRequest {
    #[serde(rename = "vna_connection")]
    Connection(ConnectionRequest),
    #[serde(rename = "vna_get_calibration_status")]
    CalibrationStatus,
    #[serde(rename = "vna_freq_sweep_setup")]
    SweepSetup(SweepSetupRequest),
    #[serde(rename = "vna_get_freq")]
    GetFreq,
    #[serde(rename = "vna_get_data")]
    GetData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service")]
pub enum ServiceResponse {
    #[serde(rename = "vna_connection")]
    Connection(ConnectionResponse),
    #[serde(rename = "vna_get_calibration_status")]
    CalibrationStatus(CalibrationStatusResponse),
    #[serde(rename = "vna_freq_sweep_setup")]
    SweepSetup(SweepSetupResponse),
    #[serde(rename = "vna_get_freq")]
    GetFreq(DataResponse),
    #[serde(rename = "vna_get_data")]
    GetData(DataResponse),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Service front end for one analyzer.
///
/// The driver sits behind a mutex so concurrent clients are serialized.
pub struct VnaService<C: Connector> {
    driver: Mutex<VnaDriver<C>>,
}

impl<C: Connector> VnaService<C> {
    pub fn new(driver: VnaDriver<C>) -> Self {
        Self {
            driver: Mutex::new(driver),
        }
    }

    /// Exclusive access to the driver for calls outside the services
    pub fn driver(&self) -> MutexGuard<'_, VnaDriver<C>> {
        self.driver.lock()
    }

    pub fn handle(&self, request: ServiceRequest) -> ServiceResponse {
        match request {
            ServiceRequest::Connection(request) => {
                ServiceResponse::Connection(self.connection(&request))
            }
            ServiceRequest::CalibrationStatus => {
                ServiceResponse::CalibrationStatus(self.calibration_status())
            }
            ServiceRequest::SweepSetup(request) => {
                ServiceResponse::SweepSetup(self.freq_sweep_setup(&request))
            }
            ServiceRequest::GetFreq => ServiceResponse::GetFreq(self.get_freq()),
            ServiceRequest::GetData => ServiceResponse::GetData(self.get_data()),
        }
    }

    pub fn connection(&self, request: &ConnectionRequest) -> ConnectionResponse {
        let mut driver = self.driver.lock();
        if !request.connection {
            return ConnectionResponse {
                success: driver.disconnect(),
                message: DISCONNECTED_MESSAGE.to_string(),
            };
        }

        match driver.connect(&request.ip_addr) {
            Ok(()) => ConnectionResponse {
                success: true,
                message: CONNECTED_MESSAGE.to_string(),
            },
            Err(e) => ConnectionResponse {
                success: false,
                message: e.to_string(),
            },
        }
    }

    pub fn calibration_status(&self) -> CalibrationStatusResponse {
        let status = self
            .driver
            .lock()
            .check_calibration_status()
            .unwrap_or_else(|e| {
                warn!("Calibration status unavailable: {e}");
                CalibrationStatus::NoData
            });
        CalibrationStatusResponse {
            status: status.code(),
        }
    }

    /// Validate and write the sweep, then restore the default trace setup.
    ///
    /// The response reflects the sweep write only.
    pub fn freq_sweep_setup(&self, request: &SweepSetupRequest) -> SweepSetupResponse {
        let sweep = match request.validate() {
            Ok(sweep) => sweep,
            Err(e) => {
                warn!("Rejected sweep setup: {e}");
                return SweepSetupResponse { success: false };
            }
        };

        let mut driver = self.driver.lock();
        let success = match driver.apply_sweep(&sweep) {
            Ok(()) => {
                info!(
                    "Sweep configured: {}-{} Hz, {} points",
                    sweep.start_hz, sweep.stop_hz, sweep.points
                );
                true
            }
            Err(e) => {
                warn!("Sweep setup failed: {e}");
                false
            }
        };

        if let Err(e) = driver.set_default_trace() {
            warn!("Default trace setup failed: {e}");
        }

        SweepSetupResponse { success }
    }

    pub fn get_freq(&self) -> DataResponse {
        let result = self.driver.lock().get_frequency(TraceNumber::default());
        DataResponse::from_result(result, "Frequency")
    }

    pub fn get_data(&self) -> DataResponse {
        let result = self.driver.lock().get_trace(TraceNumber::default());
        DataResponse::from_result(result, "Trace data")
    }
}
