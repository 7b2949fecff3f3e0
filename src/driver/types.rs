use crate::error::VnaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calibration accuracy reported by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStatus {
    Low,
    Mid,
    High,
    /// No calibration data, or the instrument could not be asked.
    NoData,
}

impl CalibrationStatus {
    /// Map the raw code of `:SENS:CORR:COLL:STAT:ACC?`.
    ///
    /// The mid band spans two raw codes. Anything unknown reads as no data.
    pub fn from_device_code(code: i64) -> Self {
        match code {
            4 => Self::Low,
            3 | 2 => Self::Mid,
            1 => Self::High,
            _ => Self::NoData,
        }
    }

    /// Parse a raw response line, folding malformed input into `NoData`.
    pub fn from_response(response: &str) -> Self {
        response
            .trim()
            .parse::<i64>()
            .map(Self::from_device_code)
            .unwrap_or(Self::NoData)
    }

    /// Integer published by the calibration status service.
    pub fn code(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Mid => 1,
            Self::High => 2,
            Self::NoData => 3,
        }
    }
}

/// Trace slot on the instrument (1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TraceNumber(u8);

impl TraceNumber {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn new(number: u8) -> Result<Self, VnaError> {
        if (Self::MIN..=Self::MAX).contains(&number) {
            Ok(Self(number))
        } else {
            Err(VnaError::InvalidTrace(number))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for TraceNumber {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for TraceNumber {
    type Error = VnaError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Self::new(number)
    }
}

impl From<TraceNumber> for u8 {
    fn from(number: TraceNumber) -> u8 {
        number.0
    }
}

impl fmt::Display for TraceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two-port scattering parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SParameter {
    S11,
    S12,
    #[default]
    S21,
    S22,
}

impl SParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S11 => "S11",
            Self::S12 => "S12",
            Self::S21 => "S21",
            Self::S22 => "S22",
        }
    }
}

impl fmt::Display for SParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SParameter {
    type Err = VnaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S11" => Ok(Self::S11),
            "S12" => Ok(Self::S12),
            "S21" => Ok(Self::S21),
            "S22" => Ok(Self::S22),
            other => Err(VnaError::InvalidRequest(format!(
                "Unknown S-parameter: {other}"
            ))),
        }
    }
}

/// Trace display format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TraceFormat {
    /// Complex reflection on the Smith chart
    #[default]
    Smith,
    LogMagnitude,
    LinearMagnitude,
    Phase,
    Polar,
    Real,
    Imaginary,
    Swr,
    GroupDelay,
}

impl TraceFormat {
    /// Instrument mnemonic, sent verbatim.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Smith => "SMITh",
            Self::LogMagnitude => "MLOGarithmic",
            Self::LinearMagnitude => "MLINear",
            Self::Phase => "PHASe",
            Self::Polar => "POLar",
            Self::Real => "REAL",
            Self::Imaginary => "IMAGinary",
            Self::Swr => "SWR",
            Self::GroupDelay => "GDELay",
        }
    }

    const ALL: [TraceFormat; 9] = [
        Self::Smith,
        Self::LogMagnitude,
        Self::LinearMagnitude,
        Self::Phase,
        Self::Polar,
        Self::Real,
        Self::Imaginary,
        Self::Swr,
        Self::GroupDelay,
    ];
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for TraceFormat {
    type Err = VnaError;

    /// Accepts the full mnemonic or its short (upper-case) form, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|format| {
                let mnemonic = format.mnemonic();
                let short: String = mnemonic.chars().filter(|c| c.is_ascii_uppercase()).collect();
                mnemonic.to_ascii_uppercase() == wanted || short == wanted
            })
            .ok_or_else(|| VnaError::InvalidRequest(format!("Unknown trace format: {s}")))
    }
}

/// Frequency axis written to the instrument before a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub start_hz: u64,
    pub stop_hz: u64,
    pub points: u32,
}

/// Measurement trace setup: slot, parameter and display format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    pub number: TraceNumber,
    pub s_parameter: SParameter,
    pub format: TraceFormat,
}

/// Vendor and model the instrument must report from `*IDN?`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor: String,
    pub model: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            vendor: "Anritsu".to_string(),
            model: "MS2026C/2".to_string(),
        }
    }
}

impl DeviceIdentity {
    /// Split an identification response into `(vendor, model)`.
    ///
    /// Quote characters are removed and fields are comma separated. Missing
    /// fields come back empty.
    pub fn parse_response(response: &str) -> (String, String) {
        let cleaned = response.replace('"', "");
        let mut fields = cleaned.split(',');
        let vendor = fields.next().unwrap_or_default().to_string();
        let model = fields.next().unwrap_or_default().to_string();
        (vendor, model)
    }

    pub fn matches(&self, vendor: &str, model: &str) -> bool {
        self.vendor == vendor && self.model == model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_code_mapping() {
        assert_eq!(CalibrationStatus::from_device_code(4), CalibrationStatus::Low);
        assert_eq!(CalibrationStatus::from_device_code(3), CalibrationStatus::Mid);
        assert_eq!(CalibrationStatus::from_device_code(2), CalibrationStatus::Mid);
        assert_eq!(CalibrationStatus::from_device_code(1), CalibrationStatus::High);
        assert_eq!(CalibrationStatus::from_device_code(0), CalibrationStatus::NoData);
        assert_eq!(CalibrationStatus::from_device_code(9), CalibrationStatus::NoData);
        assert_eq!(CalibrationStatus::from_device_code(-1), CalibrationStatus::NoData);
    }

    #[test]
    fn test_calibration_response_parsing() {
        assert_eq!(CalibrationStatus::from_response(" 3\n"), CalibrationStatus::Mid);
        assert_eq!(CalibrationStatus::from_response("HIGH"), CalibrationStatus::NoData);
        assert_eq!(CalibrationStatus::from_response(""), CalibrationStatus::NoData);
    }

    #[test]
    fn test_calibration_service_codes() {
        assert_eq!(CalibrationStatus::Low.code(), 0);
        assert_eq!(CalibrationStatus::Mid.code(), 1);
        assert_eq!(CalibrationStatus::High.code(), 2);
        assert_eq!(CalibrationStatus::NoData.code(), 3);
    }

    #[test]
    fn test_trace_number_bounds() {
        assert!(TraceNumber::new(0).is_err());
        assert_eq!(TraceNumber::new(4).unwrap().get(), 4);
        assert!(matches!(TraceNumber::new(5), Err(VnaError::InvalidTrace(5))));
        assert_eq!(TraceNumber::default().get(), 1);
    }

    #[test]
    fn test_trace_format_parsing() {
        assert_eq!("SMITh".parse::<TraceFormat>().unwrap(), TraceFormat::Smith);
        assert_eq!("smith".parse::<TraceFormat>().unwrap(), TraceFormat::Smith);
        assert_eq!("MLOG".parse::<TraceFormat>().unwrap(), TraceFormat::LogMagnitude);
        assert_eq!("swr".parse::<TraceFormat>().unwrap(), TraceFormat::Swr);
        assert!("bogus".parse::<TraceFormat>().is_err());
    }

    #[test]
    fn test_default_trace_config() {
        let config = TraceConfig::default();
        assert_eq!(config.number.get(), 1);
        assert_eq!(config.s_parameter, SParameter::S21);
        assert_eq!(config.format.mnemonic(), "SMITh");
    }

    #[test]
    fn test_identity_parsing() {
        let (vendor, model) = DeviceIdentity::parse_response("\"Anritsu,MS2026C/2,123,V1\"");
        assert_eq!(vendor, "Anritsu");
        assert_eq!(model, "MS2026C/2");

        let (vendor, model) = DeviceIdentity::parse_response("garbage");
        assert_eq!(vendor, "garbage");
        assert_eq!(model, "");
        assert!(!DeviceIdentity::default().matches(&vendor, &model));
    }

    #[test]
    fn test_s_parameter_parsing() {
        assert_eq!(" s11 ".parse::<SParameter>().unwrap(), SParameter::S11);
        assert_eq!("S22".parse::<SParameter>().unwrap(), SParameter::S22);
        for param in [SParameter::S11, SParameter::S12, SParameter::S21, SParameter::S22] {
            assert_eq!(param.to_string().parse::<SParameter>().unwrap(), param);
        }
        assert!(matches!(
            "S33".parse::<SParameter>(),
            Err(VnaError::InvalidRequest(_))
        ));
        assert!("".parse::<SParameter>().is_err());
    }
}
