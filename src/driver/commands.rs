//! Instrument command syntax. The firmware expects these strings literally.

use super::types::{SParameter, TraceFormat, TraceNumber};

pub const IDENTIFY: &str = "*IDN?";
pub const CALIBRATION_ACCURACY: &str = ":SENS:CORR:COLL:STAT:ACC?";

pub fn start_frequency(hz: u64) -> String {
    format!(":SENS:FREQ:STAR {hz}")
}

pub fn stop_frequency(hz: u64) -> String {
    format!(":SENS:FREQ:STOP {hz}")
}

pub fn sweep_points(points: u32) -> String {
    format!(":SENS:SWE:POIN {points}")
}

pub fn trace_parameter(trace: TraceNumber, s_parameter: SParameter) -> String {
    format!(":SENS:TRACE{trace}:SPAR {s_parameter}")
}

pub fn trace_format(trace: TraceNumber, format: TraceFormat) -> String {
    format!(":CALC{trace}:FORM {format}")
}

pub fn trace_data(trace: TraceNumber) -> String {
    format!(":CALC{trace}:DATA? SDAT")
}

pub fn frequency_data(trace: TraceNumber) -> String {
    format!(":SENSE{trace}:FREQ:DATA?")
}
