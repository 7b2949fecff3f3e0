//! In-process model of an MS2026C used for tests and `vna-node --simulate`.
//!
//! The simulator answers the command set the driver speaks, keeps the sweep
//! and trace settings it has been sent, and records every command. Failures
//! can be injected per address or per command prefix.

use super::{Connector, Session};
use crate::error::TransportError;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_IDENTITY: &str = "\"Anritsu,MS2026C/2,1423001,V2.28\"";

const TRACE_SLOTS: usize = 4;

#[derive(Debug)]
struct SimState {
    identity: String,
    calibration_response: String,
    offline: bool,
    unreachable: HashSet<String>,
    failing_prefixes: Vec<String>,
    commands: Vec<String>,
    opened: usize,
    closed: usize,
    start_hz: u64,
    stop_hz: u64,
    points: u32,
    traces: [(String, String); TRACE_SLOTS],
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            calibration_response: "1".to_string(),
            offline: false,
            unreachable: HashSet::new(),
            failing_prefixes: Vec::new(),
            commands: Vec::new(),
            opened: 0,
            closed: 0,
            start_hz: 2_000_000,
            stop_hz: 6_000_000_000,
            points: 551,
            traces: std::array::from_fn(|_| ("S11".to_string(), "MLOGarithmic".to_string())),
        }
    }
}

impl SimState {
    fn respond(&mut self, command: &str) -> Result<String, TransportError> {
        if command == "*IDN?" {
            return Ok(self.identity.clone());
        }
        if command == ":SENS:CORR:COLL:STAT:ACC?" {
            return Ok(self.calibration_response.clone());
        }
        if let Some(slot) = parse_slot(command, ":CALC", ":DATA? SDAT") {
            self.trace_slot(slot)?;
            return Ok(self.trace_data());
        }
        if let Some(slot) = parse_slot(command, ":SENSE", ":FREQ:DATA?") {
            self.trace_slot(slot)?;
            return Ok(self.frequency_data());
        }
        Err(TransportError::Protocol(format!("Unknown query: {command}")))
    }

    fn apply(&mut self, command: &str) -> Result<(), TransportError> {
        let (header, value) = command
            .split_once(' ')
            .ok_or_else(|| TransportError::Protocol(format!("Missing argument: {command}")))?;

        match header {
            ":SENS:FREQ:STAR" => self.start_hz = parse_number(command, value)?,
            ":SENS:FREQ:STOP" => self.stop_hz = parse_number(command, value)?,
            ":SENS:SWE:POIN" => self.points = parse_number(command, value)?,
            _ => {
                if let Some(slot) = parse_slot(header, ":SENS:TRACE", ":SPAR") {
                    self.trace_slot(slot)?.0 = value.to_string();
                } else if let Some(slot) = parse_slot(header, ":CALC", ":FORM") {
                    self.trace_slot(slot)?.1 = value.to_string();
                } else {
                    return Err(TransportError::Protocol(format!(
                        "Unknown command: {command}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn trace_slot(&mut self, slot: usize) -> Result<&mut (String, String), TransportError> {
        slot.checked_sub(1)
            .and_then(|index| self.traces.get_mut(index))
            .ok_or_else(|| TransportError::Protocol(format!("No trace slot {slot}")))
    }

    fn frequency_data(&self) -> String {
        let points = self.points as u64;
        (0..points)
            .map(|i| {
                let step = if points > 1 {
                    (self.stop_hz.saturating_sub(self.start_hz)) * i / (points - 1)
                } else {
                    0
                };
                (self.start_hz + step).to_string()
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn trace_data(&self) -> String {
        (0..self.points)
            .map(|i| {
                let phase = i as f64 * 0.05;
                let magnitude = 0.5 / (1.0 + i as f64 * 0.01);
                format!("{:.6},{:.6}", magnitude * phase.cos(), -magnitude * phase.sin())
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn check_failure(&self, command: &str) -> Result<(), TransportError> {
        if self.offline
            || self
                .failing_prefixes
                .iter()
                .any(|prefix| command.starts_with(prefix.as_str()))
        {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }
}

/// `":CALC3:FORM"` with prefix `":CALC"` and suffix `":FORM"` yields `3`.
fn parse_slot(text: &str, prefix: &str, suffix: &str) -> Option<usize> {
    text.strip_prefix(prefix)?
        .strip_suffix(suffix)?
        .parse()
        .ok()
}

fn parse_number<T: std::str::FromStr>(command: &str, value: &str) -> Result<T, TransportError> {
    value
        .trim()
        .parse()
        .map_err(|_| TransportError::Protocol(format!("Bad numeric argument: {command}")))
}

/// Shared handle to a simulated analyzer. Clones observe the same instrument.
#[derive(Debug, Clone, Default)]
pub struct SimulatedVna {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedVna {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an instrument answering `*IDN?` with `identity`
    pub fn with_identity(self, identity: &str) -> Self {
        self.state.lock().identity = identity.to_string();
        self
    }

    /// Raw response to the calibration accuracy query
    pub fn set_calibration_response(&self, response: &str) {
        self.state.lock().calibration_response = response.to_string();
    }

    /// Refuse sessions to `address`
    pub fn mark_unreachable(&self, address: &str) {
        self.state.lock().unreachable.insert(address.to_string());
    }

    /// Time out every command starting with `prefix`
    pub fn fail_commands_starting_with(&self, prefix: &str) {
        self.state.lock().failing_prefixes.push(prefix.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_prefixes.clear();
        state.unreachable.clear();
        state.offline = false;
    }

    /// Take the whole instrument off the network: opens are refused and
    /// live sessions time out.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Every command received so far, in order, including failed ones
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// `(start_hz, stop_hz, points)` as last written
    pub fn sweep(&self) -> (u64, u64, u32) {
        let state = self.state.lock();
        (state.start_hz, state.stop_hz, state.points)
    }

    /// `(s_parameter, format)` of trace slot 1-4
    pub fn trace_setup(&self, slot: usize) -> Option<(String, String)> {
        let state = self.state.lock();
        slot.checked_sub(1)
            .and_then(|index| state.traces.get(index))
            .cloned()
    }

    pub fn opened_sessions(&self) -> usize {
        self.state.lock().opened
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.lock().closed
    }
}

impl Connector for SimulatedVna {
    type Session = SimSession;

    fn open(&self, address: &str) -> Result<SimSession, TransportError> {
        let mut state = self.state.lock();
        if state.offline || state.unreachable.contains(address) {
            return Err(TransportError::Unreachable(address.to_string()));
        }
        state.opened += 1;
        debug!("Simulated session opened for {address}");
        Ok(SimSession {
            state: Arc::clone(&self.state),
            open: true,
        })
    }
}

/// Session against a [`SimulatedVna`].
#[derive(Debug)]
pub struct SimSession {
    state: Arc<Mutex<SimState>>,
    open: bool,
}

impl Session for SimSession {
    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let mut state = self.state.lock();
        state.commands.push(command.to_string());
        state.check_failure(command)?;
        state.respond(command)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let mut state = self.state.lock();
        state.commands.push(command.to_string());
        state.check_failure(command)?;
        state.apply(command)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().closed += 1;
        }
    }
}

impl Drop for SimSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_and_frequency_axis() {
        let vna = SimulatedVna::new();
        let mut session = vna.open("sim").unwrap();
        session.write(":SENS:FREQ:STAR 1000").unwrap();
        session.write(":SENS:FREQ:STOP 2000").unwrap();
        session.write(":SENS:SWE:POIN 3").unwrap();

        assert_eq!(vna.sweep(), (1000, 2000, 3));
        assert_eq!(session.query(":SENSE1:FREQ:DATA?").unwrap(), "1000,1500,2000");

        let data = session.query(":CALC1:DATA? SDAT").unwrap();
        assert_eq!(data.split(',').count(), 6);
    }

    #[test]
    fn test_trace_setup_is_stored_per_slot() {
        let vna = SimulatedVna::new();
        let mut session = vna.open("sim").unwrap();
        session.write(":SENS:TRACE2:SPAR S21").unwrap();
        session.write(":CALC2:FORM SMITh").unwrap();

        assert_eq!(
            vna.trace_setup(2),
            Some(("S21".to_string(), "SMITh".to_string()))
        );
        assert!(session.write(":CALC5:FORM SMITh").is_err());
        assert_eq!(vna.trace_setup(0), None);
    }

    #[test]
    fn test_unknown_commands_are_rejected() {
        let vna = SimulatedVna::new();
        let mut session = vna.open("sim").unwrap();
        assert!(session.write(":SYST:PRES").is_err());
        assert!(session.query(":SYST:ERR?").is_err());
        assert!(session.write(":SENS:SWE:POIN many").is_err());
    }

    #[test]
    fn test_injected_failures() {
        let vna = SimulatedVna::new();
        vna.mark_unreachable("10.0.0.9");
        assert!(matches!(
            vna.open("10.0.0.9"),
            Err(TransportError::Unreachable(_))
        ));

        let mut session = vna.open("10.0.0.1").unwrap();
        vna.fail_commands_starting_with(":SENS:FREQ");
        assert!(matches!(
            session.write(":SENS:FREQ:STAR 1"),
            Err(TransportError::Timeout)
        ));
        assert!(session.write(":SENS:SWE:POIN 10").is_ok());

        vna.clear_failures();
        assert!(session.write(":SENS:FREQ:STAR 1").is_ok());
        assert_eq!(vna.commands().len(), 3);
    }

    #[test]
    fn test_session_close_is_counted_once() {
        let vna = SimulatedVna::new();
        let mut session = vna.open("sim").unwrap();
        session.close();
        session.close();
        drop(session);
        assert_eq!(vna.opened_sessions(), 1);
        assert_eq!(vna.closed_sessions(), 1);
    }
}
