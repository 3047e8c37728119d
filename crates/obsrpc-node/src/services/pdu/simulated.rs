//! In-memory PDU for bench setups and tests.

use std::sync::Mutex;

use async_trait::async_trait;
use obsrpc_core::{ErrorCode, Status};

use super::PduDriver;

pub const NOMINAL_VOLTAGE: f64 = 220.0;
/// Draw of one powered outlet, in amperes.
pub const OUTLET_LOAD: f64 = 0.5;

pub struct SimulatedPdu {
    outlets: Vec<String>,
    powered: Mutex<Vec<bool>>,
    fault: Mutex<Option<ErrorCode>>,
}

impl SimulatedPdu {
    pub fn new(outlets: Vec<String>) -> Self {
        let powered = Mutex::new(vec![false; outlets.len()]);
        Self {
            outlets,
            powered,
            fault: Mutex::new(None),
        }
    }

    /// Make `probe` fail with `fault` until cleared with `None`.
    pub fn set_fault(&self, fault: Option<ErrorCode>) {
        *self.fault.lock().unwrap_or_else(|p| p.into_inner()) = fault;
    }

    fn slot(&self, channel: u16) -> Result<usize, ErrorCode> {
        let ch = usize::from(channel);
        if ch == 0 || ch > self.outlets.len() {
            return Err(ErrorCode::InvalidArgument);
        }
        Ok(ch - 1)
    }

    fn switch(&self, channel: u16, on: bool) -> Status {
        let slot = self.slot(channel)?;
        let mut powered = self.powered.lock().unwrap_or_else(|p| p.into_inner());
        powered[slot] = on;
        tracing::debug!(outlet = %self.outlets[slot], on, "outlet switched");
        Ok(())
    }
}

#[async_trait]
impl PduDriver for SimulatedPdu {
    async fn turn_on(&self, channel: u16) -> Status {
        self.switch(channel, true)
    }

    async fn turn_off(&self, channel: u16) -> Status {
        self.switch(channel, false)
    }

    async fn voltage(&self, channel: u16) -> Result<f64, ErrorCode> {
        self.slot(channel)?;
        Ok(NOMINAL_VOLTAGE)
    }

    async fn current(&self, channel: u16) -> Result<f64, ErrorCode> {
        let slot = self.slot(channel)?;
        let powered = self.powered.lock().unwrap_or_else(|p| p.into_inner());
        Ok(if powered[slot] { OUTLET_LOAD } else { 0.0 })
    }

    async fn status(&self) -> Result<Vec<u8>, ErrorCode> {
        let powered = self.powered.lock().unwrap_or_else(|p| p.into_inner());
        Ok(powered.iter().map(|on| u8::from(*on)).collect())
    }

    async fn channel_by_name(&self, name: &str) -> Result<u16, ErrorCode> {
        self.outlets
            .iter()
            .position(|o| o == name)
            .and_then(|i| u16::try_from(i + 1).ok())
            .ok_or(ErrorCode::NotFound)
    }

    async fn probe(&self) -> Status {
        match *self.fault.lock().unwrap_or_else(|p| p.into_inner()) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }
}
