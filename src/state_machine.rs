//! The enumeration lifecycle: allocation/teardown of the local identity,
//! plus the hold-down/transition logic driven by `ticker.rs`. State is a
//! plain enum rather than a raw status bitfield.

use rand::rngs::StdRng;

use crate::device::Device;
use crate::error::Error;

/// Lifecycle state of the local Device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Not enumerated, no identity allocated.
    Idle,
    /// Identity allocated, `PROPOSING` set, hold-down counting up.
    Proposing,
    /// Identity confirmed, `PROPOSING` cleared.
    Enumerated,
    /// Link lost for more than the liveness threshold.
    Disconnected,
}

pub struct StateMachine {
    state: ControlState,
    device: Option<Device>,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            state: ControlState::Idle,
            device: None,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn set_state(&mut self, state: ControlState) {
        self.state = state;
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> Option<&mut Device> {
        self.device.as_mut()
    }

    pub fn is_enumerated(&self) -> bool {
        self.state == ControlState::Enumerated
    }

    pub fn is_enumerating(&self) -> bool {
        self.state == ControlState::Proposing
    }

    /// Allocates a fresh local identity and moves to `Proposing`, or
    /// returns `InvalidState` if already enumerating/enumerated, or if
    /// there are no host services to advertise.
    pub fn enumerate(
        &mut self,
        serial: u64,
        rng: &mut StdRng,
        name: Option<Vec<u8>>,
        has_host_services: bool,
    ) -> Result<(), Error> {
        if self.state != ControlState::Idle {
            return Err(Error::InvalidState);
        }
        if !has_host_services {
            return Err(Error::InvalidState);
        }
        self.device = Some(Device::allocate(serial, rng, name));
        self.state = ControlState::Proposing;
        Ok(())
    }

    /// Clears the enumerate intent and tears down the local identity,
    /// returning to `Idle` from any other state.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        if self.state == ControlState::Idle {
            return Err(Error::InvalidState);
        }
        self.state = ControlState::Idle;
        self.device = None;
        Ok(())
    }

    /// Re-rolls this node's bus address after losing a collision and
    /// re-enters `Proposing`. No-op if there is no local device (cannot
    /// happen once enumeration has started, since only `disconnect()`
    /// clears it, and callers only reroll while Proposing/Enumerated).
    pub fn reroll(&mut self, rng: &mut StdRng) {
        if let Some(device) = self.device.as_mut() {
            device.reroll_address(rng);
            self.state = ControlState::Proposing;
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
