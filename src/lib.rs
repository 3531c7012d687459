//! JACDAC Control Service: address self-assignment, enumeration, remote
//! device tracking and service multiplexing for a single-wire half-duplex
//! multi-drop bus.

pub mod bus;
pub mod constants;
pub mod control;
pub mod device;
pub mod enumeration;
pub mod error;
pub mod remote_table;
mod router;
pub mod service;
pub mod state_machine;
mod ticker;
pub mod wire;

pub use control::ControlService;
pub use error::Error;
pub use service::{Consumed, RequiredDevice, Service, ServiceMode, ServiceRegistry};
pub use state_machine::ControlState;
