//! Wire-format and protocol constants. Plain `const`s rather than a
//! `bitflags` crate.

use std::time::Duration;

/// Maximum size in bytes of a control packet on the wire (header + data).
pub const MAX_PACKET_SIZE: usize = 64;

/// Fixed capacity of the service registry.
pub const PROTOCOL_SERVICE_ARRAY_SIZE: usize = 16;

/// Size in bytes of the `ControlPacket` header (udid + address + flags + padding).
pub const CONTROL_PACKET_HEADER_SIZE: usize = 16;

/// Size in bytes of a `ServiceInformation` record's fixed header (flags + class + adv_size).
pub const SERVICE_INFO_HEADER_SIZE: usize = 6;

/// Sentinel `service_number` meaning "not yet assigned".
pub const SERVICE_UNINITIALIZED: u8 = 0xFF;

/// Period of the control-service ticker.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// `rolling_counter` value above which a record is eligible for eviction
/// or state transition (i.e. the 4th consecutive tick of the same event).
pub const LIVENESS_THRESHOLD: u8 = 3;

/// Lowest assignable bus address. 0 is reserved for "no address".
pub const MIN_ADDRESS: u8 = 1;

/// Highest assignable bus address. 255 is reserved.
pub const MAX_ADDRESS: u8 = 254;

pub mod device_flags {
    /// Address is not yet confirmed.
    pub const PROPOSING: u8 = 0b001;
    /// Instructs a peer to abandon its proposed address.
    pub const REJECT: u8 = 0b010;
    /// The control packet's data begins with a length-prefixed name.
    pub const HAS_NAME: u8 = 0b100;
}
