//! Local and remote device identity.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::{device_flags, MAX_ADDRESS, MIN_ADDRESS};

/// Clears bit 1 of the most-significant byte of `serial`, marking the
/// derived UDID as "locally administered" per the EUI-64 convention. All
/// other bits are left untouched.
pub fn generate_eui64(serial: u64) -> u64 {
    const LOCALLY_ADMINISTERED_MASK: u64 = 0x02 << 56;
    serial & !LOCALLY_ADMINISTERED_MASK
}

/// Identity snapshot used to key a device regardless of whether it is the
/// local node or a remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub address: u8,
    pub udid: u64,
}

/// Snapshot a `Service` binds to in place of a live back-reference (see
/// DESIGN.md, "cyclic / back-reference risk").
pub type BoundDevice = DeviceIdentity;

/// The local node's identity and enumeration bookkeeping.
#[derive(Debug, Clone)]
pub struct Device {
    pub udid: u64,
    pub address: u8,
    pub flags: u8,
    pub communication_rate: crate::bus::BaudRate,
    pub rolling_counter: u8,
    pub name: Option<Vec<u8>>,
}

impl Device {
    /// Allocates a new local identity: a random address in `1..=254` and a
    /// UDID derived from the hardware serial, with `PROPOSING` set.
    pub fn allocate(serial: u64, rng: &mut StdRng, name: Option<Vec<u8>>) -> Self {
        let flags = if name.is_some() {
            device_flags::PROPOSING | device_flags::HAS_NAME
        } else {
            device_flags::PROPOSING
        };
        Device {
            udid: generate_eui64(serial),
            address: random_address(rng),
            flags,
            communication_rate: crate::bus::BaudRate::Baud1M,
            rolling_counter: 0,
            name,
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            address: self.address,
            udid: self.udid,
        }
    }

    pub fn is_proposing(&self) -> bool {
        self.flags & device_flags::PROPOSING != 0
    }

    pub fn set_proposing(&mut self, proposing: bool) {
        if proposing {
            self.flags |= device_flags::PROPOSING;
        } else {
            self.flags &= !device_flags::PROPOSING;
        }
    }

    /// Re-rolls the bus address, resets the rolling counter, and
    /// re-asserts `PROPOSING`. Used on every collision-loss path.
    pub fn reroll_address(&mut self, rng: &mut StdRng) {
        self.address = random_address(rng);
        self.rolling_counter = 0;
        self.set_proposing(true);
    }
}

fn random_address(rng: &mut StdRng) -> u8 {
    rng.gen_range(MIN_ADDRESS..=MAX_ADDRESS)
}

/// Seeds a per-node RNG from the hardware serial mixed with a tick counter:
/// each node needs an independent seed even when several are started at
/// the same wall-clock instant.
pub fn seed_rng(serial: u64, tick_counter: u64) -> StdRng {
    StdRng::seed_from_u64(serial ^ tick_counter.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// A peer observed on the bus, plus the broadcast service-number map used
/// by `BroadcastHostService` routing.
#[derive(Debug, Clone)]
pub struct RemoteDevice {
    pub address: u8,
    pub udid: u64,
    pub flags: u8,
    pub communication_rate: crate::bus::BaudRate,
    pub rolling_counter: u8,
    pub name: Option<Vec<u8>>,
    pub broadcast_servicemap: [u8; crate::constants::PROTOCOL_SERVICE_ARRAY_SIZE / 2],
}

impl RemoteDevice {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            address: self.address,
            udid: self.udid,
        }
    }

    /// Records that the local service numbered `service_number` is the
    /// consumer of this remote's `service_number`-th broadcast slot.
    /// Out-of-range `service_number` values (beyond the registry's fixed
    /// capacity) are silently dropped rather than indexing out of bounds.
    ///
    /// Two service numbers are packed per byte, low nibble first, selected
    /// by `service_number % 2` (see DESIGN.md for why this differs from a
    /// naive `idx % 2` on the byte index, which only ever touches every
    /// fourth slot).
    pub fn set_broadcast_service_map(&mut self, service_number: u8, local_service_number: u8) {
        let idx = (service_number / 2) as usize;
        if idx >= self.broadcast_servicemap.len() {
            return;
        }
        if service_number % 2 == 0 {
            self.broadcast_servicemap[idx] =
                (self.broadcast_servicemap[idx] & 0xF0) | (local_service_number & 0x0F);
        } else {
            self.broadcast_servicemap[idx] =
                (local_service_number << 4) | (self.broadcast_servicemap[idx] & 0x0F);
        }
    }
}
