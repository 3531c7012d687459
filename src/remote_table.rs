//! `RemoteDeviceTable`: the membership view of peers currently seen on the
//! bus, over a plain `Vec<RemoteDevice>` with linear-scan lookup,
//! idempotent add, and increment-then-evict aging.

use crate::bus::BaudRate;
use crate::constants::{LIVENESS_THRESHOLD, PROTOCOL_SERVICE_ARRAY_SIZE};
use crate::device::RemoteDevice;
use crate::wire::ControlPacket;

#[derive(Debug, Default)]
pub struct RemoteDeviceTable {
    devices: Vec<RemoteDevice>,
}

impl RemoteDeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, address: u8) -> Option<&RemoteDevice> {
        self.devices.iter().find(|d| d.address == address)
    }

    pub fn find_mut(&mut self, address: u8) -> Option<&mut RemoteDevice> {
        self.devices.iter_mut().find(|d| d.address == address)
    }

    pub fn find_by_udid(&self, address: u8, udid: u64) -> Option<&RemoteDevice> {
        self.devices
            .iter()
            .find(|d| d.address == address && d.udid == udid)
    }

    pub fn find_by_udid_mut(&mut self, address: u8, udid: u64) -> Option<&mut RemoteDevice> {
        self.devices
            .iter_mut()
            .find(|d| d.address == address && d.udid == udid)
    }

    /// Adds a remote derived from `cp`, or returns the existing record if
    /// one with the same `(address, udid)` is already present.
    pub fn add(&mut self, cp: &ControlPacket, rate: BaudRate) -> &mut RemoteDevice {
        if self
            .devices
            .iter()
            .any(|d| d.address == cp.device_address && d.udid == cp.udid)
        {
            return self
                .find_by_udid_mut(cp.device_address, cp.udid)
                .expect("just checked presence above");
        }

        let name = cp.name().ok().flatten().map(|n| n.to_vec());
        self.devices.push(RemoteDevice {
            address: cp.device_address,
            udid: cp.udid,
            flags: cp.device_flags,
            communication_rate: rate,
            rolling_counter: 0,
            name,
            broadcast_servicemap: [0; PROTOCOL_SERVICE_ARRAY_SIZE / 2],
        });
        self.devices
            .last_mut()
            .expect("just pushed an element above")
    }

    /// Removes the record with the given `(address, udid)`, if present.
    pub fn remove(&mut self, address: u8, udid: u64) -> Option<RemoteDevice> {
        let idx = self
            .devices
            .iter()
            .position(|d| d.address == address && d.udid == udid)?;
        Some(self.devices.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteDevice> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Ages every record by one tick and evicts those whose
    /// `rolling_counter` has exceeded [`LIVENESS_THRESHOLD`], returning
    /// the evicted records for `host_disconnected` delivery.
    pub fn tick(&mut self) -> Vec<RemoteDevice> {
        for d in &mut self.devices {
            d.rolling_counter = d.rolling_counter.saturating_add(1);
        }
        let (keep, evicted): (Vec<_>, Vec<_>) = self
            .devices
            .drain(..)
            .partition(|d| d.rolling_counter <= LIVENESS_THRESHOLD);
        self.devices = keep;
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::device_flags;

    fn cp(address: u8, udid: u64) -> ControlPacket {
        ControlPacket {
            udid,
            device_address: address,
            device_flags: 0,
            data: Vec::new(),
        }
    }

    #[test]
    fn add_then_find_round_trips() {
        let mut table = RemoteDeviceTable::new();
        table.add(&cp(5, 100), BaudRate::Baud1M);
        assert!(table.find(5).is_some());
        assert!(table.find_by_udid(5, 100).is_some());
        assert!(table.find_by_udid(5, 101).is_none());
    }

    #[test]
    fn add_is_idempotent_on_same_address_and_udid() {
        let mut table = RemoteDeviceTable::new();
        table.add(&cp(5, 100), BaudRate::Baud1M);
        table.add(&cp(5, 100), BaudRate::Baud1M);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_udid_at_same_address_is_a_distinct_record() {
        let mut table = RemoteDeviceTable::new();
        table.add(&cp(5, 100), BaudRate::Baud1M);
        table.add(&cp(5, 200), BaudRate::Baud1M);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn seen_within_two_seconds_is_never_evicted() {
        let mut table = RemoteDeviceTable::new();
        table.add(&cp(5, 100), BaudRate::Baud1M);
        for _ in 0..3 {
            let evicted = table.tick();
            assert!(evicted.is_empty());
            table.find_by_udid_mut(5, 100).unwrap().rolling_counter = 0;
        }
        assert!(table.find(5).is_some());
    }

    #[test]
    fn evicts_after_four_ticks_of_silence() {
        let mut table = RemoteDeviceTable::new();
        table.add(&cp(5, 100), BaudRate::Baud1M);

        assert!(table.tick().is_empty());
        assert!(table.tick().is_empty());
        assert!(table.tick().is_empty());
        let evicted = table.tick();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].address, 5);
        assert!(table.is_empty());
    }

    #[test]
    fn name_is_copied_when_has_name_flag_set() {
        let mut table = RemoteDeviceTable::new();
        let mut packet = cp(5, 100);
        packet.device_flags = device_flags::HAS_NAME;
        packet.data = crate::wire::encode_data(Some(b"sensor"), &[]);
        let remote = table.add(&packet, BaudRate::Baud1M);
        assert_eq!(remote.name.as_deref(), Some(&b"sensor"[..]));
    }
}
