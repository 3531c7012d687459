//! `EnumerationBuffer`: serializes this node's self-advertisement, walking
//! the registry in slot order and assigning host service numbers as it
//! goes.

use crate::constants::{MAX_PACKET_SIZE, SERVICE_UNINITIALIZED};
use crate::device::Device;
use crate::service::{ServiceMode, ServiceRegistry};
use crate::wire::{ControlPacket, ServiceInformation};

/// Owns the scratch region the outbound control packet is assembled into:
/// just the last-formed `ControlPacket`, rebuilt fresh on each `form()`
/// call. A packet this small (at most `MAX_PACKET_SIZE` bytes) needs no
/// manual buffer reuse.
#[derive(Debug, Default)]
pub struct EnumerationBuffer {
    last: Option<ControlPacket>,
}

impl EnumerationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-stamps the header from `device` and walks the registry in slot
    /// order, assigning service numbers to `HostService`/
    /// `BroadcastHostService` entries and collecting their advertisement
    /// data. Returns the formed packet and its total wire size.
    ///
    /// Panics (`JacdacProtocolFatal`) if a service already has a
    /// non-sentinel service number that disagrees with the slot it would
    /// be assigned here. That can only happen if a service was registered
    /// and assigned a number, then somehow reassigned a different slot,
    /// which the registry's append-only `add` makes impossible to trigger
    /// through normal use.
    pub fn form(&mut self, device: &Device, registry: &mut ServiceRegistry) -> (ControlPacket, usize) {
        let mut infos = Vec::new();
        let mut service_number: u8 = 0;

        for (_, svc) in registry.host_services_mut() {
            let current_number = svc.service_number();
            if current_number != SERVICE_UNINITIALIZED && current_number != service_number {
                panic!(
                    "JacdacProtocolFatal: host service renumbered from {current_number} to {service_number} while enumerated"
                );
            }
            svc.set_service_number(service_number);

            let mut advertisement = vec![0u8; MAX_PACKET_SIZE];
            let size = svc.add_advertisement_data(&mut advertisement);
            advertisement.truncate(size);

            infos.push(ServiceInformation {
                service_flags: svc.service_flags(),
                service_class: svc.service_class(),
                advertisement,
            });

            service_number += 1;
        }

        let data = crate::wire::encode_data(device.name.as_deref(), &infos);

        let packet = ControlPacket {
            udid: device.udid,
            device_address: device.address,
            device_flags: device.flags,
            data,
        };

        let total_size = crate::constants::CONTROL_PACKET_HEADER_SIZE + packet.data.len();
        assert!(
            crate::wire::fits_on_wire(total_size),
            "JacdacProtocolFatal: formed control packet of {total_size} bytes exceeds MAX_PACKET_SIZE"
        );

        self.last = Some(packet.clone());
        (packet, total_size)
    }

    pub fn last(&self) -> Option<&ControlPacket> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{seed_rng, BoundDevice};
    use crate::service::Service;

    struct NoopHost {
        class: u32,
        number: u8,
    }

    impl Service for NoopHost {
        fn service_class(&self) -> u32 {
            self.class
        }
        fn service_flags(&self) -> u8 {
            0
        }
        fn mode(&self) -> ServiceMode {
            ServiceMode::HostService
        }
        fn service_number(&self) -> u8 {
            self.number
        }
        fn set_service_number(&mut self, number: u8) {
            self.number = number;
        }
        fn bound_device(&self) -> Option<BoundDevice> {
            None
        }
        fn set_bound_device(&mut self, _device: Option<BoundDevice>) {}
        fn add_advertisement_data(&mut self, _dest: &mut [u8]) -> usize {
            0
        }
    }

    #[test]
    fn assigns_monotonic_service_numbers_and_embeds_name() {
        let mut rng = seed_rng(1, 1);
        let mut device = Device::allocate(1, &mut rng, Some(b"hub".to_vec()));
        device.set_proposing(false);

        let mut registry = ServiceRegistry::new();
        registry
            .add(Box::new(NoopHost {
                class: 0x1111,
                number: SERVICE_UNINITIALIZED,
            }))
            .unwrap();
        registry
            .add(Box::new(NoopHost {
                class: 0x2222,
                number: SERVICE_UNINITIALIZED,
            }))
            .unwrap();

        let mut buf = EnumerationBuffer::new();
        let (packet, size) = buf.form(&device, &mut registry);

        assert!(size <= MAX_PACKET_SIZE);
        assert_eq!(registry.get(0).unwrap().service_number(), 0);
        assert_eq!(registry.get(1).unwrap().service_number(), 1);

        let infos = packet.service_informations().unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].0, 0);
        assert_eq!(infos[0].1.service_class, 0x1111);
        assert_eq!(infos[1].1.service_class, 0x2222);
        assert_eq!(packet.name().unwrap(), Some(&b"hub"[..]));
    }

    #[test]
    #[should_panic(expected = "JacdacProtocolFatal")]
    fn renumbering_an_already_assigned_host_service_is_fatal() {
        let mut rng = seed_rng(1, 1);
        let device = Device::allocate(1, &mut rng, None);
        let mut registry = ServiceRegistry::new();
        // two services, the first already claims number 1 (should be 0).
        registry
            .add(Box::new(NoopHost { class: 1, number: 1 }))
            .unwrap();
        let mut buf = EnumerationBuffer::new();
        buf.form(&device, &mut registry);
    }
}
