//! The 500ms tick driver: the same rolling counter on `Device` is reused
//! for the enumeration hold-down (Proposing -> Enumerated) and, once
//! Enumerated, for the disconnect hold-down, while `RemoteDeviceTable::tick`
//! independently ages peer liveness. All three uses share the same
//! [`LIVENESS_THRESHOLD`](crate::constants::LIVENESS_THRESHOLD). Once a
//! local identity exists (Proposing, Enumerated or Disconnected) the
//! advertisement is re-formed and re-sent on every tick; a send rejected
//! because the link is down is expected while Disconnected and does not
//! fail the tick.

use crate::bus::Bus;
use crate::constants::LIVENESS_THRESHOLD;
use crate::control::ControlService;
use crate::error::Error;
use crate::service::Service;
use crate::state_machine::ControlState;

pub(crate) fn tick<B: Bus>(svc: &mut ControlService<B>) -> Result<(), Error> {
    match svc.state_machine.state() {
        ControlState::Idle => {}

        ControlState::Proposing => {
            let counter = bump_counter(svc);
            if counter > LIVENESS_THRESHOLD {
                finish_enumeration(svc);
            }
        }

        ControlState::Enumerated => {
            if svc.bus.is_connected() {
                reset_counter(svc);
            } else {
                let counter = bump_counter(svc);
                if counter > LIVENESS_THRESHOLD {
                    enter_disconnected(svc);
                }
            }
        }

        ControlState::Disconnected => {
            if svc.bus.is_connected() {
                reset_counter(svc);
                svc.state_machine.set_state(ControlState::Enumerated);
            }
        }
    }

    // The enumerate intent (a local device exists) covers Proposing,
    // Enumerated and Disconnected alike; a send rejected because the link
    // itself is down is expected while Disconnected and is not surfaced
    // as a tick failure.
    if svc.state_machine.device().is_some() {
        match svc.send_enumeration_packet() {
            Ok(()) => {}
            Err(_) if !svc.bus.is_connected() => {}
            Err(e) => return Err(e),
        }
    }

    sweep_remote_devices(svc);

    Ok(())
}

fn bump_counter<B: Bus>(svc: &mut ControlService<B>) -> u8 {
    let device = svc
        .state_machine
        .device_mut()
        .expect("Proposing/Enumerated implies a local device");
    device.rolling_counter = device.rolling_counter.saturating_add(1);
    device.rolling_counter
}

fn reset_counter<B: Bus>(svc: &mut ControlService<B>) {
    if let Some(device) = svc.state_machine.device_mut() {
        device.rolling_counter = 0;
    }
}

fn finish_enumeration<B: Bus>(svc: &mut ControlService<B>) {
    let device = svc
        .state_machine
        .device_mut()
        .expect("Proposing implies a local device");
    device.set_proposing(false);
    device.rolling_counter = 0;
    svc.state_machine.set_state(ControlState::Enumerated);

    let identity = svc.state_machine.device().unwrap().identity();
    for (_, s) in svc.registry.host_services_mut() {
        s.set_bound_device(Some(identity));
        s.host_connected();
    }
    svc.changed = true;
}

/// Edge-triggered: fires `host_disconnected` once on the tick that crosses
/// the threshold, not on every subsequent tick spent in `Disconnected`.
fn enter_disconnected<B: Bus>(svc: &mut ControlService<B>) {
    svc.state_machine.set_state(ControlState::Disconnected);
    for (_, s) in svc.registry.host_services_mut() {
        s.host_disconnected();
    }
    svc.changed = true;
}

fn sweep_remote_devices<B: Bus>(svc: &mut ControlService<B>) {
    for evicted in svc.remote_devices.tick() {
        let identity = evicted.identity();
        for (_, s) in svc.registry.iter_mut() {
            if s.bound_device() == Some(identity) {
                s.set_bound_device(None);
                s.host_disconnected();
                svc.changed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LoopbackMedium;
    use crate::device::BoundDevice;
    use crate::service::{Consumed, Service, ServiceMode};
    use crate::wire::ServiceInformation;

    struct TrackingHost {
        number: u8,
        bound: Option<BoundDevice>,
        connects: u32,
        disconnects: u32,
    }

    impl Service for TrackingHost {
        fn service_class(&self) -> u32 {
            1
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
        fn set_service_number(&mut self, n: u8) {
            self.number = n;
        }
        fn bound_device(&self) -> Option<BoundDevice> {
            self.bound
        }
        fn set_bound_device(&mut self, d: Option<BoundDevice>) {
            self.bound = d;
        }
        fn handle_service_information(
            &mut self,
            _remote: &crate::device::RemoteDevice,
            _info: &ServiceInformation,
        ) -> Consumed {
            Consumed::No
        }
        fn host_connected(&mut self) {
            self.connects += 1;
        }
        fn host_disconnected(&mut self) {
            self.disconnects += 1;
        }
    }

    fn new_service() -> ControlService<crate::bus::LoopbackBus> {
        let medium = LoopbackMedium::new();
        ControlService::new(medium.attach(), 1, None)
    }

    #[test]
    fn proposing_becomes_enumerated_after_threshold_ticks() {
        let mut svc = new_service();
        svc.add_service(Box::new(TrackingHost {
            number: crate::constants::SERVICE_UNINITIALIZED,
            bound: None,
            connects: 0,
            disconnects: 0,
        }))
        .unwrap();
        svc.enumerate().unwrap();

        for _ in 0..=LIVENESS_THRESHOLD {
            assert_eq!(svc.state_machine.state(), ControlState::Proposing);
            svc.tick().unwrap();
        }
        assert_eq!(svc.state_machine.state(), ControlState::Enumerated);
        assert!(!svc.state_machine.device().unwrap().is_proposing());
        assert!(svc.take_changed_event());
    }

    #[test]
    fn disconnect_and_reconnect_round_trip() {
        let medium = LoopbackMedium::new();
        let bus = medium.attach();
        let mut svc = ControlService::new(bus, 1, None);
        svc.add_service(Box::new(TrackingHost {
            number: crate::constants::SERVICE_UNINITIALIZED,
            bound: None,
            connects: 0,
            disconnects: 0,
        }))
        .unwrap();
        svc.enumerate().unwrap();
        for _ in 0..=LIVENESS_THRESHOLD {
            svc.tick().unwrap();
        }
        assert_eq!(svc.state_machine.state(), ControlState::Enumerated);
        svc.take_changed_event();

        medium.set_connected(false);
        for _ in 0..=LIVENESS_THRESHOLD {
            svc.tick().unwrap();
        }
        assert_eq!(svc.state_machine.state(), ControlState::Disconnected);
        assert!(svc.take_changed_event());

        medium.set_connected(true);
        svc.tick().unwrap();
        assert_eq!(svc.state_machine.state(), ControlState::Enumerated);
    }

    #[test]
    fn remote_eviction_unbinds_client_service() {
        let mut svc = new_service();
        let cp = crate::wire::ControlPacket {
            udid: 42,
            device_address: 9,
            device_flags: 0,
            data: Vec::new(),
        };
        svc.remote_devices.add(&cp, crate::bus::BaudRate::Baud1M);
        let idx = svc
            .add_service(Box::new(TrackingHost {
                number: 0,
                bound: Some(BoundDevice {
                    address: 9,
                    udid: 42,
                }),
                connects: 0,
                disconnects: 0,
            }))
            .unwrap();

        for _ in 0..=LIVENESS_THRESHOLD {
            svc.tick().unwrap();
        }

        assert!(svc.remote_devices.find(9).is_none());
        let s = svc.remove_service(idx).unwrap();
        let _ = s;
    }
}
