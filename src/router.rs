//! `handle_packet`: address collision resolution followed by per-record
//! service dispatch, expressed directly as Rust control flow rather than a
//! generic visitor dispatch.

use log::warn;

use crate::bus::{BaudRate, Bus, Packet};
use crate::constants::{device_flags, MAX_PACKET_SIZE};
use crate::control::ControlService;
use crate::device::DeviceIdentity;
use crate::error::Error;
use crate::remote_table::RemoteDeviceTable;
use crate::service::{Consumed, Service, ServiceMode, ServiceRegistry};
use crate::state_machine::ControlState;
use crate::wire::{ControlPacket, ServiceInformation};

/// Entry point invoked by the application for every inbound frame
/// classified as control-service traffic.
pub(crate) fn handle_packet<B: Bus>(
    svc: &mut ControlService<B>,
    packet: &Packet,
) -> Result<(), Error> {
    if packet.data.len() > MAX_PACKET_SIZE {
        return Err(Error::InvalidParameter);
    }
    let cp = ControlPacket::from_bytes(&packet.data)?;

    if let Some(outcome) = resolve_collision(svc, &cp)? {
        return Ok(outcome);
    }

    // We only route fully enumerated peers downstream.
    if cp.is_proposing() {
        return Ok(());
    }

    if let Some(remote) = svc.remote_devices.find_by_udid_mut(cp.device_address, cp.udid) {
        remote.rolling_counter = 0;
    }

    let rate = packet.communication_rate;
    let local_identity = svc.state_machine.device().map(|d| d.identity());

    for (service_number, info) in cp.service_informations()? {
        dispatch_one(
            &mut svc.registry,
            &mut svc.remote_devices,
            &mut svc.changed,
            local_identity,
            &cp,
            rate,
            service_number,
            &info,
        );
    }

    Ok(())
}

/// Address self-collision handling. Returns `Ok(Some(()))` when the packet
/// has been fully handled and no further routing should happen, `Ok(None)`
/// to continue with ordinary dispatch.
fn resolve_collision<B: Bus>(
    svc: &mut ControlService<B>,
    cp: &ControlPacket,
) -> Result<Option<()>, Error> {
    let Some(local) = svc.state_machine.device() else {
        return Ok(None);
    };
    let local_identity = local.identity();
    let local_is_proposing = local.is_proposing();
    let we_are_active = matches!(
        svc.state_machine.state(),
        ControlState::Proposing | ControlState::Enumerated
    );

    if !we_are_active || cp.device_address != local_identity.address {
        return Ok(None);
    }

    if cp.udid != local_identity.udid {
        if cp.is_proposing() {
            if local_is_proposing {
                // We're both proposing for the same address; the peer is
                // treated as having won it.
                svc.state_machine.reroll(&mut svc.rng);
            } else {
                let reject = ControlPacket {
                    udid: cp.udid,
                    device_address: cp.device_address,
                    device_flags: cp.device_flags | device_flags::REJECT,
                    data: Vec::new(),
                };
                send_packet(&mut svc.bus, &reject, BaudRate::Baud1M)?;
            }
            return Ok(Some(()));
        }

        // Peer believes it is already Enumerated at our address with a
        // different udid. This implementation logs it and does nothing
        // further; the peer's own Control Service will see our
        // advertisement in turn and resolve the conflict from its side
        // using the same rule.
        warn!(
            "peer udid {:#018x} claims address {} as already enumerated, \
             which we also hold with udid {:#018x}; ignoring (see DESIGN.md)",
            cp.udid, cp.device_address, local_identity.udid
        );
        return Ok(Some(()));
    }

    if cp.is_reject() {
        svc.state_machine.reroll(&mut svc.rng);
        return Ok(Some(()));
    }

    Ok(None)
}

fn send_packet<B: Bus>(bus: &mut B, cp: &ControlPacket, rate: BaudRate) -> Result<(), Error> {
    bus.send(&cp.to_bytes(), rate)
        .map_err(|e| Error::Bus(e.to_string()))
}

/// Offers one `ServiceInformation` record to the registry in slot order,
/// stopping at the first service that consumes it.
fn dispatch_one(
    registry: &mut ServiceRegistry,
    remote_devices: &mut RemoteDeviceTable,
    changed: &mut bool,
    local_identity: Option<DeviceIdentity>,
    cp: &ControlPacket,
    rate: BaudRate,
    service_number: u8,
    info: &ServiceInformation,
) {
    let is_self = local_identity
        == Some(DeviceIdentity {
            address: cp.device_address,
            udid: cp.udid,
        });
    if is_self {
        return;
    }

    let indices: Vec<usize> = registry.iter().map(|(i, _)| i).collect();

    for idx in indices {
        let (class_check, initialized, mode) = match registry.get(idx) {
            Some(s) => (
                s.service_class() == info.service_class,
                s.is_initialized(),
                s.mode(),
            ),
            None => continue,
        };
        if !class_check {
            continue;
        }

        if initialized {
            let s = registry.get(idx).expect("index just yielded by iter()");
            let broadcast_override = matches!(mode, ServiceMode::BroadcastHostService);
            let (address_check, udid_check) = match s.bound_device() {
                Some(bound) => (
                    bound.address == cp.device_address && s.service_number() == service_number,
                    bound.udid == cp.udid,
                ),
                None => (false, false),
            };
            if !((address_check && udid_check) || broadcast_override) {
                continue;
            }

            let local_service_number = s.service_number();
            let remote = remote_devices.add(cp, rate);
            if broadcast_override {
                remote.set_broadcast_service_map(service_number, local_service_number);
            }
            let remote_snapshot = remote.clone();

            let svc_mut = registry.get_mut(idx).expect("index just yielded by iter()");
            if svc_mut.handle_service_information(&remote_snapshot, info) == Consumed::Yes {
                break;
            }
        } else if matches!(mode, ServiceMode::ClientService) {
            let s = registry.get(idx).expect("index just yielded by iter()");
            let required_ok = match s.required_device() {
                Some(req) => {
                    req.udid == cp.udid
                        && match &req.name {
                            Some(name) => matches!(cp.name(), Ok(Some(n)) if n == name.as_slice()),
                            None => true,
                        }
                }
                None => true,
            };
            if !required_ok {
                continue;
            }

            let remote = remote_devices.add(cp, rate);
            let remote_snapshot = remote.clone();
            let remote_identity = remote_snapshot.identity();

            let svc_mut = registry.get_mut(idx).expect("index just yielded by iter()");
            if svc_mut.handle_service_information(&remote_snapshot, info) == Consumed::Yes {
                svc_mut.set_bound_device(Some(remote_identity));
                svc_mut.set_service_number(service_number);
                svc_mut.host_connected();
                *changed = true;
                break;
            }
        }
    }
}
