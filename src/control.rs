//! `ControlService`: the façade wiring the state machine, registry, remote
//! table, enumeration buffer and link layer together. Owns the transport
//! and exposes a small set of operations: enumerate, disconnect, handle a
//! packet, tick.

use log::debug;
use rand::rngs::StdRng;

use crate::bus::Bus;
use crate::device::seed_rng;
use crate::enumeration::EnumerationBuffer;
use crate::error::Error;
use crate::remote_table::RemoteDeviceTable;
use crate::router;
use crate::service::{Service, ServiceMode, ServiceRegistry};
use crate::state_machine::{ControlState, StateMachine};
use crate::ticker;

/// A single node's Control Service: one per device, one per bus.
pub struct ControlService<B: Bus> {
    pub(crate) state_machine: StateMachine,
    pub(crate) registry: ServiceRegistry,
    pub(crate) remote_devices: RemoteDeviceTable,
    pub(crate) enumeration_buffer: EnumerationBuffer,
    pub(crate) bus: B,
    pub(crate) rng: StdRng,
    serial: u64,
    name: Option<Vec<u8>>,
    /// Set whenever a service is bound/unbound or a remote device is
    /// evicted, so applications can poll for "something worth re-checking
    /// happened" without re-deriving it from the registry every tick.
    pub(crate) changed: bool,
}

impl<B: Bus> ControlService<B> {
    pub fn new(bus: B, serial: u64, name: Option<Vec<u8>>) -> Self {
        ControlService {
            state_machine: StateMachine::new(),
            registry: ServiceRegistry::new(),
            remote_devices: RemoteDeviceTable::new(),
            enumeration_buffer: EnumerationBuffer::new(),
            rng: seed_rng(serial, 0),
            bus,
            serial,
            name,
            changed: false,
        }
    }

    pub fn add_service(&mut self, service: Box<dyn Service>) -> Result<usize, Error> {
        self.registry.add(service)
    }

    pub fn remove_service(&mut self, index: usize) -> Option<Box<dyn Service>> {
        self.registry.remove(index)
    }

    pub fn state(&self) -> ControlState {
        self.state_machine.state()
    }

    pub fn is_enumerated(&self) -> bool {
        self.state_machine.is_enumerated()
    }

    pub fn is_enumerating(&self) -> bool {
        self.state_machine.is_enumerating()
    }

    pub fn remote_devices(&self) -> &RemoteDeviceTable {
        &self.remote_devices
    }

    /// This node's currently held bus address, if it has allocated one.
    pub fn address(&self) -> Option<u8> {
        self.state_machine.device().map(|d| d.address)
    }

    /// Direct access to the underlying link, for polling inbound frames
    /// with whatever method the concrete `Bus` impl offers (e.g.
    /// `LoopbackBus::poll`).
    pub fn bus(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Allocates a local identity and starts proposing it on the bus.
    /// Requires at least one registered `HostService`/
    /// `BroadcastHostService`.
    pub fn enumerate(&mut self) -> Result<(), Error> {
        let has_host_services = self.registry.iter().any(|(_, s)| {
            matches!(
                s.mode(),
                ServiceMode::HostService | ServiceMode::BroadcastHostService
            )
        });
        self.state_machine.enumerate(
            self.serial,
            &mut self.rng,
            self.name.clone(),
            has_host_services,
        )?;
        debug!(
            "enumerate: proposing address {}",
            self.state_machine.device().unwrap().address
        );
        self.send_enumeration_packet()
    }

    /// Tears the local identity down and unbinds every host service.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        self.state_machine.disconnect()?;
        for (_, svc) in self.registry.host_services_mut() {
            svc.set_bound_device(None);
            svc.host_disconnected();
        }
        self.changed = true;
        Ok(())
    }

    /// Routes one inbound frame through collision resolution and service
    /// dispatch.
    pub fn handle_packet(&mut self, packet: &crate::bus::Packet) -> Result<(), Error> {
        router::handle_packet(self, packet)
    }

    /// Drives one 500ms tick: enumeration hold-down, disconnect hold-down,
    /// and remote-device liveness sweep.
    pub fn tick(&mut self) -> Result<(), Error> {
        ticker::tick(self)
    }

    /// Drains the "something changed" flag set by binding/unbinding
    /// services or evicting a remote device.
    pub fn take_changed_event(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub(crate) fn send_enumeration_packet(&mut self) -> Result<(), Error> {
        let device = self
            .state_machine
            .device()
            .cloned()
            .ok_or(Error::InvalidState)?;
        let (packet, _size) = self.enumeration_buffer.form(&device, &mut self.registry);
        self.bus
            .send(&packet.to_bytes(), device.communication_rate)
            .map_err(|e| Error::Bus(e.to_string()))
    }
}
