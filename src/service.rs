//! The capability set external services are reached through, plus the
//! fixed-capacity `ServiceRegistry`. Registration order determines host
//! service-number assignment, matching a fixed-size `services[]` array
//! indexed by slot.

use crate::constants::{PROTOCOL_SERVICE_ARRAY_SIZE, SERVICE_UNINITIALIZED};
use crate::device::{BoundDevice, RemoteDevice};
use crate::error::Error;
use crate::wire::ServiceInformation;

/// How a registry entry participates in enumeration and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// Advertises itself during enumeration; consumes `ServiceInformation`
    /// records addressed to its own bound device and service number.
    HostService,
    /// Does not advertise; adopts the first matching peer it sees,
    /// optionally constrained by `required_device`.
    ClientService,
    /// Like `HostService`, but bypasses address/udid matching on inbound
    /// dispatch.
    BroadcastHostService,
}

/// Binds a `ClientService` to a specific peer by UDID and, optionally, by
/// name.
#[derive(Debug, Clone)]
pub struct RequiredDevice {
    pub udid: u64,
    pub name: Option<Vec<u8>>,
}

/// Result of offering a `ServiceInformation` record to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    Yes,
    No,
}

/// The capability set an external service exposes to the Control Service.
/// Implementations are owned by the application and registered via
/// `ServiceRegistry::add`.
pub trait Service {
    fn service_class(&self) -> u32;
    fn service_flags(&self) -> u8;
    fn mode(&self) -> ServiceMode;

    fn service_number(&self) -> u8;
    fn set_service_number(&mut self, number: u8);

    fn is_initialized(&self) -> bool {
        self.service_number() != SERVICE_UNINITIALIZED
    }

    /// The device this service is currently bound to: the local device for
    /// `HostService`/`BroadcastHostService` once connected, or the adopted
    /// peer for `ClientService`. `None` before binding.
    fn bound_device(&self) -> Option<BoundDevice>;
    fn set_bound_device(&mut self, device: Option<BoundDevice>);

    /// Only consulted for `ClientService`s: restricts adoption to a
    /// specific peer.
    fn required_device(&self) -> Option<&RequiredDevice> {
        None
    }

    /// Fills `dest` with this service's advertisement payload and returns
    /// the number of bytes written. Only called for
    /// `HostService`/`BroadcastHostService`.
    fn add_advertisement_data(&mut self, dest: &mut [u8]) -> usize {
        let _ = dest;
        0
    }

    /// Offers an inbound `ServiceInformation` record addressed to this
    /// service. Returning `Consumed::Yes` stops further routing of the
    /// record.
    fn handle_service_information(
        &mut self,
        remote: &RemoteDevice,
        info: &ServiceInformation,
    ) -> Consumed {
        let _ = (remote, info);
        Consumed::No
    }

    fn host_connected(&mut self) {}
    fn host_disconnected(&mut self) {}
}

/// A fixed-capacity indexed collection of service handles. Iteration
/// order is slot order, which determines host service-number assignment.
pub struct ServiceRegistry {
    slots: Vec<Option<Box<dyn Service>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(PROTOCOL_SERVICE_ARRAY_SIZE);
        slots.resize_with(PROTOCOL_SERVICE_ARRAY_SIZE, || None);
        ServiceRegistry { slots }
    }

    /// Registers `service` into the first empty slot, returning its index.
    pub fn add(&mut self, service: Box<dyn Service>) -> Result<usize, Error> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::NoResources)?;
        self.slots[idx] = Some(service);
        Ok(idx)
    }

    pub fn remove(&mut self, index: usize) -> Option<Box<dyn Service>> {
        self.slots.get_mut(index).and_then(|slot| slot.take())
    }

    pub fn get(&self, index: usize) -> Option<&dyn Service> {
        self.slots.get(index).and_then(|s| s.as_deref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Box<dyn Service>> {
        self.slots.get_mut(index).and_then(|s| s.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &dyn Service)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().map(|s| (i, s)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Box<dyn Service>)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|s| (i, s)))
    }

    pub fn host_services_mut(&mut self) -> impl Iterator<Item = (usize, &mut Box<dyn Service>)> {
        self.iter_mut().filter(|(_, s)| {
            matches!(
                s.mode(),
                ServiceMode::HostService | ServiceMode::BroadcastHostService
            )
        })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
