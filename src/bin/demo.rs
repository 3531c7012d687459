//! Runs three simulated nodes over an in-memory bus: a temperature host, a
//! periodic beacon advertised via broadcast override, and a client that
//! adopts the temperature host once it appears. Constructs a transport,
//! drives the protocol in a loop, and logs progress over a [`LoopbackMedium`]
//! since there is no physical bus here.

use jacdac_control::bus::{Bus, LoopbackBus, LoopbackMedium};
use jacdac_control::device::RemoteDevice;
use jacdac_control::service::{Consumed, RequiredDevice, Service, ServiceMode};
use jacdac_control::wire::ServiceInformation;
use jacdac_control::{ControlService, Error};

const TEMPERATURE_SERVICE_CLASS: u32 = 0x1421_5859;
const BEACON_SERVICE_CLASS: u32 = 0x1b0d_2e05;

struct TemperatureHost {
    number: u8,
    reading_centidegrees: i16,
}

impl Service for TemperatureHost {
    fn service_class(&self) -> u32 {
        TEMPERATURE_SERVICE_CLASS
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
    fn bound_device(&self) -> Option<jacdac_control::device::BoundDevice> {
        None
    }
    fn set_bound_device(&mut self, _device: Option<jacdac_control::device::BoundDevice>) {}
    fn add_advertisement_data(&mut self, dest: &mut [u8]) -> usize {
        let bytes = self.reading_centidegrees.to_le_bytes();
        dest[..2].copy_from_slice(&bytes);
        2
    }
}

struct Beacon {
    number: u8,
    pulses_seen: u32,
}

impl Service for Beacon {
    fn service_class(&self) -> u32 {
        BEACON_SERVICE_CLASS
    }
    fn service_flags(&self) -> u8 {
        0
    }
    fn mode(&self) -> ServiceMode {
        ServiceMode::BroadcastHostService
    }
    fn service_number(&self) -> u8 {
        self.number
    }
    fn set_service_number(&mut self, number: u8) {
        self.number = number;
    }
    fn bound_device(&self) -> Option<jacdac_control::device::BoundDevice> {
        None
    }
    fn set_bound_device(&mut self, _device: Option<jacdac_control::device::BoundDevice>) {}
    fn handle_service_information(
        &mut self,
        remote: &RemoteDevice,
        _info: &ServiceInformation,
    ) -> Consumed {
        self.pulses_seen += 1;
        log::info!("beacon: heard a pulse from address {}", remote.address);
        Consumed::Yes
    }
}

struct TemperatureClient {
    number: u8,
    bound: Option<jacdac_control::device::BoundDevice>,
    required: RequiredDevice,
}

impl Service for TemperatureClient {
    fn service_class(&self) -> u32 {
        TEMPERATURE_SERVICE_CLASS
    }
    fn service_flags(&self) -> u8 {
        0
    }
    fn mode(&self) -> ServiceMode {
        ServiceMode::ClientService
    }
    fn service_number(&self) -> u8 {
        self.number
    }
    fn set_service_number(&mut self, number: u8) {
        self.number = number;
    }
    fn bound_device(&self) -> Option<jacdac_control::device::BoundDevice> {
        self.bound
    }
    fn set_bound_device(&mut self, device: Option<jacdac_control::device::BoundDevice>) {
        self.bound = device;
    }
    fn required_device(&self) -> Option<&RequiredDevice> {
        Some(&self.required)
    }
    fn handle_service_information(
        &mut self,
        remote: &RemoteDevice,
        info: &ServiceInformation,
    ) -> Consumed {
        if info.advertisement.len() >= 2 {
            let reading = i16::from_le_bytes([info.advertisement[0], info.advertisement[1]]);
            log::info!(
                "client: adopting temperature host at address {} ({:.1} C)",
                remote.address,
                f64::from(reading) / 100.0
            );
        }
        Consumed::Yes
    }
    fn host_connected(&mut self) {
        log::info!("client: bound to host at {:?}", self.bound);
    }
}

fn drain<B: Bus>(node: &mut ControlService<B>) -> Result<(), Error>
where
    B: DrainablePoll,
{
    while let Some(packet) = node.bus().poll_packet() {
        node.handle_packet(&packet)?;
    }
    Ok(())
}

/// Small adapter trait so `drain` can be generic over any bus that offers a
/// non-blocking poll, without forcing that shape onto [`Bus`] itself (real
/// transports like `SerialBus` poll very differently).
trait DrainablePoll {
    fn poll_packet(&self) -> Option<jacdac_control::bus::Packet>;
}

impl DrainablePoll for LoopbackBus {
    fn poll_packet(&self) -> Option<jacdac_control::bus::Packet> {
        self.poll()
    }
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let medium = LoopbackMedium::new();

    let mut hub = ControlService::new(medium.attach(), 0x1111_2222_3333, Some(b"hub".to_vec()));
    hub.add_service(Box::new(TemperatureHost {
        number: jacdac_control::constants::SERVICE_UNINITIALIZED,
        reading_centidegrees: 2137,
    }))
    .unwrap();
    hub.add_service(Box::new(Beacon {
        number: jacdac_control::constants::SERVICE_UNINITIALIZED,
        pulses_seen: 0,
    }))
    .unwrap();
    hub.enumerate()?;

    let mut client = ControlService::new(medium.attach(), 0x4444_5555_6666, None);
    client
        .add_service(Box::new(TemperatureClient {
            number: jacdac_control::constants::SERVICE_UNINITIALIZED,
            bound: None,
            required: RequiredDevice {
                udid: jacdac_control::device::generate_eui64(0x1111_2222_3333),
                name: None,
            },
        }))
        .unwrap();

    for round in 0..8 {
        hub.tick()?;
        client.tick()?;
        drain(&mut hub)?;
        drain(&mut client)?;
        if hub.is_enumerated() {
            log::info!("round {round}: hub enumerated at address {:?}", hub.address());
        }
    }

    log::info!("hub state: {:?}", hub.state());
    log::info!("client remote devices seen: {}", client.remote_devices().len());

    Ok(())
}
