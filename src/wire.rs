//! `ControlPacket` / `ServiceInformation` wire types: manual byte-buffer
//! assembly for `to_bytes`, explicit length/field walking for
//! `from_bytes`, `Error` return for malformed input. These control
//! packets carry no checksum on the wire.

use crate::constants::{
    device_flags, CONTROL_PACKET_HEADER_SIZE, MAX_PACKET_SIZE, SERVICE_INFO_HEADER_SIZE,
};
use crate::error::Error;

/// One self-advertisement record for a single service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInformation {
    pub service_flags: u8,
    pub service_class: u32,
    pub advertisement: Vec<u8>,
}

impl ServiceInformation {
    pub fn encoded_len(&self) -> usize {
        SERVICE_INFO_HEADER_SIZE + self.advertisement.len()
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.service_flags);
        out.extend_from_slice(&self.service_class.to_le_bytes());
        out.push(self.advertisement.len() as u8);
        out.extend_from_slice(&self.advertisement);
    }
}

/// A parsed `ControlPacket`. `data` holds the optional name field followed
/// by the concatenated `ServiceInformation` records, still in wire form;
/// use [`ControlPacket::service_informations`] to walk them without
/// copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPacket {
    pub udid: u64,
    pub device_address: u8,
    pub device_flags: u8,
    pub data: Vec<u8>,
}

impl ControlPacket {
    pub fn has_name(&self) -> bool {
        self.device_flags & device_flags::HAS_NAME != 0
    }

    pub fn is_proposing(&self) -> bool {
        self.device_flags & device_flags::PROPOSING != 0
    }

    pub fn is_reject(&self) -> bool {
        self.device_flags & device_flags::REJECT != 0
    }

    /// The optional name, if `HAS_NAME` is set and the length prefix is
    /// well-formed.
    pub fn name(&self) -> Result<Option<&[u8]>, Error> {
        if !self.has_name() {
            return Ok(None);
        }
        let len = *self.data.first().ok_or(Error::InvalidParameter)? as usize;
        let name = self
            .data
            .get(1..1 + len)
            .ok_or(Error::InvalidParameter)?;
        Ok(Some(name))
    }

    /// Offset into `data` where the `ServiceInformation` records begin
    /// (i.e. past the optional name field).
    fn service_info_offset(&self) -> Result<usize, Error> {
        if !self.has_name() {
            return Ok(0);
        }
        let len = *self.data.first().ok_or(Error::InvalidParameter)? as usize;
        if 1 + len > self.data.len() {
            return Err(Error::InvalidParameter);
        }
        Ok(1 + len)
    }

    /// Iterates the `ServiceInformation` records in order, yielding each
    /// one paired with its 0-based `service_number`. Returns an error
    /// immediately (rather than yielding partial results) if the data is
    /// truncated or a declared `advertisement_size` overruns the buffer,
    /// aborting the whole dispatch on a malformed size.
    pub fn service_informations(&self) -> Result<Vec<(u8, ServiceInformation)>, Error> {
        let mut offset = self.service_info_offset()?;
        let mut out = Vec::new();
        let mut service_number: u8 = 0;
        while offset < self.data.len() {
            let header = self
                .data
                .get(offset..offset + SERVICE_INFO_HEADER_SIZE)
                .ok_or(Error::InvalidParameter)?;
            let service_flags = header[0];
            let service_class = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
            let advertisement_size = header[5] as usize;
            let adv_start = offset + SERVICE_INFO_HEADER_SIZE;
            let advertisement = self
                .data
                .get(adv_start..adv_start + advertisement_size)
                .ok_or(Error::InvalidParameter)?
                .to_vec();
            out.push((
                service_number,
                ServiceInformation {
                    service_flags,
                    service_class,
                    advertisement,
                },
            ));
            offset = adv_start + advertisement_size;
            service_number = service_number.checked_add(1).ok_or(Error::InvalidParameter)?;
        }
        Ok(out)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(CONTROL_PACKET_HEADER_SIZE + self.data.len());
        bytes.extend_from_slice(&self.udid.to_le_bytes());
        bytes.push(self.device_address);
        bytes.push(self.device_flags);
        bytes.extend_from_slice(&[0u8; CONTROL_PACKET_HEADER_SIZE - 10]);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < CONTROL_PACKET_HEADER_SIZE {
            return Err(Error::InvalidParameter);
        }
        let udid = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let device_address = bytes[8];
        let device_flags = bytes[9];
        let data = bytes[CONTROL_PACKET_HEADER_SIZE..].to_vec();
        Ok(ControlPacket {
            udid,
            device_address,
            device_flags,
            data,
        })
    }
}

/// Builds the `data` payload (optional name + encoded `ServiceInformation`
/// records) for an outbound control packet. Used by `EnumerationBuffer`
/// and by the router when composing a `REJECT` reply.
pub fn encode_data(name: Option<&[u8]>, infos: &[ServiceInformation]) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(name) = name {
        out.push(name.len() as u8);
        out.extend_from_slice(name);
    }
    for info in infos {
        info.write_to(&mut out);
    }
    out
}

pub fn fits_on_wire(total_size: usize) -> bool {
    total_size <= MAX_PACKET_SIZE
}
