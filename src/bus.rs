//! Link-layer abstraction consumed by the Control Service: a small trait
//! abstracting the transport, with a real adapter gated behind the
//! `serialport` feature via a blanket impl over `serialport::SerialPort`.
//! This bus has no 5-baud wake sequence, so there is no PHY init beyond
//! opening the port (see DESIGN.md).

use std::collections::VecDeque;
use std::rc::Rc;
use std::cell::RefCell;

use strum::FromRepr;

/// Link baud selector. The control service defaults to `Baud1M` for its
/// own traffic.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum BaudRate {
    Baud1M = 0,
    Baud250K = 1,
    Baud125K = 2,
}

/// A raw frame as delivered by the link layer, already classified as
/// control-service traffic.
#[derive(Debug, Clone)]
pub struct Packet {
    pub communication_rate: BaudRate,
    pub data: Vec<u8>,
}

/// The link layer, consumed by the Control Service. Sending is
/// non-blocking from the Control Service's point of view: the
/// implementation is expected to buffer.
pub trait Bus {
    type Error: std::error::Error + Send + Sync + 'static;

    fn is_running(&self) -> bool;
    fn is_connected(&self) -> bool;
    fn send(&mut self, data: &[u8], rate: BaudRate) -> Result<(), Self::Error>;
}

/// An in-memory broadcast medium shared by every node constructed from the
/// same [`LoopbackMedium`]. Used by tests and by `src/bin/demo.rs` in place
/// of real bus hardware.
#[derive(Default)]
pub struct LoopbackMedium {
    inner: Rc<RefCell<LoopbackInner>>,
}

#[derive(Default)]
struct LoopbackInner {
    connected: bool,
    inboxes: Vec<Rc<RefCell<VecDeque<Packet>>>>,
}

impl LoopbackMedium {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(LoopbackInner {
                connected: true,
                inboxes: Vec::new(),
            })),
        }
    }

    /// Registers a new node on the medium and returns its `Bus` handle.
    pub fn attach(&self) -> LoopbackBus {
        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        self.inner.borrow_mut().inboxes.push(inbox.clone());
        LoopbackBus {
            medium: self.inner.clone(),
            inbox,
        }
    }

    /// Simulates a bus disconnect/reconnect, for exercising the
    /// Disconnected state transition in tests.
    pub fn set_connected(&self, connected: bool) {
        self.inner.borrow_mut().connected = connected;
    }
}

/// A single node's handle onto a [`LoopbackMedium`].
pub struct LoopbackBus {
    medium: Rc<RefCell<LoopbackInner>>,
    inbox: Rc<RefCell<VecDeque<Packet>>>,
}

#[derive(Debug, thiserror::Error)]
#[error("loopback bus is not connected")]
pub struct LoopbackError;

impl LoopbackBus {
    /// Pops the next inbound frame addressed to this node, if any.
    pub fn poll(&self) -> Option<Packet> {
        self.inbox.borrow_mut().pop_front()
    }
}

impl Bus for LoopbackBus {
    type Error = LoopbackError;

    fn is_running(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        self.medium.borrow().connected
    }

    fn send(&mut self, data: &[u8], _rate: BaudRate) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(LoopbackError);
        }
        let medium = self.medium.borrow();
        for inbox in &medium.inboxes {
            // A half-duplex bus delivers a sender's own frames back to it
            // too; the router's self-collision check relies on seeing its
            // own proposals echoed by peers, not on seeing its own sends,
            // so skip the inbox that is literally this node's.
            if !Rc::ptr_eq(inbox, &self.inbox) {
                inbox.borrow_mut().push_back(Packet {
                    communication_rate: _rate,
                    data: data.to_vec(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(feature = "serialport")]
mod serial {
    use super::*;
    use std::io::{Read, Write};

    /// A convenience transport for running the Control Service over a
    /// real serial link (e.g. a USB-to-UART adapter wired to a level
    /// shifter, or a `socat` virtual pair for desktop testing). This is
    /// not a conformant hardware PHY, see DESIGN.md.
    pub struct SerialBus {
        port: Box<dyn serialport::SerialPort>,
    }

    impl SerialBus {
        pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
            Self { port }
        }

        /// Reads one control packet's worth of bytes, if the peer has
        /// written any. Returns `Ok(None)` on a timeout with nothing read.
        pub fn poll(&mut self) -> Result<Option<Packet>, serialport::Error> {
            let mut header = [0u8; crate::constants::CONTROL_PACKET_HEADER_SIZE];
            match self.port.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(serialport::Error::from(e)),
            }
            let mut data = header.to_vec();
            let mut rest = vec![0u8; crate::constants::MAX_PACKET_SIZE - header.len()];
            let n = self.port.read(&mut rest).unwrap_or(0);
            data.extend_from_slice(&rest[..n]);
            Ok(Some(Packet {
                communication_rate: BaudRate::Baud1M,
                data,
            }))
        }
    }

    impl Bus for SerialBus {
        type Error = serialport::Error;

        fn is_running(&self) -> bool {
            true
        }

        fn is_connected(&self) -> bool {
            self.port.carrier_detect().unwrap_or(true)
        }

        fn send(&mut self, data: &[u8], _rate: BaudRate) -> Result<(), Self::Error> {
            self.port.write_all(data).map_err(serialport::Error::from)
        }
    }
}

#[cfg(feature = "serialport")]
pub use serial::SerialBus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_delivers_to_peers_not_self() {
        let medium = LoopbackMedium::new();
        let a = medium.attach();
        let b = medium.attach();

        let mut a_mut = a;
        a_mut.send(&[1, 2, 3], BaudRate::Baud1M).unwrap();

        assert!(a_mut.poll().is_none());
        let got = b.poll().expect("b should have received a's frame");
        assert_eq!(got.data, vec![1, 2, 3]);
    }

    #[test]
    fn disconnect_blocks_sends() {
        let medium = LoopbackMedium::new();
        let mut a = medium.attach();
        medium.set_connected(false);
        assert!(!a.is_connected());
        assert!(a.send(&[1], BaudRate::Baud1M).is_err());
    }
}
