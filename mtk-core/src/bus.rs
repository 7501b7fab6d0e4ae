//! Word-wide load/store bus shared by the hart and the Debug Module.
//!
//! Masters talk to the bus through a [`BusPort`]. A master places one [`BusRequest`] on its port
//! and then waits; the [`Arbiter`] grants at most one pending request per tick, in static priority
//! order, and leaves the [`BusResponse`] on the port where the master picks it up on its next
//! tick. Taking the response frees the port for the next request.

use log::trace;
use std::fmt::Debug;
use thiserror::Error;

/// A single word transaction as driven by a master.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BusRequest {
    pub store: bool,
    /// Byte address. Slaves are word-addressed and ignore the two least significant bits.
    pub address: u32,
    /// Byte-enable mask over the four lanes of `data`. Only meaningful for stores.
    pub mask: u8,
    pub data: u32,
}

impl BusRequest {
    pub fn load(address: u32) -> Self {
        Self {
            store: false,
            address,
            mask: 0b1111,
            data: 0,
        }
    }

    pub fn store(address: u32, data: u32, mask: u8) -> Self {
        Self {
            store: true,
            address,
            mask: mask & 0b1111,
            data,
        }
    }
}

/// Completion of a [`BusRequest`]. Seeing it on a port is the `ack`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BusResponse {
    /// Set when no slave claimed the address.
    pub error: bool,
    pub data: u32,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
enum PortState {
    #[default]
    Idle,
    Requested(BusRequest),
    Responded(BusResponse),
}

/// One master's connection to the [`Arbiter`]. Holds at most one transaction in flight.
#[derive(Debug, Clone, Default)]
pub struct BusPort {
    state: PortState,
}

impl BusPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a request on the port. Returns `false` (and drops `request`) if a transaction is
    /// already in flight.
    pub fn issue(&mut self, request: BusRequest) -> bool {
        match self.state {
            PortState::Idle => {
                self.state = PortState::Requested(request);
                true
            }
            _ => false,
        }
    }

    /// Takes the response of the in-flight transaction, if it has completed.
    pub fn take_response(&mut self) -> Option<BusResponse> {
        match self.state {
            PortState::Responded(response) => {
                self.state = PortState::Idle;
                Some(response)
            }
            _ => None,
        }
    }

    /// `true` while a transaction is waiting for the arbiter or its response is not yet taken.
    pub fn is_busy(&self) -> bool {
        self.state != PortState::Idle
    }

    /// Abandon any in-flight transaction.
    pub fn cancel(&mut self) {
        self.state = PortState::Idle;
    }

    fn pending(&self) -> Option<BusRequest> {
        match self.state {
            PortState::Requested(request) => Some(request),
            _ => None,
        }
    }
}

/// Masters in descending priority order.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Master {
    Debug = 0,
    Core = 1,
}

/// Priority-encoded arbiter in front of a [`BusSlave`].
#[derive(Debug, Clone, Default)]
pub struct Arbiter {
    ports: [BusPort; 2],
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self, master: Master) -> &BusPort {
        &self.ports[master as usize]
    }

    pub fn port_mut(&mut self, master: Master) -> &mut BusPort {
        &mut self.ports[master as usize]
    }

    /// Grants the highest-priority pending request and performs it on `slave`.
    pub fn tick<S: BusSlave + ?Sized>(&mut self, slave: &mut S) {
        let Some((index, request)) = self
            .ports
            .iter()
            .enumerate()
            .find_map(|(index, port)| port.pending().map(|request| (index, request)))
        else {
            return;
        };
        let response = match request.store {
            true => match slave.write_word(request.address, request.data, request.mask) {
                Ok(()) => BusResponse {
                    error: false,
                    data: 0,
                },
                Err(_) => BusResponse {
                    error: true,
                    data: 0,
                },
            },
            false => match slave.read_word(request.address) {
                Ok(data) => BusResponse { error: false, data },
                Err(_) => BusResponse {
                    error: true,
                    data: 0,
                },
            },
        };
        trace!(
            "bus {} {:#010x} by master {index}: data {:#010x}, error {}",
            if request.store { "store" } else { "load" },
            request.address,
            if request.store { request.data } else { response.data },
            response.error,
        );
        self.ports[index].state = PortState::Responded(response);
    }
}

/// A word-addressed bus target.
///
/// `address` is the full bus address; implementors drop the two low bits.
pub trait BusSlave: Debug {
    fn read_word(&mut self, address: u32) -> Result<u32, BusError>;

    /// Writes the byte lanes of `data` selected by `mask`.
    fn write_word(&mut self, address: u32, data: u32, mask: u8) -> Result<(), BusError>;
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum BusError {
    #[error("no slave mapped at {0:#010x}")]
    Unmapped(u32),
    #[error("slave rejected write to {0:#010x}")]
    ReadOnly(u32),
}

/// Merges the lanes of `data` selected by `mask` into `word`.
pub fn merge_lanes(word: u32, data: u32, mask: u8) -> u32 {
    let lanes = (0..4)
        .filter(|lane| mask >> lane & 1 == 1)
        .fold(0u32, |acc, lane| acc | 0xff << (lane * 8));
    word & !lanes | data & lanes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Scratch {
        word: u32,
        accesses: usize,
    }

    impl BusSlave for Scratch {
        fn read_word(&mut self, address: u32) -> Result<u32, BusError> {
            self.accesses += 1;
            match address & !3 {
                0 => Ok(self.word),
                _ => Err(BusError::Unmapped(address)),
            }
        }

        fn write_word(&mut self, address: u32, data: u32, mask: u8) -> Result<(), BusError> {
            self.accesses += 1;
            match address & !3 {
                0 => {
                    self.word = merge_lanes(self.word, data, mask);
                    Ok(())
                }
                _ => Err(BusError::Unmapped(address)),
            }
        }
    }

    #[test]
    fn test_merge_lanes() {
        assert_eq!(0x1122_33ef, merge_lanes(0x1122_3344, 0xdead_beef, 0b0001));
        assert_eq!(0xdead_3344, merge_lanes(0x1122_3344, 0xdead_beef, 0b1100));
        assert_eq!(0x1122_3344, merge_lanes(0x1122_3344, 0xdead_beef, 0b0000));
    }

    #[test]
    fn test_response_next_tick() {
        let mut arbiter = Arbiter::new();
        let mut slave = Scratch::default();
        assert!(arbiter
            .port_mut(Master::Core)
            .issue(BusRequest::store(0, 0xcafe, 0b1111)));
        assert!(!arbiter.port_mut(Master::Core).issue(BusRequest::load(0)));
        assert_eq!(None, arbiter.port_mut(Master::Core).take_response());
        arbiter.tick(&mut slave);
        assert_eq!(
            Some(BusResponse {
                error: false,
                data: 0
            }),
            arbiter.port_mut(Master::Core).take_response()
        );
        assert!(!arbiter.port(Master::Core).is_busy());
        assert_eq!(0xcafe, slave.word);
    }

    #[test]
    fn test_debug_port_has_priority() {
        let mut arbiter = Arbiter::new();
        let mut slave = Scratch::default();
        arbiter.port_mut(Master::Core).issue(BusRequest::load(0));
        arbiter
            .port_mut(Master::Debug)
            .issue(BusRequest::store(0, 7, 0b1111));
        arbiter.tick(&mut slave);
        assert!(arbiter.port_mut(Master::Debug).take_response().is_some());
        assert_eq!(None, arbiter.port_mut(Master::Core).take_response());
        arbiter.tick(&mut slave);
        assert_eq!(
            Some(BusResponse {
                error: false,
                data: 7
            }),
            arbiter.port_mut(Master::Core).take_response()
        );
        assert_eq!(2, slave.accesses);
    }

    #[test]
    fn test_unmapped_is_error() {
        let mut arbiter = Arbiter::new();
        let mut slave = Scratch::default();
        arbiter.port_mut(Master::Core).issue(BusRequest::load(0x40));
        arbiter.tick(&mut slave);
        assert_eq!(
            Some(BusResponse {
                error: true,
                data: 0
            }),
            arbiter.port_mut(Master::Core).take_response()
        );
    }
}
