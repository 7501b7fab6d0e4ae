//! Provides the system-on-chip: one core, its Debug Module and JTAG DTM, RAM and the program
//! buffer on a shared bus.

use log::debug;
use thiserror::Error;

use crate::address_map::{AddressMap, AddressMapError};
use crate::address_range::InvalidBoundsError;
use crate::bus::{Arbiter, BusError, BusSlave, Master};
use crate::core::trap::Interrupt;
use crate::core::{self, Core};
use crate::debug::handshake::HandshakeMonitor;
use crate::debug::jtag::{JtagTap, DEFAULT_IDCODE};
use crate::debug::DebugModule;
use crate::resources::progbuf::ProgramBuffer;
use crate::resources::ram::{Ram, RamError};
use crate::simulator::Clocked;
use crate::AddressRange;

#[derive(Debug, Clone)]
pub struct Config {
    pub core: core::Config,
    /// Physical address of the first RAM byte.
    pub ram_base: u32,
    /// RAM size in bytes. The program-buffer window shadows the RAM it overlaps.
    pub ram_size: u32,
    /// Value of the JTAG IDCODE register.
    pub idcode: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: core::Config::default(),
            ram_base: 0,
            ram_size: 64 * 1024,
            idcode: DEFAULT_IDCODE,
        }
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum SocError {
    #[error(transparent)]
    Ram(#[from] RamError),
    #[error(transparent)]
    AddressMap(#[from] AddressMapError),
    #[error(transparent)]
    Bounds(#[from] InvalidBoundsError),
}

/// Every slave attached to the [`SystemBus`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Resource {
    Ram,
    ProgramBuffer,
}

/// Address decoder in front of the slaves. Unmapped addresses answer with a bus error.
#[derive(Debug)]
struct SystemBus {
    memory_map: AddressMap<Resource>,
    ram: Ram,
    progbuf: ProgramBuffer,
}

impl SystemBus {
    fn new(ram: Ram) -> Result<Self, SocError> {
        let mut memory_map = AddressMap::new();
        let window = ProgramBuffer::range();
        memory_map.insert(window, Resource::ProgramBuffer)?;
        let ram_range = ram.range();
        if ram_range.overlaps(window) {
            if ram_range.start() < window.start() {
                let below = AddressRange::new(ram_range.start(), window.start() - 1)?;
                memory_map.insert(below, Resource::Ram)?;
            }
            if ram_range.end() > window.end() {
                let above = AddressRange::new(window.end() + 1, ram_range.end())?;
                memory_map.insert(above, Resource::Ram)?;
            }
        } else {
            memory_map.insert(ram_range, Resource::Ram)?;
        }
        Ok(Self {
            memory_map,
            ram,
            progbuf: ProgramBuffer::new(),
        })
    }

    fn slave(&mut self, address: u32) -> Result<&mut dyn BusSlave, BusError> {
        match self.memory_map.value(address & !3) {
            Some(Resource::Ram) => Ok(&mut self.ram),
            Some(Resource::ProgramBuffer) => Ok(&mut self.progbuf),
            None => Err(BusError::Unmapped(address)),
        }
    }
}

impl BusSlave for SystemBus {
    fn read_word(&mut self, address: u32) -> Result<u32, BusError> {
        self.slave(address)?.read_word(address)
    }

    fn write_word(&mut self, address: u32, data: u32, mask: u8) -> Result<(), BusError> {
        self.slave(address)?.write_word(address, data, mask)
    }
}

/// The whole system, advanced one clock at a time.
///
/// Per tick, the JTAG TAP, the Debug Module, the core and the bus arbiter run in that order. The
/// Debug Module and the core see each other's outputs as they were at the end of the previous tick.
#[derive(Debug)]
pub struct Soc {
    tap: JtagTap,
    dm: DebugModule,
    core: Core,
    arbiter: Arbiter,
    system_bus: SystemBus,
    monitor: HandshakeMonitor,
    tck: bool,
    tms: bool,
    tdi: bool,
}

impl Soc {
    pub fn new(config: Config) -> Result<Self, SocError> {
        let ram = Ram::new(config.ram_base, config.ram_size)?;
        let system_bus = SystemBus::new(ram)?;
        debug!(
            "soc: {} bytes of RAM at {:#010x}, reset vector {:#010x}",
            config.ram_size, config.ram_base, config.core.reset_vector
        );
        Ok(Self {
            tap: JtagTap::new(config.idcode),
            dm: DebugModule::new(),
            core: Core::new(config.core),
            arbiter: Arbiter::new(),
            system_bus,
            monitor: HandshakeMonitor::new(),
            tck: false,
            tms: true,
            tdi: false,
        })
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn dm(&self) -> &DebugModule {
        &self.dm
    }

    pub fn tap(&self) -> &JtagTap {
        &self.tap
    }

    pub fn ram(&self) -> &Ram {
        &self.system_bus.ram
    }

    pub fn progbuf(&self) -> &ProgramBuffer {
        &self.system_bus.progbuf
    }

    /// Copy `bytes` into RAM at physical address `address`, bypassing the bus.
    pub fn load_physical(&mut self, address: u32, bytes: &[u8]) -> Result<(), RamError> {
        self.system_bus.ram.load(address, bytes)
    }

    /// Drives the JTAG input pins. They take effect through the TAP's synchronizers.
    pub fn set_pins(&mut self, tck: bool, tms: bool, tdi: bool) {
        self.tck = tck;
        self.tms = tms;
        self.tdi = tdi;
    }

    pub fn tdo(&self) -> bool {
        self.tap.tdo()
    }

    pub fn set_interrupt_line(&mut self, interrupt: Interrupt, value: bool) {
        self.core.set_interrupt_line(interrupt, value);
    }

    /// `true` once the halt/resume handshake between the Debug Module and the core was violated,
    /// or the debugger asked an already halted hart to halt.
    pub fn handshake_error(&self) -> bool {
        self.monitor.error() || self.dm.protocol_error()
    }
}

impl Clocked for Soc {
    fn tick(&mut self) {
        let requests = self.dm.requests();
        let status = self.core.status();
        let event = self
            .tap
            .tick(self.tck, self.tms, self.tdi, self.dm.dmi_target());
        self.dm
            .tick(event, &status, self.arbiter.port_mut(Master::Debug));
        self.core
            .tick(self.arbiter.port_mut(Master::Core), &requests);
        self.arbiter.tick(&mut self.system_bus);
        self.monitor.sample(&self.dm.requests(), &self.core.status());
    }
}
