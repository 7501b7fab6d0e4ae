use std::fs;
use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, warn};
use mtk_core::resources::ram::RamError;
use mtk_core::soc::{Config, SocError};
use mtk_core::{Simulator, Soc};
use thiserror::Error;

mod bitbang;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Program to load: an ELF file, or a flat binary with `--raw`.
    program: PathBuf,
    /// Load the program as a flat binary at the reset vector.
    #[arg(long)]
    raw: bool,
    /// RAM size in bytes, mapped at address 0.
    #[arg(long, default_value_t = 64 * 1024)]
    ram_size: u32,
    /// Enable Sv32 address translation outside Machine mode.
    #[arg(long)]
    sv32: bool,
    /// Stop after this many ticks if the hart hasn't halted.
    #[arg(long, default_value_t = 1_000_000)]
    max_ticks: u64,
    /// Serve an OpenOCD remote_bitbang endpoint on this port instead of running freely.
    #[arg(long)]
    bitbang: Option<u16>,
    /// Increase log verbosity (repeatable).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Error, Debug)]
enum LoadError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse ELF: {0}")]
    Elf(#[from] goblin::error::Error),
    #[error("segment doesn't fit in RAM: {0}")]
    Ram(#[from] RamError),
    #[error("segment at {address:#x} has a file range outside the ELF")]
    Segment { address: u64 },
    #[error(transparent)]
    Soc(#[from] SocError),
}

fn main() -> Result<(), LoadError> {
    let args = Args::parse();

    if let Err(err) = stderrlog::new()
        .verbosity(1 + args.verbose as usize)
        .modules([module_path!(), "mtk_core"])
        .init()
    {
        eprintln!("failed to initialize logging: {err}");
    }

    let mut config = Config {
        ram_size: args.ram_size,
        ..Config::default()
    };
    config.core.virtual_memory = args.sv32;
    let reset_vector = config.core.reset_vector;

    let mut soc = Soc::new(config)?;
    let program = fs::read(&args.program)?;
    if args.raw {
        soc.load_physical(reset_vector, &program)?;
    } else {
        load_elf(&mut soc, &program)?;
    }

    match args.bitbang {
        Some(port) => bitbang::serve(Simulator::new(soc), port)?,
        None => run(Simulator::new(soc), args.max_ticks),
    }
    Ok(())
}

/// Copies every `PT_LOAD` segment to its physical address.
fn load_elf(soc: &mut Soc, program_elf: &[u8]) -> Result<(), LoadError> {
    let elf = goblin::elf::Elf::parse(program_elf)?;
    let segments = elf
        .program_headers
        .iter()
        .filter(|h| h.p_type == goblin::elf::program_header::PT_LOAD && h.p_filesz > 0);
    for h in segments {
        debug!(
            "loading segment into memory at [{:#010x}..{:#010x}]",
            h.p_paddr,
            h.p_paddr + h.p_filesz,
        );
        let bytes = program_elf
            .get(h.file_range())
            .ok_or(LoadError::Segment { address: h.p_paddr })?;
        soc.load_physical(h.p_paddr as u32, bytes)?;
    }
    Ok(())
}

fn run(mut simulator: Simulator<Soc>, max_ticks: u64) {
    match simulator.run_until(|soc| soc.core().is_halted(), max_ticks) {
        Ok(ticks) => info!("hart halted after {ticks} ticks"),
        Err(err) => warn!("{err}"),
    }
    let soc = simulator.simulatable();
    let core = soc.core();
    println!("pc  = {:#010x} ({})", core.pc(), core.privilege());
    for (index, value) in core.registers().dump().iter().enumerate().skip(1) {
        println!("x{index:<2} = {value:#010x}");
    }
    if soc.handshake_error() {
        warn!("debug handshake violations were detected");
    }
}
