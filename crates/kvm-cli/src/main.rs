//! KVM CLI - headless runner for INDY-3 ROMs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use kvm_core::rom::AssetKind;
use kvm_core::{disassemble, HaltReason, HeadlessHost, Kvm, KvmConfig, RomRegion};
use log::{info, LevelFilter};

/// INDY-3 headless runner
#[derive(Parser, Debug)]
#[command(name = "kvm-cli")]
#[command(about = "Run an INDY-3 ROM without a window", long_about = None)]
struct Args {
    /// Path to the instruction ROM
    #[arg(short, long)]
    rom: PathBuf,

    /// Palette asset name to preload
    #[arg(long)]
    palette: Option<String>,

    /// Tile sheet asset name to preload
    #[arg(long)]
    tiles: Option<String>,

    /// Directory searched for named assets
    #[arg(short, long, default_value = ".")]
    assets: PathBuf,

    /// Cycle budget (0 runs until the ROM halts)
    #[arg(short, long, default_value = "1000000")]
    budget: i64,

    /// Dump CPU state after execution
    #[arg(short = 'c', long)]
    dump_cpu: bool,

    /// Hexdump these 256-byte pages after execution (e.g. 0x00,0x80)
    #[arg(long, value_delimiter = ',', value_parser = parse_page)]
    hexdump: Vec<u8>,

    /// Print a disassembly of the ROM and exit
    #[arg(short, long)]
    disassemble: bool,

    /// Write the last composed frame as a binary PPM
    #[arg(long)]
    frame_out: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv per-instruction trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_page(text: &str) -> Result<u8, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix('$')) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid page {text:?}: {e}"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module("kvm_core", level)
        .filter_module("kvm_cli", level)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let rom = fs::read(&args.rom)
        .with_context(|| format!("failed to read ROM {}", args.rom.display()))?;

    if args.disassemble {
        print_disassembly(&rom);
        return Ok(());
    }

    let config = KvmConfig {
        asset_dir: args.assets.clone(),
        ..Default::default()
    };
    let mut kvm = Kvm::new(config).context("failed to initialise VM")?;
    kvm.load_rom(&rom, RomRegion::Instruction)
        .with_context(|| format!("failed to load {}", args.rom.display()))?;

    if let Some(name) = &args.palette {
        kvm.load_asset(name, AssetKind::Palette)
            .with_context(|| format!("failed to load palette {name:?}"))?;
    }
    if let Some(name) = &args.tiles {
        kvm.load_asset(name, AssetKind::Tiles)
            .with_context(|| format!("failed to load tile sheet {name:?}"))?;
    }

    let mut host = HeadlessHost::new();
    let reason = kvm.run(&mut host, args.budget).context("VM fault")?;
    for line in &host.output {
        println!("{}", line);
    }
    match reason {
        HaltReason::Requested => info!("halted after {} cycles", kvm.cpu().total_cycles()),
        HaltReason::BudgetExceeded => info!("stopped: budget of {} cycles used", args.budget),
        HaltReason::Fault(fault) => info!("stopped by CPU fault: {}", fault),
    }

    if args.dump_cpu {
        dump_cpu_state(&kvm);
    }

    for page in &args.hexdump {
        println!("\nPage ${:02X}:", page);
        print!("{}", kvm.memory().hexdump(*page as usize * 256, 256));
    }

    if let Some(path) = &args.frame_out {
        write_frame(&mut kvm, &host, path)?;
    }

    Ok(())
}

fn print_disassembly(rom: &[u8]) {
    for (address, instruction) in disassemble(rom, RomRegion::Instruction.base()) {
        println!("{:04X}  {:02X}  {}", address, instruction.info.opcode, instruction);
    }
}

fn dump_cpu_state(kvm: &Kvm) {
    let cpu = kvm.cpu();
    let regs = cpu.registers();
    let status = cpu.status();

    println!("\nCPU State:");
    println!("  A:    ${:02X}", regs.a);
    println!("  X:    ${:02X}", regs.x);
    println!("  Y:    ${:02X}", regs.y);
    println!("  PC:   ${:04X}", regs.pc);
    println!("  SP:   ${:02X}", regs.sp);
    println!("  P:    ${:02X} ({})", status.bits(), status);
    println!("  Last: {}", cpu.instruction());
    println!("  Cycles: {}", cpu.total_cycles());
}

/// Save the last presented frame, or compose one if the ROM never presented
fn write_frame(kvm: &mut Kvm, host: &HeadlessHost, path: &Path) -> Result<()> {
    let frame = match &host.last_frame {
        Some(frame) => frame.clone(),
        None => kvm.request_refresh(),
    };
    fs::write(path, frame.to_ppm())
        .with_context(|| format!("failed to write frame to {}", path.display()))?;
    info!("frame written to {}", path.display());
    Ok(())
}
