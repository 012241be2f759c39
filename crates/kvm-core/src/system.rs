//! KVM system integration
//!
//! Ties the CPU, memory and compositor together and runs the syscall
//! dispatch loop. ROM code requests services by writing an id to $0000 and
//! a little-endian operand to $0001-$0002; the loop inspects the mailbox
//! after every CPU cycle, handles the request and clears $0000.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::cpu::{Cpu, CpuError};
use crate::gpu::{Compositor, Frame, MAP_LINES, SPRITE_SLOTS};
use crate::host::Host;
use crate::memory::{
    Memory, DEFAULT_MEMORY_SIZE, INSTRUCTION_ROM, SPRITE_TILE_TABLE, SYSCALL_MAILBOX, TILE_MAP,
};
use crate::rom::{self, AssetKind, RomError, RomRegion};

/// Longest string the debug print syscall will read
const MAX_DEBUG_STRING: usize = 256;

/// VM configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvmConfig {
    /// Memory size in bytes (1..=0x10000)
    pub memory_size: usize,
    /// Initial program counter
    pub entry_point: u16,
    /// Directory searched by the asset syscalls
    pub asset_dir: PathBuf,
}

impl Default for KvmConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            entry_point: INSTRUCTION_ROM,
            asset_dir: PathBuf::from("."),
        }
    }
}

/// System-level errors
#[derive(Debug, Error)]
pub enum KvmError {
    #[error("invalid memory size {0} (must be 1..=65536)")]
    InvalidMemorySize(usize),
    #[error(transparent)]
    Rom(#[from] RomError),
    #[error("CPU fault: {0}")]
    Cpu(#[from] CpuError),
}

/// Result of a [`Kvm::step`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Halted,
    StillRunning,
}

/// Why the VM stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// ROM issued the halt syscall
    Requested,
    /// Cycle budget ran out
    BudgetExceeded,
    /// CPU fault
    Fault(CpuError),
}

/// Syscall ids understood by the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Halt,
    LoadPalette,
    LoadTiles,
    SetBudget,
    TimerStart,
    TimerStop,
    TimerRead,
    TimerReset,
    Delay,
    RefreshKeyboard,
    RefreshMouse,
    RefreshInput,
    Present,
    PrintDebug,
    PrintCpuState,
    Unknown(u8),
}

impl Syscall {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Syscall::Halt,
            2 => Syscall::LoadPalette,
            3 => Syscall::LoadTiles,
            4 => Syscall::SetBudget,
            10 => Syscall::TimerStart,
            11 => Syscall::TimerStop,
            12 => Syscall::TimerRead,
            13 => Syscall::TimerReset,
            14 => Syscall::Delay,
            50 => Syscall::RefreshKeyboard,
            51 => Syscall::RefreshMouse,
            52 => Syscall::RefreshInput,
            100 => Syscall::Present,
            254 => Syscall::PrintDebug,
            255 => Syscall::PrintCpuState,
            other => Syscall::Unknown(other),
        }
    }
}

/// Stopwatch driven by the timer syscalls
#[derive(Debug, Clone, Copy, Default)]
struct Timer {
    started: Option<Instant>,
    accumulated: Duration,
}

impl Timer {
    fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    fn stop(&mut self, now: Instant) {
        if let Some(started) = self.started.take() {
            self.accumulated += now.saturating_duration_since(started);
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        self.accumulated + running
    }

    fn reset(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        if self.started.is_some() {
            self.started = Some(now);
        }
    }
}

/// INDY-3 virtual machine
#[derive(Debug, Clone)]
pub struct Kvm {
    config: KvmConfig,
    cpu: Cpu,
    memory: Memory,
    compositor: Compositor,
    halted: Option<HaltReason>,
    /// Cycles left before the loop gives up; `None` is unlimited
    budget: Option<u64>,
    timer: Timer,
}

impl Kvm {
    /// Create a VM with zeroed memory and video memory initialised
    pub fn new(config: KvmConfig) -> Result<Self, KvmError> {
        let memory = Memory::new(config.memory_size)
            .ok_or(KvmError::InvalidMemorySize(config.memory_size))?;
        let mut kvm = Self {
            cpu: Cpu::with_entry_point(config.entry_point),
            memory,
            compositor: Compositor::new(),
            halted: None,
            budget: None,
            timer: Timer::default(),
            config,
        };
        kvm.clear_video();
        Ok(kvm)
    }

    /// Empty tile map and sprite table
    fn clear_video(&mut self) {
        self.memory.fill(TILE_MAP, MAP_LINES * MAP_LINES, 0xFF);
        self.memory.fill(SPRITE_TILE_TABLE, SPRITE_SLOTS, 0xFF);
    }

    /// Reset the CPU and run state; memory contents are kept
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.halted = None;
        self.budget = None;
        self.timer = Timer::default();
        self.memory.write(SYSCALL_MAILBOX, 0);
    }

    pub fn config(&self) -> &KvmConfig {
        &self.config
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Last composed frame
    pub fn frame(&self) -> &Frame {
        self.compositor.frame()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halted
    }

    /// Remaining cycle budget, `None` when unlimited
    pub fn remaining_budget(&self) -> Option<u64> {
        self.budget
    }

    /// Poll and clear the force-interrupt trap
    pub fn take_break(&mut self) -> bool {
        self.cpu.take_break()
    }

    /// Copy a ROM image into a memory region
    pub fn load_rom(&mut self, bytes: &[u8], region: RomRegion) -> Result<usize, KvmError> {
        let written = rom::load_into(&mut self.memory, bytes, region)?;
        info!("loaded {} bytes at ${:04X}", written, region.base());
        Ok(written)
    }

    /// Read a ROM image from disk into a memory region
    pub fn load_rom_file(&mut self, path: &Path, region: RomRegion) -> Result<usize, KvmError> {
        let bytes = rom::read_file(path)?;
        self.load_rom(&bytes, region)
    }

    /// Load a named palette or tile sheet from the asset directory
    pub fn load_asset(&mut self, name: &str, kind: AssetKind) -> Result<usize, KvmError> {
        Ok(rom::load_asset(
            &mut self.memory,
            &self.config.asset_dir,
            name,
            kind,
        )?)
    }

    /// Run one CPU cycle. A CPU fault halts the VM.
    pub fn cpu_cycle(&mut self) -> Result<(), KvmError> {
        if let Err(fault) = self.cpu.cycle(&mut self.memory) {
            error!("{} at {}", fault, self.cpu);
            self.halted = Some(HaltReason::Fault(fault));
            return Err(fault.into());
        }
        Ok(())
    }

    /// Handle a pending syscall, if any, and clear the mailbox.
    ///
    /// Returns the syscall that was handled.
    pub fn check_and_dispatch_syscall<H: Host>(&mut self, host: &mut H) -> Option<Syscall> {
        let id = self.memory.read(SYSCALL_MAILBOX);
        if id == 0 {
            return None;
        }
        let operand = self.memory.read_u16(SYSCALL_MAILBOX + 1);
        let syscall = Syscall::from_id(id);
        self.dispatch(host, syscall, operand);
        self.memory.write(SYSCALL_MAILBOX, 0);
        Some(syscall)
    }

    fn dispatch<H: Host>(&mut self, host: &mut H, syscall: Syscall, operand: u16) {
        match syscall {
            Syscall::Halt => {
                info!("halt requested after {} cycles", self.cpu.total_cycles());
                self.halted = Some(HaltReason::Requested);
            }
            Syscall::PrintCpuState => {
                let state = self.cpu.to_string();
                info!("{}", state);
                host.print(&state);
            }
            Syscall::PrintDebug => {
                let (text, next) = self.memory.read_cstring(operand, MAX_DEBUG_STRING);
                let count = self.memory.read(next);
                let mut line = text;
                for i in 0..count as u16 {
                    let byte = self.memory.read(next.wrapping_add(1 + i));
                    line.push_str(&format!(" {:02X}", byte));
                }
                host.print(&line);
            }
            Syscall::LoadPalette => self.load_named_asset(operand, AssetKind::Palette),
            Syscall::LoadTiles => self.load_named_asset(operand, AssetKind::Tiles),
            Syscall::SetBudget => {
                self.budget = (operand != 0).then_some(operand as u64);
                debug!("cycle budget set to {:?}", self.budget);
            }
            Syscall::TimerStart => self.timer.start(host.now()),
            Syscall::TimerStop => self.timer.stop(host.now()),
            Syscall::TimerRead => {
                let millis = self.timer.elapsed(host.now()).as_millis();
                let clamped = u16::try_from(millis).unwrap_or(u16::MAX);
                self.memory.write_u16(SYSCALL_MAILBOX + 1, clamped);
            }
            Syscall::TimerReset => self.timer.reset(host.now()),
            Syscall::Delay => host.sleep(Duration::from_millis(operand as u64)),
            Syscall::RefreshKeyboard => host.sample_input().write_keyboard(&mut self.memory),
            Syscall::RefreshMouse => host.sample_input().write_mouse(&mut self.memory),
            Syscall::RefreshInput => {
                let input = host.sample_input();
                input.write_keyboard(&mut self.memory);
                input.write_mouse(&mut self.memory);
            }
            Syscall::Present => {
                let frame = self.compositor.refresh(&mut self.memory);
                host.present(frame);
            }
            Syscall::Unknown(id) => debug!("ignoring unknown syscall {}", id),
        }
    }

    /// Asset syscalls report through $0001: $00 on success, $FF on failure
    fn load_named_asset(&mut self, name_address: u16, kind: AssetKind) {
        let (name, _) = self.memory.read_cstring(name_address, MAX_DEBUG_STRING);
        let status = match self.load_asset(&name, kind) {
            Ok(_) => 0x00,
            Err(err) => {
                warn!("asset {:?} not loaded: {}", name, err);
                0xFF
            }
        };
        self.memory.write(SYSCALL_MAILBOX + 1, status);
    }

    /// Run up to `cycles` cycles (0 or less runs until halted).
    ///
    /// Each cycle is charged against the remaining budget; running out of
    /// budget halts the VM.
    pub fn step<H: Host>(&mut self, host: &mut H, cycles: i64) -> Result<StepOutcome, KvmError> {
        let mut executed: i64 = 0;
        while !self.is_halted() {
            if cycles > 0 && executed >= cycles {
                return Ok(StepOutcome::StillRunning);
            }
            match self.budget {
                Some(0) => {
                    error!(
                        "cycle budget exceeded at {} after {} cycles",
                        self.cpu,
                        self.cpu.total_cycles()
                    );
                    self.halted = Some(HaltReason::BudgetExceeded);
                    break;
                }
                Some(ref mut left) => *left -= 1,
                None => {}
            }
            self.cpu_cycle()?;
            self.check_and_dispatch_syscall(host);
            executed += 1;
        }
        Ok(StepOutcome::Halted)
    }

    /// Run until halted with a total budget of `max_cycles` (0 or less is
    /// unlimited, ROM code may override it with syscall 4)
    pub fn run<H: Host>(&mut self, host: &mut H, max_cycles: i64) -> Result<HaltReason, KvmError> {
        self.budget = (max_cycles > 0).then_some(max_cycles as u64);
        self.step(host, 0)?;
        Ok(self.halted.unwrap_or(HaltReason::Requested))
    }

    /// Publish the offset map and compose a frame
    pub fn request_refresh(&mut self) -> Frame {
        self.compositor.refresh(&mut self.memory).clone()
    }
}
