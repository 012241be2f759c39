//! CPU module - INDY-3 8-bit core
//!
//! Accumulator machine with two index registers, a one-page stack and a
//! variable-width instruction set. Decoding lives in [`crate::decode`],
//! instruction semantics in [`crate::execute`]; this module owns the
//! register file, the stack discipline and the fetch/decode cycle.

use std::fmt;

use log::trace;
use thiserror::Error;

use crate::decode::{decode, Instruction, InstructionSize};
use crate::execute;
use crate::memory::{INSTRUCTION_ROM, STACK_PAGE};

/// CPU registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,   // Accumulator
    pub x: u8,   // X index register
    pub y: u8,   // Y index register
    pub sp: u8,  // Stack pointer (offset into $0100)
    pub pc: u16, // Program counter
}

impl Registers {
    /// Power-on register file with PC at `entry_point`
    pub fn with_entry_point(entry_point: u16) -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFF,
            pc: entry_point,
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::with_entry_point(INSTRUCTION_ROM)
    }
}

/// CPU status flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const CARRY: u8 = 0b0000_0001;
    pub const ZERO: u8 = 0b0000_0010;
    pub const INTERRUPT: u8 = 0b0000_0100;
    pub const BREAK: u8 = 0b0001_0000;
    pub const OVERFLOW: u8 = 0b0100_0000;
    pub const NEGATIVE: u8 = 0b1000_0000;

    pub fn new(flags: u8) -> Self {
        Self(flags)
    }

    /// Raw status byte
    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn carry(&self) -> bool {
        (self.0 & Self::CARRY) != 0
    }

    pub fn zero(&self) -> bool {
        (self.0 & Self::ZERO) != 0
    }

    pub fn interrupt(&self) -> bool {
        (self.0 & Self::INTERRUPT) != 0
    }

    pub fn brk(&self) -> bool {
        (self.0 & Self::BREAK) != 0
    }

    pub fn overflow(&self) -> bool {
        (self.0 & Self::OVERFLOW) != 0
    }

    pub fn negative(&self) -> bool {
        (self.0 & Self::NEGATIVE) != 0
    }

    /// Set or clear any combination of flag bits
    pub fn set(&mut self, mask: u8, val: bool) {
        self.0 = if val { self.0 | mask } else { self.0 & !mask };
    }

    pub fn set_carry(&mut self, val: bool) {
        self.set(Self::CARRY, val);
    }

    pub fn set_zero(&mut self, val: bool) {
        self.set(Self::ZERO, val);
    }

    pub fn set_interrupt(&mut self, val: bool) {
        self.set(Self::INTERRUPT, val);
    }

    pub fn set_overflow(&mut self, val: bool) {
        self.set(Self::OVERFLOW, val);
    }

    pub fn set_negative(&mut self, val: bool) {
        self.set(Self::NEGATIVE, val);
    }

    /// Update Z and N from a result byte
    pub fn set_zero_negative(&mut self, value: u8) {
        self.set_zero(value == 0);
        self.set_negative(value & 0x80 != 0);
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C:{} Z:{} I:{} B:{} V:{} N:{}",
            self.carry() as u8,
            self.zero() as u8,
            self.interrupt() as u8,
            self.brk() as u8,
            self.overflow() as u8,
            self.negative() as u8
        )
    }
}

/// CPU error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("stack overflow (SP=${sp:02X})")]
    StackOverflow { sp: u8 },
    #[error("stack underflow (SP=${sp:02X})")]
    StackUnderflow { sp: u8 },
}

/// Bus trait for memory access
pub trait Bus {
    /// Read a byte from the given address
    fn read(&self, address: u16) -> u8;
    /// Write a byte to the given address
    fn write(&mut self, address: u16, value: u8);

    /// Read a little-endian word
    fn read_word(&self, address: u16) -> u16 {
        let lo = self.read(address) as u16;
        let hi = self.read(address.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }
}

/// CPU emulator state
#[derive(Debug, Clone)]
pub struct Cpu {
    pub registers: Registers,
    pub status: StatusFlags,
    /// Instruction fetched by the most recent cycle
    instruction: Instruction,
    entry_point: u16,
    /// Total cycles executed
    total_cycles: u64,
    /// Raised by BRK, cleared by the host
    break_requested: bool,
}

impl Cpu {
    /// Create a CPU that starts executing at the instruction ROM base
    pub fn new() -> Self {
        Self::with_entry_point(INSTRUCTION_ROM)
    }

    pub fn with_entry_point(entry_point: u16) -> Self {
        Self {
            registers: Registers::with_entry_point(entry_point),
            status: StatusFlags::default(),
            instruction: Instruction::EMPTY,
            entry_point,
            total_cycles: 0,
            break_requested: false,
        }
    }

    /// Reset the CPU to its power-on state
    pub fn reset(&mut self) {
        *self = Self::with_entry_point(self.entry_point);
    }

    /// Get CPU registers
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Get CPU status flags
    pub fn status(&self) -> &StatusFlags {
        &self.status
    }

    /// Instruction executed by the last cycle
    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    /// Get total cycles executed
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Raise the force-interrupt trap
    pub fn request_break(&mut self) {
        self.break_requested = true;
    }

    /// Poll and clear the force-interrupt trap
    pub fn take_break(&mut self) -> bool {
        std::mem::take(&mut self.break_requested)
    }

    /// Fetch, decode and execute one instruction.
    ///
    /// PC is advanced past the instruction before it executes, so relative
    /// branches and JSR see the address of the next instruction.
    pub fn cycle<B: Bus>(&mut self, bus: &mut B) -> Result<(), CpuError> {
        let pc = self.registers.pc;
        let info = decode(bus.read(pc));
        let low = match info.size {
            InstructionSize::Small => 0,
            _ => bus.read(pc.wrapping_add(1)),
        };
        let high = match info.size {
            InstructionSize::Large => bus.read(pc.wrapping_add(2)),
            _ => 0,
        };
        self.instruction = Instruction { info, low, high };
        trace!("{:04X}  {}", pc, self.instruction);

        self.registers.pc = pc.wrapping_add(info.size.bytes());
        self.total_cycles += 1;

        let instruction = self.instruction;
        execute::execute(self, bus, &instruction)
    }

    /// Push one byte. Fails at SP = $00; see [`STACK_PAGE`].
    pub fn push<B: Bus>(&mut self, bus: &mut B, value: u8) -> Result<(), CpuError> {
        let sp = self.registers.sp;
        let next = sp.checked_sub(1).ok_or(CpuError::StackOverflow { sp })?;
        bus.write(STACK_PAGE + sp as u16, value);
        self.registers.sp = next;
        Ok(())
    }

    /// Pull one byte
    pub fn pull<B: Bus>(&mut self, bus: &mut B) -> Result<u8, CpuError> {
        let sp = self.registers.sp;
        let next = sp.checked_add(1).ok_or(CpuError::StackUnderflow { sp })?;
        self.registers.sp = next;
        Ok(bus.read(STACK_PAGE + next as u16))
    }

    /// Push a word, high byte first
    pub fn push_word<B: Bus>(&mut self, bus: &mut B, value: u16) -> Result<(), CpuError> {
        let sp = self.registers.sp;
        let next = sp.checked_sub(2).ok_or(CpuError::StackOverflow { sp })?;
        bus.write(STACK_PAGE + sp as u16, (value >> 8) as u8);
        bus.write(STACK_PAGE + (sp - 1) as u16, value as u8);
        self.registers.sp = next;
        Ok(())
    }

    /// Pull a word pushed by [`Cpu::push_word`]
    pub fn pull_word<B: Bus>(&mut self, bus: &mut B) -> Result<u16, CpuError> {
        let sp = self.registers.sp;
        let next = sp.checked_add(2).ok_or(CpuError::StackUnderflow { sp })?;
        let lo = bus.read(STACK_PAGE + (sp + 1) as u16) as u16;
        let hi = bus.read(STACK_PAGE + next as u16) as u16;
        self.registers.sp = next;
        Ok(lo | (hi << 8))
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.registers;
        write!(
            f,
            "PC: {:04X} A: {:02X} X: {:02X} Y: {:02X} SP: {:02X} P: {:02X} [{}]",
            r.pc,
            r.a,
            r.x,
            r.y,
            r.sp,
            self.status.bits(),
            self.status
        )
    }
}
