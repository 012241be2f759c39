//! KVM Core - Pure Rust INDY-3 fantasy console library
//!
//! This crate provides the virtual machine behind the INDY-3 console: an
//! 8-bit CPU with a variable-width instruction set, a flat memory map with
//! video and I/O regions, a tile/sprite compositor and the syscall-driven
//! run loop. It contains no windowing code; frontends implement [`host::Host`].

#![forbid(unsafe_code)]

/// Flat memory and the fixed memory map
pub mod memory;
/// Opcode decoding tables
pub mod decode;
/// CPU registers, flags and the fetch/decode cycle
pub mod cpu;
/// Instruction semantics
pub mod execute;
/// Tile/sprite compositor
pub mod gpu;
/// Keyboard and mouse snapshots
pub mod input;
/// ROM and asset loading
pub mod rom;
/// Services the VM consumes from its embedder
pub mod host;
/// Dispatch loop tying CPU, memory and compositor together
pub mod system;

pub use cpu::{Cpu, CpuError, StatusFlags};
pub use decode::{
    decode, disassemble, AddressingMode, Instruction, InstructionClass, InstructionInfo, Operand,
};
pub use gpu::{Compositor, Frame};
pub use host::{HeadlessHost, Host};
pub use input::{InputSnapshot, Key, KeyState, MouseState};
pub use memory::Memory;
pub use rom::{AssetKind, RomError, RomRegion};
pub use system::{HaltReason, Kvm, KvmConfig, KvmError, StepOutcome, Syscall};
