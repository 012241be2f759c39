//! Opcode decoding
//!
//! An opcode byte encodes its size in the top bits, its addressing mode in
//! the next few, and its operation in the low five bits. A set of irregular
//! opcodes does not follow the bit-field scheme and is resolved by an
//! explicit table instead. The whole classification is computed at compile
//! time into [`DECODE_TABLE`]; ROMs depend on it byte for byte.

use std::fmt;

/// Encoded instruction length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstructionSize {
    /// Opcode only
    Small = 1,
    /// Opcode + one operand byte
    Medium = 2,
    /// Opcode + little-endian operand word
    Large = 3,
}

impl InstructionSize {
    /// Total encoded length in bytes
    pub const fn bytes(self) -> u16 {
        self as u16
    }
}

/// Addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implicit,
    Immediate,
    Relative,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    Indirect,
    AbsoluteX,
    AbsoluteY,
    /// `(word + X)` dereferenced
    IndexedIndirectX,
    /// `(word)` dereferenced, then + Y
    IndirectIndexedY,
}

/// Operation performed by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionClass {
    Invalid,
    NoOp,
    ForceInterrupt,
    Return,
    /// TXA / TYA
    Transfer,
    /// TAX / TAY
    TransferAccumulator,
    /// TSX / TXS
    TransferStack,
    StackPush,
    StackPull,
    SetFlag,
    ClearFlag,
    And,
    Or,
    Xor,
    BitTest,
    Add,
    Subtract,
    Compare,
    Increment,
    Decrement,
    ShiftLeft,
    ShiftRight,
    RotateLeft,
    RotateRight,
    Load,
    Store,
    BranchIfClear,
    BranchIfSet,
    Jump,
    JumpToSubroutine,
}

/// Register or flag an instruction works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Memory operand, or nothing at all
    None,
    Accumulator,
    X,
    Y,
    StackPointer,
    ProcessorStatus,
    Carry,
    Zero,
    Negative,
    Overflow,
    InterruptDisable,
}

/// Everything the opcode byte alone tells about an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionInfo {
    pub opcode: u8,
    pub size: InstructionSize,
    pub mode: AddressingMode,
    pub class: InstructionClass,
    pub operand: Operand,
}

impl InstructionInfo {
    const INVALID: Self = Self {
        opcode: 0,
        size: InstructionSize::Small,
        mode: AddressingMode::Implicit,
        class: InstructionClass::Invalid,
        operand: Operand::None,
    };

    /// Assembler mnemonic
    pub fn mnemonic(&self) -> &'static str {
        use InstructionClass as C;
        match (self.class, self.operand) {
            (C::Invalid, _) => "???",
            (C::NoOp, _) => "NOP",
            (C::ForceInterrupt, _) => "BRK",
            (C::Return, _) if self.opcode == 0x03 => "RTI",
            (C::Return, _) => "RTS",
            (C::TransferAccumulator, Operand::X) => "TAX",
            (C::TransferAccumulator, _) => "TAY",
            (C::Transfer, Operand::X) => "TXA",
            (C::Transfer, _) => "TYA",
            (C::TransferStack, Operand::X) => "TXS",
            (C::TransferStack, _) => "TSX",
            (C::StackPush, Operand::Accumulator) => "PHA",
            (C::StackPush, _) => "PHP",
            (C::StackPull, Operand::Accumulator) => "PLA",
            (C::StackPull, _) => "PLP",
            (C::SetFlag, Operand::InterruptDisable) => "SEI",
            (C::SetFlag, _) => "SEC",
            (C::ClearFlag, Operand::Overflow) => "CLV",
            (C::ClearFlag, Operand::InterruptDisable) => "CLI",
            (C::ClearFlag, _) => "CLC",
            (C::And, _) => "AND",
            (C::Or, _) => "ORA",
            (C::Xor, _) => "XOR",
            (C::BitTest, _) => "BIT",
            (C::Add, _) => "ADC",
            (C::Subtract, _) => "SBC",
            (C::Compare, Operand::X) => "CPX",
            (C::Compare, Operand::Y) => "CPY",
            (C::Compare, _) => "CMP",
            (C::Increment, Operand::X) => "INX",
            (C::Increment, Operand::Y) => "INY",
            (C::Increment, _) => "INC",
            (C::Decrement, Operand::X) => "DEX",
            (C::Decrement, Operand::Y) => "DEY",
            (C::Decrement, _) => "DEC",
            (C::ShiftLeft, _) => "SHL",
            (C::ShiftRight, _) => "SHR",
            (C::RotateLeft, _) => "ROL",
            (C::RotateRight, _) => "ROR",
            (C::Load, Operand::X) => "LDX",
            (C::Load, Operand::Y) => "LDY",
            (C::Load, _) => "LDA",
            (C::Store, Operand::X) => "STX",
            (C::Store, Operand::Y) => "STY",
            (C::Store, _) => "STA",
            (C::BranchIfClear, Operand::Zero) => "BNE",
            (C::BranchIfClear, Operand::Negative) => "BPL",
            (C::BranchIfClear, Operand::Overflow) => "BVC",
            (C::BranchIfClear, _) => "BCC",
            (C::BranchIfSet, Operand::Zero) => "BEQ",
            (C::BranchIfSet, Operand::Negative) => "BMI",
            (C::BranchIfSet, Operand::Overflow) => "BVS",
            (C::BranchIfSet, _) => "BCS",
            (C::Jump, _) => "JMP",
            (C::JumpToSubroutine, _) => "JSR",
        }
    }
}

/// A decoded instruction together with its operand bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub info: InstructionInfo,
    pub low: u8,
    pub high: u8,
}

impl Instruction {
    /// Idle instruction held by a CPU before its first cycle
    pub const EMPTY: Self = Self {
        info: InstructionInfo::INVALID,
        low: 0,
        high: 0,
    };

    /// Operand bytes merged into a little-endian word
    pub fn word(&self) -> u16 {
        self.low as u16 | ((self.high as u16) << 8)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.info.mnemonic();
        let word = self.word();
        match self.info.mode {
            AddressingMode::Implicit => write!(f, "{m}"),
            AddressingMode::Immediate => write!(f, "{m} #${:02X}", self.low),
            AddressingMode::Relative => write!(f, "{m} #{}", self.low as i8),
            AddressingMode::ZeroPage => write!(f, "{m} ${:02X}", self.low),
            AddressingMode::ZeroPageX => write!(f, "{m} ${:02X} x", self.low),
            AddressingMode::ZeroPageY => write!(f, "{m} ${:02X} y", self.low),
            AddressingMode::Absolute => write!(f, "{m} ${word:04X}"),
            AddressingMode::AbsoluteX => write!(f, "{m} ${word:04X} x"),
            AddressingMode::AbsoluteY => write!(f, "{m} ${word:04X} y"),
            AddressingMode::Indirect => write!(f, "{m} (${word:04X})"),
            AddressingMode::IndexedIndirectX => write!(f, "{m} (${word:04X} x)"),
            AddressingMode::IndirectIndexedY => write!(f, "{m} (${word:04X} y)"),
        }
    }
}

/// Pass 1: instruction length from the top bits
pub const fn decode_size(opcode: u8) -> InstructionSize {
    match opcode >> 6 {
        0b00 => InstructionSize::Small,
        0b01 => InstructionSize::Medium,
        0b10 => InstructionSize::Large,
        // 111***** is large, 110***** is medium
        _ => {
            if opcode & 0b0010_0000 != 0 {
                InstructionSize::Large
            } else {
                InstructionSize::Medium
            }
        }
    }
}

/// Pass 2: addressing mode, given the size from pass 1
pub const fn decode_mode(opcode: u8, size: InstructionSize) -> AddressingMode {
    match size {
        InstructionSize::Small => AddressingMode::Implicit,
        InstructionSize::Medium => match opcode >> 5 {
            0b010 => AddressingMode::ZeroPage,
            // LDX $,y and STX $,y are the only Y-indexed zero page opcodes
            0b011 => match opcode & 0b1_1111 {
                0b1_0001 | 0b1_0101 => AddressingMode::ZeroPageY,
                _ => AddressingMode::ZeroPageX,
            },
            // 0b110: branches start at 0xD8
            _ => {
                if opcode < 0xD8 {
                    AddressingMode::Immediate
                } else {
                    AddressingMode::Relative
                }
            }
        },
        InstructionSize::Large => {
            if opcode >> 5 == 0b111 {
                AddressingMode::Absolute
            } else if (opcode >> 4) & 0b11 == 0b10 {
                if opcode & 0b1000 != 0 {
                    AddressingMode::IndirectIndexedY
                } else {
                    AddressingMode::IndexedIndirectX
                }
            } else {
                let low = opcode & 0b11_1111;
                if low > 0b11_0100 || low == 0b01_0001 || low == 0b01_0011 {
                    AddressingMode::AbsoluteY
                } else if low == 0b00_1001 {
                    AddressingMode::Indirect
                } else {
                    AddressingMode::AbsoluteX
                }
            }
        }
    }
}

/// Opcodes resolved by explicit lookup instead of bit fields
pub const fn is_irregular(opcode: u8) -> bool {
    matches!(
        opcode,
        0x00..=0x10
            | 0xB8..=0xBF
            | 0x89
            | 0x93
            | 0xA3
            | 0xA7
            | 0xA8
            | 0xA9
            | 0xAA
            | 0xAB
            | 0xAC
            | 0xAD
            | 0xAE
            | 0xAF
            | 0xB7
            | 0xE9
            | 0xEB
    )
}

const fn irregular_class(opcode: u8) -> (InstructionClass, Operand) {
    use InstructionClass as C;
    match opcode {
        0x00 => (C::NoOp, Operand::None),
        0x01 => (C::ForceInterrupt, Operand::None),
        0x02 | 0x03 => (C::Return, Operand::None),
        0x04 => (C::TransferAccumulator, Operand::X),
        0x05 => (C::TransferAccumulator, Operand::Y),
        0x06 => (C::Transfer, Operand::X),
        0x07 => (C::Transfer, Operand::Y),
        0x08 => (C::TransferStack, Operand::StackPointer),
        0x09 => (C::TransferStack, Operand::X),
        0x0A => (C::StackPush, Operand::Accumulator),
        0x0B => (C::StackPull, Operand::Accumulator),
        0x0C => (C::StackPush, Operand::ProcessorStatus),
        0x0D => (C::StackPull, Operand::ProcessorStatus),
        0x0E => (C::SetFlag, Operand::Carry),
        0x0F => (C::ClearFlag, Operand::Carry),
        0x10 => (C::ClearFlag, Operand::Overflow),

        0x89 | 0xE9 => (C::Jump, Operand::None),
        0xEB => (C::JumpToSubroutine, Operand::None),
        // LDA/STA absolute,Y and the indirect forms
        0x93 | 0xA3 | 0xAB => (C::Load, Operand::Accumulator),
        0xB7 | 0xA7 | 0xAF => (C::Store, Operand::Accumulator),

        // Arithmetic in absolute,Y (0xB8-) and indirect-indexed,Y (0xA8-)
        0xB8 | 0xA8 => (C::And, Operand::Accumulator),
        0xB9 | 0xA9 => (C::Or, Operand::Accumulator),
        0xBA | 0xAA => (C::Xor, Operand::Accumulator),
        0xBC | 0xAC => (C::Add, Operand::Accumulator),
        0xBD | 0xAD => (C::Subtract, Operand::Accumulator),
        0xBE | 0xAE => (C::Compare, Operand::Accumulator),
        _ => (C::Invalid, Operand::None),
    }
}

const fn regular_class(opcode: u8, mode: AddressingMode) -> (InstructionClass, Operand) {
    use InstructionClass as C;
    let register_form = matches!(mode, AddressingMode::Implicit | AddressingMode::Immediate);
    let step_target = if register_form { Operand::X } else { Operand::None };
    let shift_target = if register_form {
        Operand::Accumulator
    } else {
        Operand::None
    };

    if opcode & 0b1_0000 == 0 {
        // Arithmetic and logic
        match opcode & 0x0F {
            0x0 => (C::And, Operand::Accumulator),
            0x1 => (C::Or, Operand::Accumulator),
            0x2 => (C::Xor, Operand::Accumulator),
            0x3 => (C::BitTest, Operand::Accumulator),
            0x4 => (C::Add, Operand::Accumulator),
            0x5 => (C::Subtract, Operand::Accumulator),
            0x6 => (C::Compare, Operand::Accumulator),
            0x7 => (C::Compare, Operand::X),
            0x8 => (C::Increment, step_target),
            0x9 => (C::Increment, Operand::Y),
            0xA => (C::Decrement, step_target),
            0xB => (C::Decrement, Operand::Y),
            0xC => (C::ShiftLeft, shift_target),
            0xD => (C::ShiftRight, shift_target),
            0xE => (C::RotateLeft, shift_target),
            _ => (C::RotateRight, shift_target),
        }
    } else {
        // Loads, stores, CPY and branches
        match opcode & 0x0F {
            0x0 => (C::Load, Operand::Accumulator),
            0x1 => (C::Load, Operand::X),
            0x2 => (C::Load, Operand::Y),
            0x3 => (C::Compare, Operand::Y),
            0x4 => (C::Store, Operand::Accumulator),
            0x5 => (C::Store, Operand::X),
            0x6 => (C::Store, Operand::Y),
            0x8 => (C::BranchIfClear, Operand::Carry),
            0x9 => (C::BranchIfSet, Operand::Carry),
            0xA => (C::BranchIfClear, Operand::Zero),
            0xB => (C::BranchIfSet, Operand::Zero),
            0xC => (C::BranchIfClear, Operand::Negative),
            0xD => (C::BranchIfSet, Operand::Negative),
            0xE => (C::BranchIfClear, Operand::Overflow),
            0xF => (C::BranchIfSet, Operand::Overflow),
            _ => (C::Invalid, Operand::None),
        }
    }
}

/// Run all three decode passes for one opcode
pub const fn classify(opcode: u8) -> InstructionInfo {
    let size = decode_size(opcode);
    let mode = decode_mode(opcode, size);
    let (class, operand) = if is_irregular(opcode) {
        irregular_class(opcode)
    } else {
        regular_class(opcode, mode)
    };
    InstructionInfo {
        opcode,
        size,
        mode,
        class,
        operand,
    }
}

const fn build_table() -> [InstructionInfo; 256] {
    let mut table = [InstructionInfo::INVALID; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = classify(i as u8);
        i += 1;
    }
    table
}

/// Classification of every opcode, computed at compile time
pub static DECODE_TABLE: [InstructionInfo; 256] = build_table();

/// Decode one opcode byte
#[inline]
pub fn decode(opcode: u8) -> InstructionInfo {
    DECODE_TABLE[opcode as usize]
}

/// Decode a byte stream into `(address, instruction)` pairs.
///
/// A truncated final instruction has its missing operand bytes read as 0.
pub fn disassemble(bytes: &[u8], origin: u16) -> Vec<(u16, Instruction)> {
    let mut listing = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        let info = decode(bytes[offset]);
        let operand = |n: usize| bytes.get(offset + n).copied().unwrap_or(0);
        let instruction = Instruction {
            info,
            low: if info.size != InstructionSize::Small { operand(1) } else { 0 },
            high: if info.size == InstructionSize::Large { operand(2) } else { 0 },
        };
        listing.push((origin.wrapping_add(offset as u16), instruction));
        offset += info.size.bytes() as usize;
    }
    listing
}
