//! Instruction semantics
//!
//! Operates on an already-decoded [`Instruction`]; PC has been advanced past
//! it by the time [`execute`] runs.

use log::debug;

use crate::cpu::{Bus, Cpu, CpuError, StatusFlags};
use crate::decode::{AddressingMode, Instruction, InstructionClass, Operand};

const ARITHMETIC_FLAGS: u8 =
    StatusFlags::CARRY | StatusFlags::ZERO | StatusFlags::OVERFLOW | StatusFlags::NEGATIVE;
const COMPARE_FLAGS: u8 = StatusFlags::CARRY | StatusFlags::ZERO | StatusFlags::NEGATIVE;

/// `a + m + c` wrapped to 8 bits; carry is set iff the result is below `a`.
///
/// That rule misses the wrap of `a + $FF + 1`, which comes back to `a`
/// with carry clear. ROMs rely on it as is.
///
/// Returns the 8-bit result and the C/Z/V/N flags it produces.
pub fn add_with_carry(a: u8, m: u8, carry: bool) -> (u8, StatusFlags) {
    let result = a.wrapping_add(m).wrapping_add(carry as u8);
    let mut flags = StatusFlags::default();
    flags.set_carry(result < a);
    flags.set_overflow(!(a ^ m) & (a ^ result) & 0x80 != 0);
    flags.set_zero_negative(result);
    (result, flags)
}

/// `a - m - (1 - c)`; mirror of [`add_with_carry`], carry is set iff the
/// result is not above `a` (`a - $FF - 1` returns `a` with carry set)
pub fn subtract_with_borrow(a: u8, m: u8, carry: bool) -> (u8, StatusFlags) {
    let result = a.wrapping_sub(m).wrapping_sub(!carry as u8);
    let mut flags = StatusFlags::default();
    flags.set_carry(result <= a);
    flags.set_overflow((a ^ m) & (a ^ result) & 0x80 != 0);
    flags.set_zero_negative(result);
    (result, flags)
}

/// C/Z/N flags of `register - m`
pub fn compare(register: u8, m: u8) -> StatusFlags {
    let mut flags = StatusFlags::default();
    flags.set_carry(register >= m);
    flags.set_zero(register == m);
    flags.set_negative(register.wrapping_sub(m) & 0x80 != 0);
    flags
}

fn merge_flags(cpu: &mut Cpu, mask: u8, flags: StatusFlags) {
    cpu.status = StatusFlags::new((cpu.status.bits() & !mask) | (flags.bits() & mask));
}

fn flag_mask(operand: Operand) -> Option<u8> {
    match operand {
        Operand::Carry => Some(StatusFlags::CARRY),
        Operand::Zero => Some(StatusFlags::ZERO),
        Operand::Negative => Some(StatusFlags::NEGATIVE),
        Operand::Overflow => Some(StatusFlags::OVERFLOW),
        Operand::InterruptDisable => Some(StatusFlags::INTERRUPT),
        _ => None,
    }
}

/// Resolve the memory address an instruction refers to.
///
/// Implicit, immediate and relative instructions have none.
pub fn effective_address<B: Bus>(cpu: &Cpu, bus: &B, instruction: &Instruction) -> Option<u16> {
    let r = &cpu.registers;
    let zp = instruction.low;
    let word = instruction.word();
    match instruction.info.mode {
        AddressingMode::Implicit | AddressingMode::Immediate | AddressingMode::Relative => None,
        AddressingMode::ZeroPage => Some(zp as u16),
        AddressingMode::ZeroPageX => Some(zp.wrapping_add(r.x) as u16),
        AddressingMode::ZeroPageY => Some(zp.wrapping_add(r.y) as u16),
        AddressingMode::Absolute => Some(word),
        AddressingMode::AbsoluteX => Some(word.wrapping_add(r.x as u16)),
        AddressingMode::AbsoluteY => Some(word.wrapping_add(r.y as u16)),
        AddressingMode::Indirect => Some(bus.read_word(word)),
        AddressingMode::IndexedIndirectX => Some(bus.read_word(word.wrapping_add(r.x as u16))),
        AddressingMode::IndirectIndexedY => {
            Some(bus.read_word(word).wrapping_add(r.y as u16))
        }
    }
}

/// Value operand: the literal for immediate mode, otherwise the byte at the
/// effective address
fn operand_value<B: Bus>(cpu: &Cpu, bus: &B, instruction: &Instruction) -> Option<u8> {
    match instruction.info.mode {
        AddressingMode::Immediate => Some(instruction.low),
        _ => effective_address(cpu, bus, instruction).map(|address| bus.read(address)),
    }
}

fn register_mut(cpu: &mut Cpu, operand: Operand) -> Option<&mut u8> {
    match operand {
        Operand::Accumulator => Some(&mut cpu.registers.a),
        Operand::X => Some(&mut cpu.registers.x),
        Operand::Y => Some(&mut cpu.registers.y),
        _ => None,
    }
}

fn register(cpu: &Cpu, operand: Operand) -> u8 {
    match operand {
        Operand::X => cpu.registers.x,
        Operand::Y => cpu.registers.y,
        _ => cpu.registers.a,
    }
}

/// Shift or rotate `value`; returns the result and the bit shifted out
fn shift(class: InstructionClass, value: u8, carry: bool) -> (u8, bool) {
    match class {
        InstructionClass::ShiftLeft => (value << 1, value & 0x80 != 0),
        InstructionClass::ShiftRight => (value >> 1, value & 0x01 != 0),
        InstructionClass::RotateLeft => ((value << 1) | carry as u8, value & 0x80 != 0),
        _ => ((value >> 1) | ((carry as u8) << 7), value & 0x01 != 0),
    }
}

/// Execute one decoded instruction against `cpu` and `bus`
pub fn execute<B: Bus>(
    cpu: &mut Cpu,
    bus: &mut B,
    instruction: &Instruction,
) -> Result<(), CpuError> {
    let info = instruction.info;
    match info.class {
        InstructionClass::Invalid => {
            debug!("invalid opcode ${:02X} treated as no-op", info.opcode);
        }
        InstructionClass::NoOp => {}
        InstructionClass::ForceInterrupt => {
            debug!("force interrupt at ${:04X}", cpu.registers.pc);
            cpu.request_break();
        }
        InstructionClass::Return => {
            cpu.registers.pc = cpu.pull_word(bus)?;
        }

        InstructionClass::TransferAccumulator => {
            let a = cpu.registers.a;
            if let Some(target) = register_mut(cpu, info.operand) {
                *target = a;
            }
            // TAY leaves the flags alone
            if info.operand == Operand::X {
                cpu.status.set_zero_negative(a);
            }
        }
        InstructionClass::Transfer => {
            let value = register(cpu, info.operand);
            cpu.registers.a = value;
            cpu.status.set_zero_negative(value);
        }
        InstructionClass::TransferStack => match info.operand {
            Operand::StackPointer => {
                cpu.registers.x = cpu.registers.sp;
                cpu.status.set_zero_negative(cpu.registers.x);
            }
            _ => cpu.registers.sp = cpu.registers.x,
        },

        InstructionClass::StackPush => {
            let value = match info.operand {
                Operand::ProcessorStatus => cpu.status.bits(),
                _ => cpu.registers.a,
            };
            cpu.push(bus, value)?;
        }
        InstructionClass::StackPull => {
            let value = cpu.pull(bus)?;
            match info.operand {
                Operand::ProcessorStatus => cpu.status = StatusFlags::new(value),
                _ => {
                    cpu.registers.a = value;
                    cpu.status.set_zero_negative(value);
                }
            }
        }

        InstructionClass::SetFlag | InstructionClass::ClearFlag => {
            if let Some(mask) = flag_mask(info.operand) {
                cpu.status.set(mask, info.class == InstructionClass::SetFlag);
            }
        }

        InstructionClass::And
        | InstructionClass::Or
        | InstructionClass::Xor
        | InstructionClass::BitTest
        | InstructionClass::Add
        | InstructionClass::Subtract
        | InstructionClass::Compare => {
            let Some(m) = operand_value(cpu, bus, instruction) else {
                debug!("{} without operand ignored", info.mnemonic());
                return Ok(());
            };
            alu(cpu, info.class, info.operand, m);
        }

        InstructionClass::Increment | InstructionClass::Decrement => {
            let up = info.class == InstructionClass::Increment;
            let step = |value: u8, amount: u8| {
                if up {
                    value.wrapping_add(amount)
                } else {
                    value.wrapping_sub(amount)
                }
            };
            let amount = match info.mode {
                AddressingMode::Immediate => instruction.low,
                _ => 1,
            };
            // No flag effect
            if let Some(target) = register_mut(cpu, info.operand) {
                *target = step(*target, amount);
            } else if let Some(address) = effective_address(cpu, bus, instruction) {
                let value = step(bus.read(address), 1);
                bus.write(address, value);
            } else {
                debug!("{} without target ignored", info.mnemonic());
            }
        }

        InstructionClass::ShiftLeft
        | InstructionClass::ShiftRight
        | InstructionClass::RotateLeft
        | InstructionClass::RotateRight => {
            let carry = cpu.status.carry();
            if info.operand == Operand::Accumulator {
                let (result, out) = shift(info.class, cpu.registers.a, carry);
                cpu.registers.a = result;
                cpu.status.set_carry(out);
            } else if let Some(address) = effective_address(cpu, bus, instruction) {
                let (result, out) = shift(info.class, bus.read(address), carry);
                bus.write(address, result);
                cpu.status.set_carry(out);
            }
        }

        InstructionClass::Load => {
            let Some(value) = operand_value(cpu, bus, instruction) else {
                debug!("{} without operand ignored", info.mnemonic());
                return Ok(());
            };
            if let Some(target) = register_mut(cpu, info.operand) {
                *target = value;
            }
            cpu.status.set_zero_negative(value);
        }
        InstructionClass::Store => match effective_address(cpu, bus, instruction) {
            Some(address) => bus.write(address, register(cpu, info.operand)),
            None => debug!("{} without address ignored", info.mnemonic()),
        },

        InstructionClass::BranchIfClear | InstructionClass::BranchIfSet => {
            let mask = flag_mask(info.operand).unwrap_or(0);
            let flag = cpu.status.bits() & mask != 0;
            if flag == (info.class == InstructionClass::BranchIfSet) {
                branch(cpu, bus, instruction);
            }
        }

        InstructionClass::Jump => {
            if let Some(target) = effective_address(cpu, bus, instruction) {
                cpu.registers.pc = target;
            }
        }
        InstructionClass::JumpToSubroutine => {
            if let Some(target) = effective_address(cpu, bus, instruction) {
                let return_address = cpu.registers.pc;
                cpu.push_word(bus, return_address)?;
                cpu.registers.pc = target;
            }
        }
    }
    Ok(())
}

fn alu(cpu: &mut Cpu, class: InstructionClass, operand: Operand, m: u8) {
    let a = cpu.registers.a;
    match class {
        InstructionClass::And => {
            cpu.registers.a = a & m;
            cpu.status.set_zero_negative(cpu.registers.a);
        }
        InstructionClass::Or => {
            cpu.registers.a = a | m;
            cpu.status.set_zero_negative(cpu.registers.a);
        }
        InstructionClass::Xor => {
            cpu.registers.a = a ^ m;
            cpu.status.set_zero_negative(cpu.registers.a);
        }
        InstructionClass::BitTest => {
            cpu.status.set_zero(a & m == 0);
            cpu.status.set_negative(m & 0x80 != 0);
            cpu.status.set_overflow(m & 0x40 != 0);
        }
        InstructionClass::Add => {
            let (result, flags) = add_with_carry(a, m, cpu.status.carry());
            cpu.registers.a = result;
            merge_flags(cpu, ARITHMETIC_FLAGS, flags);
        }
        InstructionClass::Subtract => {
            let (result, flags) = subtract_with_borrow(a, m, cpu.status.carry());
            cpu.registers.a = result;
            merge_flags(cpu, ARITHMETIC_FLAGS, flags);
        }
        _ => {
            let flags = compare(register(cpu, operand), m);
            merge_flags(cpu, COMPARE_FLAGS, flags);
        }
    }
}

fn branch<B: Bus>(cpu: &mut Cpu, bus: &B, instruction: &Instruction) {
    match instruction.info.mode {
        AddressingMode::Relative => {
            let offset = instruction.low as i8 as i16;
            cpu.registers.pc = cpu.registers.pc.wrapping_add_signed(offset);
        }
        _ => {
            if let Some(target) = effective_address(cpu, bus, instruction) {
                cpu.registers.pc = target;
            }
        }
    }
}
