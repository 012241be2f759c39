//! CPU tests for the INDY-3 core

use kvm_core::cpu::{Cpu, CpuError, StatusFlags};
use kvm_core::execute::{add_with_carry, compare, subtract_with_borrow};
use kvm_core::memory::Memory;
use proptest::prelude::*;

/// Load `program` at $E000 and run `cycles` instructions
fn run(program: &[u8], cycles: usize) -> (Cpu, Memory) {
    let mut mem = Memory::new(0x10000).unwrap();
    assert!(mem.copy_from(0xE000, program));
    let mut cpu = Cpu::new();
    for _ in 0..cycles {
        cpu.cycle(&mut mem).unwrap();
    }
    (cpu, mem)
}

#[test]
fn test_cpu_reset() {
    let mut cpu = Cpu::new();
    cpu.reset();

    assert_eq!(cpu.registers().a, 0);
    assert_eq!(cpu.registers().x, 0);
    assert_eq!(cpu.registers().y, 0);
    assert_eq!(cpu.registers().sp, 0xFF);
    assert_eq!(cpu.registers().pc, 0xE000);
}

#[test]
fn test_load_sets_zero_negative() {
    let (cpu, _) = run(&[0xD0, 0x00], 1);
    assert!(cpu.status().zero());
    assert!(!cpu.status().negative());

    let (cpu, _) = run(&[0xD0, 0x80], 1);
    assert!(!cpu.status().zero());
    assert!(cpu.status().negative());
}

#[test]
fn test_load_index_registers() {
    // LDX #$11, LDY #$22
    let (cpu, _) = run(&[0xD1, 0x11, 0xD2, 0x22], 2);
    assert_eq!(cpu.registers().x, 0x11);
    assert_eq!(cpu.registers().y, 0x22);
}

#[test]
fn test_adc_wraps() {
    // LDA #$FF, ADC #$01
    let (cpu, _) = run(&[0xD0, 0xFF, 0xC4, 0x01], 2);
    assert_eq!(cpu.registers().a, 0x00);
    assert!(cpu.status().carry());
    assert!(cpu.status().zero());
    assert!(!cpu.status().overflow());
    assert!(!cpu.status().negative());
}

#[test]
fn test_sbc_with_carry_set() {
    // SEC, LDA #$05, SBC #$03
    let (cpu, _) = run(&[0x0E, 0xD0, 0x05, 0xC5, 0x03], 3);
    assert_eq!(cpu.registers().a, 0x02);
    assert!(cpu.status().carry());
}

#[test]
fn test_compare() {
    // LDA #5, CMP #5
    let (cpu, _) = run(&[0xD0, 0x05, 0xC6, 0x05], 2);
    assert!(cpu.status().carry());
    assert!(cpu.status().zero());
    assert!(!cpu.status().negative());

    // LDA #3, CMP #5
    let (cpu, _) = run(&[0xD0, 0x03, 0xC6, 0x05], 2);
    assert!(!cpu.status().carry());
    assert!(!cpu.status().zero());
    assert!(cpu.status().negative());
}

#[test]
fn test_logic_and_bit() {
    // LDA #$F0, AND #$3C, ORA #$01, XOR #$FF
    let (cpu, _) = run(&[0xD0, 0xF0, 0xC0, 0x3C, 0xC1, 0x01, 0xC2, 0xFF], 4);
    assert_eq!(cpu.registers().a, !0x31);

    // LDA #$01, BIT #$C0
    let (cpu, _) = run(&[0xD0, 0x01, 0xC3, 0xC0], 2);
    assert_eq!(cpu.registers().a, 0x01);
    assert!(cpu.status().zero());
    assert!(cpu.status().negative());
    assert!(cpu.status().overflow());
}

#[test]
fn test_push_pull_accumulator() {
    // LDA #$80, PHA, LDA #$00, PLA
    let (cpu, _) = run(&[0xD0, 0x80, 0x0A, 0xD0, 0x00, 0x0B], 4);
    assert_eq!(cpu.registers().a, 0x80);
    assert!(cpu.status().negative());
    assert!(!cpu.status().zero());
    assert_eq!(cpu.registers().sp, 0xFF);
}

#[test]
fn test_push_pull_status() {
    // SEC, PHP, CLC, PLP
    let (cpu, _) = run(&[0x0E, 0x0C, 0x0F, 0x0D], 4);
    assert!(cpu.status().carry());
}

#[test]
fn test_jsr_rts() {
    let mut program = vec![0u8; 0x20];
    // $E000: JSR $E010 ; LDA #$42
    program[..5].copy_from_slice(&[0xEB, 0x10, 0xE0, 0xD0, 0x42]);
    // $E010: LDX #$07 ; RTS
    program[0x10..0x13].copy_from_slice(&[0xD1, 0x07, 0x02]);

    let (cpu, mem) = run(&program, 1);
    assert_eq!(cpu.registers().pc, 0xE010);
    assert_eq!(cpu.registers().sp, 0xFD);
    // Return address is the instruction after JSR, high byte pushed first
    assert_eq!(mem.read(0x01FF), 0xE0);
    assert_eq!(mem.read(0x01FE), 0x03);

    let (cpu, _) = run(&program, 4);
    assert_eq!(cpu.registers().x, 0x07);
    assert_eq!(cpu.registers().a, 0x42);
    assert_eq!(cpu.registers().sp, 0xFF);
    assert_eq!(cpu.registers().pc, 0xE005);
}

#[test]
fn test_rti_shares_return_path() {
    let mut program = vec![0u8; 0x20];
    program[..3].copy_from_slice(&[0xEB, 0x10, 0xE0]);
    // SEC ; RTI
    program[0x10..0x12].copy_from_slice(&[0x0E, 0x03]);
    let (cpu, _) = run(&program, 3);
    assert_eq!(cpu.registers().pc, 0xE003);
    // Status is not restored
    assert!(cpu.status().carry());
}

#[test]
fn test_countdown_loop() {
    // LDX #3 ; loop: INY ; DEX ; CPX #0 ; BNE loop
    let program = [0xD1, 0x03, 0x29, 0x2A, 0xC7, 0x00, 0xDA, 0xFA];
    let (cpu, _) = run(&program, 1 + 3 * 4);
    assert_eq!(cpu.registers().x, 0);
    assert_eq!(cpu.registers().y, 3);
    assert!(cpu.status().zero());
    assert_eq!(cpu.registers().pc, 0xE008);
}

#[test]
fn test_increment_decrement_leave_flags() {
    // LDX #1 ; DEX
    let (cpu, _) = run(&[0xD1, 0x01, 0x2A], 2);
    assert_eq!(cpu.registers().x, 0);
    assert!(!cpu.status().zero());

    // LDY #$7F ; INY
    let (cpu, _) = run(&[0xD2, 0x7F, 0x29], 2);
    assert_eq!(cpu.registers().y, 0x80);
    assert!(!cpu.status().negative());

    // LDA #1 ; INC $30 (memory $30 = $FF wraps to 0)
    let mut mem = Memory::new(0x10000).unwrap();
    mem.write(0x30, 0xFF);
    mem.copy_from(0xE000, &[0xD0, 0x01, 0x48, 0x30]);
    let mut cpu = Cpu::new();
    cpu.cycle(&mut mem).unwrap();
    cpu.cycle(&mut mem).unwrap();
    assert_eq!(mem.read(0x30), 0x00);
    assert!(!cpu.status().zero());
}

#[test]
fn test_invalid_opcodes_only_advance_pc() {
    // $BB (3 bytes) then $17 (1 byte), neither has an operation
    let mut mem = Memory::new(0x10000).unwrap();
    mem.copy_from(0xE000, &[0xBB, 0x34, 0x12, 0x17]);
    mem.write(0x1234, 0x99);
    let mut cpu = Cpu::new();
    cpu.registers.a = 0x11;
    cpu.registers.x = 0x22;
    cpu.registers.y = 0x33;
    cpu.status = StatusFlags::new(StatusFlags::CARRY | StatusFlags::NEGATIVE);
    let memory_before = mem.as_slice().to_vec();
    let expected = cpu.registers;

    cpu.cycle(&mut mem).unwrap();
    assert_eq!(cpu.registers.pc, 0xE003);
    cpu.cycle(&mut mem).unwrap();
    assert_eq!(cpu.registers.pc, 0xE004);

    assert_eq!(cpu.registers.a, expected.a);
    assert_eq!(cpu.registers.x, expected.x);
    assert_eq!(cpu.registers.y, expected.y);
    assert_eq!(cpu.registers.sp, expected.sp);
    assert_eq!(cpu.status.bits(), StatusFlags::CARRY | StatusFlags::NEGATIVE);
    assert_eq!(mem.as_slice(), &memory_before[..]);
}

#[test]
fn test_absolute_branch() {
    // SEC ; BCS $E010
    let (cpu, _) = run(&[0x0E, 0xF9, 0x10, 0xE0], 2);
    assert_eq!(cpu.registers().pc, 0xE010);

    // CLC ; BCS $E010 not taken
    let (cpu, _) = run(&[0x0F, 0xF9, 0x10, 0xE0], 2);
    assert_eq!(cpu.registers().pc, 0xE004);
}

#[test]
fn test_jump_indirect() {
    let mut mem = Memory::new(0x10000).unwrap();
    mem.copy_from(0xE000, &[0x89, 0x00, 0x20]);
    mem.write_u16(0x2000, 0xE123);
    let mut cpu = Cpu::new();
    cpu.cycle(&mut mem).unwrap();
    assert_eq!(cpu.registers().pc, 0xE123);
}

#[test]
fn test_indexed_addressing() {
    let mut mem = Memory::new(0x10000).unwrap();
    mem.write(0x0015, 0xAA);
    mem.write(0x3005, 0xBB);
    // Pointer table for the indirect modes
    mem.write_u16(0x0044, 0x4000);
    mem.write(0x4000, 0xCC);
    mem.write(0x4002, 0xDD);
    mem.copy_from(
        0xE000,
        &[
            0xD1, 0x05, // LDX #5
            0xD2, 0x02, // LDY #2
            0x70, 0x10, // LDA $10,x
            0x54, 0x20, // STA $20
            0x93, 0x03, 0x30, // LDA $3003,y
            0x54, 0x21, // STA $21
            0xA3, 0x3F, 0x00, // LDA ($003F x)
            0x54, 0x22, // STA $22
            0xAB, 0x44, 0x00, // LDA ($0044 y)
            0x54, 0x23, // STA $23
        ],
    );
    let mut cpu = Cpu::new();
    for _ in 0..10 {
        cpu.cycle(&mut mem).unwrap();
    }
    assert_eq!(mem.read(0x20), 0xAA);
    assert_eq!(mem.read(0x21), 0xBB);
    assert_eq!(mem.read(0x22), 0xCC);
    assert_eq!(mem.read(0x23), 0xDD);
}

#[test]
fn test_zero_page_x_wraps() {
    let mut mem = Memory::new(0x10000).unwrap();
    mem.write(0x0004, 0x77);
    // LDX #$10 ; LDA $F4,x
    mem.copy_from(0xE000, &[0xD1, 0x10, 0x70, 0xF4]);
    let mut cpu = Cpu::new();
    cpu.cycle(&mut mem).unwrap();
    cpu.cycle(&mut mem).unwrap();
    assert_eq!(cpu.registers().a, 0x77);
}

#[test]
fn test_memory_increment_and_shift() {
    let mut mem = Memory::new(0x10000).unwrap();
    mem.write(0x0030, 0x41);
    // INC $30 ; SHL $30
    mem.copy_from(0xE000, &[0x48, 0x30, 0x4C, 0x30]);
    let mut cpu = Cpu::new();
    cpu.cycle(&mut mem).unwrap();
    assert_eq!(mem.read(0x30), 0x42);
    cpu.cycle(&mut mem).unwrap();
    assert_eq!(mem.read(0x30), 0x84);
    assert!(!cpu.status().carry());
}

#[test]
fn test_immediate_increment_adds_literal() {
    // INX #5 ; DEY #2
    let (cpu, _) = run(&[0xC8, 0x05, 0xCB, 0x02], 2);
    assert_eq!(cpu.registers().x, 5);
    assert_eq!(cpu.registers().y, 0xFE);
}

#[test]
fn test_accumulator_rotate() {
    // LDA #$01 ; SEC ; ROR
    let (cpu, _) = run(&[0xD0, 0x01, 0x0E, 0x2F], 3);
    assert_eq!(cpu.registers().a, 0x80);
    assert!(cpu.status().carry());
}

#[test]
fn test_transfers() {
    // LDA #$80 ; TAX ; LDA #0 ; TXA
    let (cpu, _) = run(&[0xD0, 0x80, 0x04, 0xD0, 0x00, 0x06], 4);
    assert_eq!(cpu.registers().x, 0x80);
    assert_eq!(cpu.registers().a, 0x80);
    assert!(cpu.status().negative());

    // LDX #0 ; TXS: SP takes X without touching flags
    let (cpu, _) = run(&[0xD1, 0x00, 0x0E, 0x09], 3);
    assert_eq!(cpu.registers().sp, 0x00);
    assert!(cpu.status().zero());
    assert!(cpu.status().carry());

    // LDA #0 ; LDX #1 ; TAY: Y takes A, flags still from LDX
    let (cpu, _) = run(&[0xD0, 0x00, 0xD1, 0x01, 0x05], 3);
    assert_eq!(cpu.registers().y, 0x00);
    assert!(!cpu.status().zero());

    // TSX
    let (cpu, _) = run(&[0x08], 1);
    assert_eq!(cpu.registers().x, 0xFF);
    assert!(cpu.status().negative());
}

#[test]
fn test_set_flag_does_not_clear() {
    let (cpu, _) = run(&[0x0E], 1);
    assert!(cpu.status().carry());
}

#[test]
fn test_clear_overflow() {
    // LDA #$7F ; ADC #$01 ; CLV
    let (cpu, _) = run(&[0xD0, 0x7F, 0xC4, 0x01, 0x10], 3);
    assert!(!cpu.status().overflow());
    assert!(cpu.status().negative());
}

#[test]
fn test_force_interrupt_is_pollable() {
    let (mut cpu, mem) = run(&[0x01], 1);
    assert!(cpu.take_break());
    assert!(!cpu.take_break());
    // No stack push
    assert_eq!(cpu.registers().sp, 0xFF);
    assert_eq!(mem.read(0x01FF), 0);
}

#[test]
fn test_store_immediate_is_noop() {
    // LDA #$12 ; STA #$34
    let (cpu, mem) = run(&[0xD0, 0x12, 0xD4, 0x34], 2);
    assert_eq!(cpu.registers().pc, 0xE004);
    assert_eq!(mem.read(0x34), 0);
}

#[test]
fn test_stack_underflow_reported() {
    let mut mem = Memory::new(0x10000).unwrap();
    mem.copy_from(0xE000, &[0x0B]);
    let mut cpu = Cpu::new();
    assert_eq!(cpu.cycle(&mut mem), Err(CpuError::StackUnderflow { sp: 0xFF }));
}

#[test]
fn test_status_flags() {
    let mut flags = StatusFlags::new(0xFF);
    assert!(flags.carry());
    assert!(flags.zero());
    assert!(flags.interrupt());
    assert!(flags.overflow());
    assert!(flags.negative());

    flags.set_carry(false);
    assert!(!flags.carry());

    flags.set_overflow(false);
    assert!(!flags.overflow());
}

proptest! {
    #[test]
    fn add_then_subtract_round_trips(a: u8, m: u8) {
        let (sum, _) = add_with_carry(a, m, false);
        let (back, _) = subtract_with_borrow(sum, m, true);
        prop_assert_eq!(back, a);
    }

    #[test]
    fn add_carry_set_when_result_below_a(a: u8, m: u8, c: bool) {
        let (result, flags) = add_with_carry(a, m, c);
        let wide = a as u16 + m as u16 + c as u16;
        prop_assert_eq!(result, wide as u8);
        prop_assert_eq!(flags.carry(), result < a);
        prop_assert_eq!(flags.zero(), result == 0);
        // Only a + $FF + 1 differs from a 9-bit carry
        if !(m == 0xFF && c) {
            prop_assert_eq!(flags.carry(), wide > 0xFF);
        }
    }

    #[test]
    fn subtract_carry_set_when_result_not_above_a(a: u8, m: u8, c: bool) {
        let (result, flags) = subtract_with_borrow(a, m, c);
        prop_assert_eq!(result, a.wrapping_sub(m).wrapping_sub(!c as u8));
        prop_assert_eq!(flags.carry(), result <= a);
    }

    #[test]
    fn compare_agrees_with_ordering(r: u8, m: u8) {
        let flags = compare(r, m);
        prop_assert_eq!(flags.carry(), r >= m);
        prop_assert_eq!(flags.zero(), r == m);
    }
}
