//! Ricoh 2A03 CPU core (6502 without decimal mode).
//!
//! Executes the official instruction set against any [`CpuBus`]. Cycle timing
//! is not modelled: NSF routines run to completion between audio frames.

use bitflags::bitflags;

use crate::chip::{CallOutcome, CpuState};
use crate::error::CpuFault;

/// Return address pushed before a subroutine call. An RTS landing here ends the call.
pub const RETURN_SENTINEL: u16 = 0x4100;

const STACK_BASE: u16 = 0x0100;
const IRQ_VECTOR: u16 = 0xFFFE;

const JAM_OPCODES: [u8; 12] = [
    0x02, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2,
];

bitflags! {
    /// Processor status register (P).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Carry
        const CARRY = 1 << 0;
        /// Zero
        const ZERO = 1 << 1;
        /// Interrupt disable
        const INTERRUPT_DISABLE = 1 << 2;
        /// Decimal; stored but ignored by the 2A03
        const DECIMAL = 1 << 3;
        /// Set in the pushed copy by BRK/PHP
        const BREAK = 1 << 4;
        /// Always reads as 1
        const UNUSED = 1 << 5;
        /// Overflow
        const OVERFLOW = 1 << 6;
        /// Negative
        const NEGATIVE = 1 << 7;
    }
}

/// Memory seen by the CPU.
pub trait CpuBus {
    /// Read one byte. Reads may have side effects (e.g. APU status).
    fn read(&mut self, address: u16) -> u8;
    /// Write one byte.
    fn write(&mut self, address: u16, value: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    IndirectX,
    IndirectY,
}

/// Addressing mode of the `cc = 01` group (ORA, AND, EOR, ADC, STA, LDA, CMP, SBC).
fn alu_mode(opcode: u8) -> Mode {
    match (opcode >> 2) & 7 {
        0 => Mode::IndirectX,
        1 => Mode::ZeroPage,
        2 => Mode::Immediate,
        3 => Mode::Absolute,
        4 => Mode::IndirectY,
        5 => Mode::ZeroPageX,
        6 => Mode::AbsoluteY,
        _ => Mode::AbsoluteX,
    }
}

/// Addressing mode of the `cc = 00` and `cc = 10` groups. LDX/STX index with Y.
fn misc_mode(opcode: u8, index_y: bool) -> Mode {
    match (opcode >> 2) & 7 {
        0 => Mode::Immediate,
        1 => Mode::ZeroPage,
        2 => Mode::Accumulator,
        3 => Mode::Absolute,
        5 if index_y => Mode::ZeroPageY,
        5 => Mode::ZeroPageX,
        7 if index_y => Mode::AbsoluteY,
        _ => Mode::AbsoluteX,
    }
}

/// 6502 register file plus execution.
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    regs: CpuState,
}

impl Cpu {
    /// CPU in power-on state.
    pub fn new() -> Self {
        let mut cpu = Self::default();
        cpu.reset();
        cpu
    }

    /// Power-on register values.
    pub fn reset(&mut self) {
        self.regs = CpuState {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            status: (Status::INTERRUPT_DISABLE | Status::UNUSED).bits(),
        };
    }

    /// Register file.
    pub fn state(&self) -> &CpuState {
        &self.regs
    }

    /// Mutable register file.
    pub fn state_mut(&mut self) -> &mut CpuState {
        &mut self.regs
    }

    /// Processor status as flags.
    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.regs.status)
    }

    /// Call the routine at `address` and run until it returns or `budget`
    /// instructions have executed.
    pub fn call_subroutine<B: CpuBus>(
        &mut self,
        bus: &mut B,
        address: u16,
        budget: u32,
    ) -> CallOutcome {
        self.push_word(bus, RETURN_SENTINEL.wrapping_sub(1));
        self.regs.pc = address;
        for executed in 1..=budget {
            if let Err(fault) = self.step(bus) {
                return CallOutcome::Fault(fault);
            }
            if self.regs.pc == RETURN_SENTINEL {
                return CallOutcome::Returned {
                    instructions: executed,
                };
            }
        }
        CallOutcome::BudgetExhausted
    }

    /// Execute one instruction.
    pub fn step<B: CpuBus>(&mut self, bus: &mut B) -> Result<(), CpuFault> {
        let pc = self.regs.pc;
        let opcode = self.fetch_byte(bus);
        match opcode {
            // Loads and stores
            0xA1 | 0xA5 | 0xA9 | 0xAD | 0xB1 | 0xB5 | 0xB9 | 0xBD => {
                self.regs.a = self.read_operand(bus, alu_mode(opcode));
                self.update_zero_and_negative_flags(self.regs.a);
            }
            0xA2 | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                self.regs.x = self.read_operand(bus, misc_mode(opcode, true));
                self.update_zero_and_negative_flags(self.regs.x);
            }
            0xA0 | 0xA4 | 0xAC | 0xB4 | 0xBC => {
                self.regs.y = self.read_operand(bus, misc_mode(opcode, false));
                self.update_zero_and_negative_flags(self.regs.y);
            }
            0x81 | 0x85 | 0x8D | 0x91 | 0x95 | 0x99 | 0x9D => {
                let addr = self.operand_address(bus, alu_mode(opcode));
                bus.write(addr, self.regs.a);
            }
            0x86 | 0x8E | 0x96 => {
                let addr = self.operand_address(bus, misc_mode(opcode, true));
                bus.write(addr, self.regs.x);
            }
            0x84 | 0x8C | 0x94 => {
                let addr = self.operand_address(bus, misc_mode(opcode, false));
                bus.write(addr, self.regs.y);
            }

            // Arithmetic and logic
            0x01 | 0x05 | 0x09 | 0x0D | 0x11 | 0x15 | 0x19 | 0x1D => {
                self.regs.a |= self.read_operand(bus, alu_mode(opcode));
                self.update_zero_and_negative_flags(self.regs.a);
            }
            0x21 | 0x25 | 0x29 | 0x2D | 0x31 | 0x35 | 0x39 | 0x3D => {
                self.regs.a &= self.read_operand(bus, alu_mode(opcode));
                self.update_zero_and_negative_flags(self.regs.a);
            }
            0x41 | 0x45 | 0x49 | 0x4D | 0x51 | 0x55 | 0x59 | 0x5D => {
                self.regs.a ^= self.read_operand(bus, alu_mode(opcode));
                self.update_zero_and_negative_flags(self.regs.a);
            }
            0x61 | 0x65 | 0x69 | 0x6D | 0x71 | 0x75 | 0x79 | 0x7D => {
                let value = self.read_operand(bus, alu_mode(opcode));
                self.add_with_carry(value);
            }
            0xE1 | 0xE5 | 0xE9 | 0xED | 0xF1 | 0xF5 | 0xF9 | 0xFD => {
                let value = self.read_operand(bus, alu_mode(opcode));
                self.add_with_carry(!value);
            }
            0xC1 | 0xC5 | 0xC9 | 0xCD | 0xD1 | 0xD5 | 0xD9 | 0xDD => {
                let value = self.read_operand(bus, alu_mode(opcode));
                self.compare(self.regs.a, value);
            }
            0xE0 | 0xE4 | 0xEC => {
                let value = self.read_operand(bus, misc_mode(opcode, false));
                self.compare(self.regs.x, value);
            }
            0xC0 | 0xC4 | 0xCC => {
                let value = self.read_operand(bus, misc_mode(opcode, false));
                self.compare(self.regs.y, value);
            }
            0x24 | 0x2C => {
                let value = self.read_operand(bus, misc_mode(opcode, false));
                self.set_flag(Status::ZERO, self.regs.a & value == 0);
                self.set_flag(Status::OVERFLOW, value & 0x40 != 0);
                self.set_flag(Status::NEGATIVE, value & 0x80 != 0);
            }

            // Read-modify-write
            0x06 | 0x0A | 0x0E | 0x16 | 0x1E => self.modify(bus, misc_mode(opcode, false), |cpu, v| {
                cpu.set_flag(Status::CARRY, v & 0x80 != 0);
                v << 1
            }),
            0x46 | 0x4A | 0x4E | 0x56 | 0x5E => self.modify(bus, misc_mode(opcode, false), |cpu, v| {
                cpu.set_flag(Status::CARRY, v & 0x01 != 0);
                v >> 1
            }),
            0x26 | 0x2A | 0x2E | 0x36 | 0x3E => self.modify(bus, misc_mode(opcode, false), |cpu, v| {
                let carry_in = cpu.status().contains(Status::CARRY) as u8;
                cpu.set_flag(Status::CARRY, v & 0x80 != 0);
                (v << 1) | carry_in
            }),
            0x66 | 0x6A | 0x6E | 0x76 | 0x7E => self.modify(bus, misc_mode(opcode, false), |cpu, v| {
                let carry_in = (cpu.status().contains(Status::CARRY) as u8) << 7;
                cpu.set_flag(Status::CARRY, v & 0x01 != 0);
                (v >> 1) | carry_in
            }),
            0xC6 | 0xCE | 0xD6 | 0xDE => {
                self.modify(bus, misc_mode(opcode, false), |_, v| v.wrapping_sub(1))
            }
            0xE6 | 0xEE | 0xF6 | 0xFE => {
                self.modify(bus, misc_mode(opcode, false), |_, v| v.wrapping_add(1))
            }

            // Register transfers and increments
            0xAA => {
                self.regs.x = self.regs.a;
                self.update_zero_and_negative_flags(self.regs.x);
            }
            0xA8 => {
                self.regs.y = self.regs.a;
                self.update_zero_and_negative_flags(self.regs.y);
            }
            0xBA => {
                self.regs.x = self.regs.sp;
                self.update_zero_and_negative_flags(self.regs.x);
            }
            0x8A => {
                self.regs.a = self.regs.x;
                self.update_zero_and_negative_flags(self.regs.a);
            }
            0x9A => self.regs.sp = self.regs.x,
            0x98 => {
                self.regs.a = self.regs.y;
                self.update_zero_and_negative_flags(self.regs.a);
            }
            0xE8 => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.update_zero_and_negative_flags(self.regs.x);
            }
            0xC8 => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.update_zero_and_negative_flags(self.regs.y);
            }
            0xCA => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.update_zero_and_negative_flags(self.regs.x);
            }
            0x88 => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.update_zero_and_negative_flags(self.regs.y);
            }

            // Stack
            0x48 => self.push(bus, self.regs.a),
            0x08 => {
                let pushed = self.status() | Status::BREAK | Status::UNUSED;
                self.push(bus, pushed.bits());
            }
            0x68 => {
                self.regs.a = self.pop(bus);
                self.update_zero_and_negative_flags(self.regs.a);
            }
            0x28 => {
                let value = self.pop(bus);
                self.restore_status(value);
            }

            // Flags
            0x18 => self.set_flag(Status::CARRY, false),
            0x38 => self.set_flag(Status::CARRY, true),
            0x58 => self.set_flag(Status::INTERRUPT_DISABLE, false),
            0x78 => self.set_flag(Status::INTERRUPT_DISABLE, true),
            0xB8 => self.set_flag(Status::OVERFLOW, false),
            0xD8 => self.set_flag(Status::DECIMAL, false),
            0xF8 => self.set_flag(Status::DECIMAL, true),

            // Branches
            0x10 => self.branch(bus, !self.status().contains(Status::NEGATIVE)),
            0x30 => self.branch(bus, self.status().contains(Status::NEGATIVE)),
            0x50 => self.branch(bus, !self.status().contains(Status::OVERFLOW)),
            0x70 => self.branch(bus, self.status().contains(Status::OVERFLOW)),
            0x90 => self.branch(bus, !self.status().contains(Status::CARRY)),
            0xB0 => self.branch(bus, self.status().contains(Status::CARRY)),
            0xD0 => self.branch(bus, !self.status().contains(Status::ZERO)),
            0xF0 => self.branch(bus, self.status().contains(Status::ZERO)),

            // Jumps and calls
            0x4C => self.regs.pc = self.fetch_word(bus),
            0x6C => {
                let pointer = self.fetch_word(bus);
                // Page wrap bug: the high byte never crosses a page.
                let hi_addr = (pointer & 0xFF00) | (pointer.wrapping_add(1) & 0x00FF);
                let lo = bus.read(pointer) as u16;
                let hi = bus.read(hi_addr) as u16;
                self.regs.pc = (hi << 8) | lo;
            }
            0x20 => {
                let target = self.fetch_word(bus);
                self.push_word(bus, self.regs.pc.wrapping_sub(1));
                self.regs.pc = target;
            }
            0x60 => self.regs.pc = self.pop_word(bus).wrapping_add(1),
            0x40 => {
                let value = self.pop(bus);
                self.restore_status(value);
                self.regs.pc = self.pop_word(bus);
            }
            0x00 => {
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.push_word(bus, self.regs.pc);
                let pushed = self.status() | Status::BREAK | Status::UNUSED;
                self.push(bus, pushed.bits());
                self.set_flag(Status::INTERRUPT_DISABLE, true);
                let lo = bus.read(IRQ_VECTOR) as u16;
                let hi = bus.read(IRQ_VECTOR.wrapping_add(1)) as u16;
                self.regs.pc = (hi << 8) | lo;
            }
            0xEA => {}

            op if JAM_OPCODES.contains(&op) => {
                self.regs.pc = pc;
                return Err(CpuFault::Jammed { pc });
            }
            op => {
                self.regs.pc = pc;
                return Err(CpuFault::IllegalOpcode { opcode: op, pc });
            }
        }
        Ok(())
    }

    fn fetch_byte<B: CpuBus>(&mut self, bus: &mut B) -> u8 {
        let byte = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        byte
    }

    fn fetch_word<B: CpuBus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus) as u16;
        let hi = self.fetch_byte(bus) as u16;
        (hi << 8) | lo
    }

    fn zero_page_word<B: CpuBus>(bus: &mut B, zp: u8) -> u16 {
        let lo = bus.read(zp as u16) as u16;
        let hi = bus.read(zp.wrapping_add(1) as u16) as u16;
        (hi << 8) | lo
    }

    fn operand_address<B: CpuBus>(&mut self, bus: &mut B, mode: Mode) -> u16 {
        match mode {
            Mode::Immediate => {
                let addr = self.regs.pc;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                addr
            }
            Mode::ZeroPage => self.fetch_byte(bus) as u16,
            Mode::ZeroPageX => self.fetch_byte(bus).wrapping_add(self.regs.x) as u16,
            Mode::ZeroPageY => self.fetch_byte(bus).wrapping_add(self.regs.y) as u16,
            Mode::Absolute => self.fetch_word(bus),
            Mode::AbsoluteX => self.fetch_word(bus).wrapping_add(self.regs.x as u16),
            Mode::AbsoluteY => self.fetch_word(bus).wrapping_add(self.regs.y as u16),
            Mode::IndirectX => {
                let zp = self.fetch_byte(bus).wrapping_add(self.regs.x);
                Self::zero_page_word(bus, zp)
            }
            Mode::IndirectY => {
                let zp = self.fetch_byte(bus);
                Self::zero_page_word(bus, zp).wrapping_add(self.regs.y as u16)
            }
            // Callers handle the accumulator before resolving an address.
            Mode::Accumulator => 0,
        }
    }

    fn read_operand<B: CpuBus>(&mut self, bus: &mut B, mode: Mode) -> u8 {
        let addr = self.operand_address(bus, mode);
        bus.read(addr)
    }

    fn modify<B: CpuBus>(&mut self, bus: &mut B, mode: Mode, op: impl FnOnce(&mut Self, u8) -> u8) {
        let result = if mode == Mode::Accumulator {
            let value = self.regs.a;
            let result = op(self, value);
            self.regs.a = result;
            result
        } else {
            let addr = self.operand_address(bus, mode);
            let value = bus.read(addr);
            let result = op(self, value);
            bus.write(addr, result);
            result
        };
        self.update_zero_and_negative_flags(result);
    }

    fn add_with_carry(&mut self, value: u8) {
        let a = self.regs.a;
        let carry = self.status().contains(Status::CARRY) as u16;
        let sum = a as u16 + value as u16 + carry;
        let result = sum as u8;
        self.set_flag(Status::CARRY, sum > 0xFF);
        self.set_flag(Status::OVERFLOW, (!(a ^ value) & (a ^ result) & 0x80) != 0);
        self.regs.a = result;
        self.update_zero_and_negative_flags(result);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.set_flag(Status::CARRY, register >= value);
        self.update_zero_and_negative_flags(register.wrapping_sub(value));
    }

    fn branch<B: CpuBus>(&mut self, bus: &mut B, condition: bool) {
        let offset = self.fetch_byte(bus) as i8;
        if condition {
            self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
        }
    }

    fn restore_status(&mut self, value: u8) {
        let status = (Status::from_bits_retain(value) - Status::BREAK) | Status::UNUSED;
        self.regs.status = status.bits();
    }

    fn set_flag(&mut self, flag: Status, on: bool) {
        let mut status = self.status();
        status.set(flag, on);
        self.regs.status = status.bits();
    }

    fn update_zero_and_negative_flags(&mut self, value: u8) {
        self.set_flag(Status::ZERO, value == 0);
        self.set_flag(Status::NEGATIVE, value & 0x80 != 0);
    }

    fn push<B: CpuBus>(&mut self, bus: &mut B, value: u8) {
        bus.write(STACK_BASE | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    fn pop<B: CpuBus>(&mut self, bus: &mut B) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        bus.read(STACK_BASE | self.regs.sp as u16)
    }

    fn push_word<B: CpuBus>(&mut self, bus: &mut B, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_word<B: CpuBus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatBus {
        mem: Vec<u8>,
    }

    impl FlatBus {
        fn with_program(origin: u16, program: &[u8]) -> Self {
            let mut mem = vec![0; 0x10000];
            mem[origin as usize..origin as usize + program.len()].copy_from_slice(program);
            Self { mem }
        }
    }

    impl CpuBus for FlatBus {
        fn read(&mut self, address: u16) -> u8 {
            self.mem[address as usize]
        }
        fn write(&mut self, address: u16, value: u8) {
            self.mem[address as usize] = value;
        }
    }

    fn run(program: &[u8]) -> (Cpu, FlatBus, CallOutcome) {
        let mut bus = FlatBus::with_program(0x8000, program);
        let mut cpu = Cpu::new();
        let outcome = cpu.call_subroutine(&mut bus, 0x8000, 1000);
        (cpu, bus, outcome)
    }

    #[test]
    fn rts_returns_to_sentinel() {
        let (cpu, _, outcome) = run(&[0x60]);
        assert_eq!(outcome, CallOutcome::Returned { instructions: 1 });
        assert_eq!(cpu.state().sp, 0xFD);
    }

    #[test]
    fn lda_sta_and_flags() {
        // LDA #$80; STA $10; LDA #$00; RTS
        let (cpu, bus, outcome) = run(&[0xA9, 0x80, 0x85, 0x10, 0xA9, 0x00, 0x60]);
        assert_eq!(outcome, CallOutcome::Returned { instructions: 4 });
        assert_eq!(bus.mem[0x10], 0x80);
        assert!(cpu.status().contains(Status::ZERO));
        assert!(!cpu.status().contains(Status::NEGATIVE));
    }

    #[test]
    fn adc_sets_carry_and_overflow() {
        // CLC; LDA #$7F; ADC #$01; RTS
        let (cpu, _, _) = run(&[0x18, 0xA9, 0x7F, 0x69, 0x01, 0x60]);
        assert_eq!(cpu.state().a, 0x80);
        assert!(cpu.status().contains(Status::OVERFLOW));
        assert!(!cpu.status().contains(Status::CARRY));

        // SEC; LDA #$00; SBC #$01; RTS
        let (cpu, _, _) = run(&[0x38, 0xA9, 0x00, 0xE9, 0x01, 0x60]);
        assert_eq!(cpu.state().a, 0xFF);
        assert!(!cpu.status().contains(Status::CARRY));
    }

    #[test]
    fn nested_jsr_and_loop() {
        // LDX #$03; loop: JSR sub; DEX; BNE loop; RTS; sub: INY; RTS
        let program = [0xA2, 0x03, 0x20, 0x09, 0x80, 0xCA, 0xD0, 0xFA, 0x60, 0xC8, 0x60];
        let (cpu, _, outcome) = run(&program);
        assert!(matches!(outcome, CallOutcome::Returned { .. }));
        assert_eq!(cpu.state().y, 3);
        assert_eq!(cpu.state().x, 0);
    }

    #[test]
    fn indirect_indexed_addressing() {
        // LDY #$02; LDA ($20),Y; RTS with $20/$21 -> $0300
        let mut bus = FlatBus::with_program(0x8000, &[0xA0, 0x02, 0xB1, 0x20, 0x60]);
        bus.mem[0x20] = 0x00;
        bus.mem[0x21] = 0x03;
        bus.mem[0x302] = 0x5A;
        let mut cpu = Cpu::new();
        cpu.call_subroutine(&mut bus, 0x8000, 100);
        assert_eq!(cpu.state().a, 0x5A);
    }

    #[test]
    fn infinite_loop_exhausts_budget() {
        // JMP $8000
        let mut bus = FlatBus::with_program(0x8000, &[0x4C, 0x00, 0x80]);
        let mut cpu = Cpu::new();
        assert_eq!(
            cpu.call_subroutine(&mut bus, 0x8000, 50),
            CallOutcome::BudgetExhausted
        );
    }

    #[test]
    fn illegal_and_jam_opcodes_fault() {
        let (_, _, outcome) = run(&[0xEA, 0x03]);
        assert_eq!(
            outcome,
            CallOutcome::Fault(CpuFault::IllegalOpcode {
                opcode: 0x03,
                pc: 0x8001
            })
        );
        let (_, _, outcome) = run(&[0x02]);
        assert_eq!(outcome, CallOutcome::Fault(CpuFault::Jammed { pc: 0x8000 }));
    }

    #[test]
    fn rotate_through_carry() {
        // SEC; LDA #$80; ROL A; RTS -> A = 1, C = 1
        let (cpu, _, _) = run(&[0x38, 0xA9, 0x80, 0x2A, 0x60]);
        assert_eq!(cpu.state().a, 0x01);
        assert!(cpu.status().contains(Status::CARRY));
    }
}
