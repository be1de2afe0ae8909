//! NES 2A03: 6502 CPU plus APU.
//!
//! Used two ways: as a plain register-write chip for VGM streams (command
//! 0xB4), and as a [`SubroutineChip`] that runs NSF init/play routines.

pub mod apu;
pub mod bus;
pub mod cpu;

pub use apu::Apu;
pub use bus::NsfBus;
pub use cpu::{Cpu, CpuBus, Status, RETURN_SENTINEL};

use log::{debug, trace};

use super::{CallOutcome, CpuState, SoundChip, StereoSample, SubroutineChip};
use crate::config::{CHIP_SAMPLE_RATE, DEFAULT_VOLUME};

/// NTSC CPU clock in Hz.
pub const NTSC_CPU_CLOCK: u32 = 1_789_773;

/// VGM data block type carrying NES APU RAM contents.
pub const DATA_BLOCK_APU_RAM: u8 = 0xC2;

/// Ricoh 2A03 with its memory map.
#[derive(Debug, Clone)]
pub struct Nes2A03 {
    cpu: Cpu,
    bus: NsfBus,
    clock: u32,
    cycle_acc: u32,
    volume: u16,
}

impl Default for Nes2A03 {
    fn default() -> Self {
        Self::new()
    }
}

impl Nes2A03 {
    /// Chip at the NTSC clock.
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: NsfBus::new(),
            clock: NTSC_CPU_CLOCK,
            cycle_acc: 0,
            volume: DEFAULT_VOLUME,
        }
    }

    /// CPU clock in Hz.
    pub fn clock(&self) -> u32 {
        self.clock
    }

    /// Change the CPU clock. Zero keeps the NTSC default.
    pub fn set_clock(&mut self, clock: u32) {
        self.clock = if clock == 0 { NTSC_CPU_CLOCK } else { clock };
        self.cycle_acc = 0;
    }

    /// Memory map.
    pub fn bus(&self) -> &NsfBus {
        &self.bus
    }

    /// Mutable memory map.
    pub fn bus_mut(&mut self) -> &mut NsfBus {
        &mut self.bus
    }

    /// CPU core.
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }
}

/// VGM register index to CPU address. `None` for FDS and unused ranges.
fn vgm_register_address(register: u8) -> Option<u16> {
    match register {
        0x00..=0x1F => Some(0x4000 + register as u16),
        0x3F => Some(0x4023),
        _ => None,
    }
}

impl SoundChip for Nes2A03 {
    fn write(&mut self, register: u8, value: u8) {
        match vgm_register_address(register) {
            Some(address) => self.bus.write(address, value),
            None => trace!("ignored APU register 0x{register:02X}"),
        }
    }

    fn sample(&mut self) -> StereoSample {
        self.cycle_acc += self.clock;
        while self.cycle_acc >= CHIP_SAMPLE_RATE {
            self.cycle_acc -= CHIP_SAMPLE_RATE;
            self.bus.clock_apu();
        }
        StereoSample::mono(self.bus.apu.output(self.volume))
    }

    fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.cycle_acc = 0;
    }

    fn set_data_block(&mut self, kind: u8, payload: &[u8]) {
        if kind != DATA_BLOCK_APU_RAM {
            trace!("ignored data block type 0x{kind:02X}");
            return;
        }
        if payload.len() < 2 {
            debug!("APU RAM block of {} bytes has no address", payload.len());
            return;
        }
        let base = u16::from_le_bytes([payload[0], payload[1]]);
        self.bus.load_program_ram(base, &payload[2..]);
    }

    fn set_volume(&mut self, level: u16) {
        self.volume = level;
    }
}

impl SubroutineChip for Nes2A03 {
    fn call_subroutine(&mut self, address: u16, budget: u32) -> CallOutcome {
        self.cpu.call_subroutine(&mut self.bus, address, budget)
    }

    fn cpu_state_mut(&mut self) -> &mut CpuState {
        self.cpu.state_mut()
    }

    fn set_data(&mut self, address: u16, value: u8) {
        self.bus.write(address, value);
    }

    fn load_image(&mut self, base_address: u16, image: &[u8]) {
        self.bus.load_image(base_address, image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vgm_register_mapping() {
        assert_eq!(vgm_register_address(0x00), Some(0x4000));
        assert_eq!(vgm_register_address(0x15), Some(0x4015));
        assert_eq!(vgm_register_address(0x3F), Some(0x4023));
        assert_eq!(vgm_register_address(0x20), None);
        assert_eq!(vgm_register_address(0x80), None);
    }

    #[test]
    fn subroutine_writes_reach_apu() {
        let mut chip = Nes2A03::new();
        // LDA #$01; STA $4015; LDA #$08; STA $4003; RTS
        chip.load_image(
            0x8000,
            &[0xA9, 0x01, 0x8D, 0x15, 0x40, 0xA9, 0x08, 0x8D, 0x03, 0x40, 0x60],
        );
        let outcome = chip.call_subroutine(0x8000, 100);
        assert_eq!(outcome, CallOutcome::Returned { instructions: 5 });
        assert_eq!(chip.bus_mut().read(0x4015) & 0x01, 0x01);
    }

    #[test]
    fn square_wave_is_mono_and_scaled() {
        let mut chip = Nes2A03::new();
        chip.write(0x15, 0x01);
        chip.write(0x00, 0xBF);
        chip.write(0x02, 0x40);
        chip.write(0x03, 0x00);
        let samples: Vec<StereoSample> = (0..200).map(|_| chip.sample()).collect();
        assert!(samples.iter().all(|s| s.left == s.right));
        let peak = samples.iter().map(|s| s.left).max().unwrap_or(0);
        let expected = (apu::pulse_level(15) * 16383.0).round() as u16;
        assert_eq!(peak, expected);
        assert!(samples.iter().any(|s| s.left == 0));
    }

    #[test]
    fn apu_ram_block_is_copied() {
        let mut chip = Nes2A03::new();
        chip.set_data_block(DATA_BLOCK_APU_RAM, &[0x00, 0xC0, 0x12, 0x34]);
        assert_eq!(chip.bus_mut().read(0xC000), 0x12);
        assert_eq!(chip.bus_mut().read(0xC001), 0x34);
        chip.set_data_block(0x00, &[0x00, 0xC0, 0xFF]);
        assert_eq!(chip.bus_mut().read(0xC000), 0x12);
    }

    #[test]
    fn reset_clears_memory() {
        let mut chip = Nes2A03::new();
        chip.set_data(0x0000, 0x55);
        chip.cpu_state_mut().a = 7;
        chip.reset();
        assert_eq!(chip.bus_mut().read(0x0000), 0);
        assert_eq!(chip.cpu().state().a, 0);
    }
}
