//! AY-3-8910 family PSG emulation.
//!
//! Integer model ticking at master clock / 8. Every output sample runs as
//! many internal ticks as fit in 1/44100 s and keeps a channel audible if its
//! gate was open during any of them.
//!
//! Covers AY8910/12/13/14/30 (16-step envelope) and the YM2149 family plus the
//! SSG part of YM2203/2608/2610 (32-step envelope).

mod envelope;
mod mixer;

pub use envelope::Envelope;
pub use mixer::{MixerFlags, StereoMask};

use bitflags::bitflags;
use log::{trace, warn};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::{SoundChip, StereoSample};
use crate::config::{CHIP_SAMPLE_RATE, DEFAULT_VOLUME};

/// Default AY clock (MSX).
pub const DEFAULT_AY_CLOCK: u32 = 1_789_772;

/// Measured YM2149 output levels for the 16 fixed volumes.
const VOLUME_TABLE: [u16; 16] = [
    20, 53, 88, 125, 193, 258, 385, 525, 753, 1029, 1523, 2077, 3110, 4395, 7073, 10922,
];

const REG_MASK: [u8; 16] = [
    0xFF, 0x0F, 0xFF, 0x0F, 0xFF, 0x0F, 0x1F, 0xFF, 0x1F, 0x1F, 0x1F, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF,
];

/// Chip variant byte stored in VGM headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum AyVariant {
    /// General Instrument AY-3-8910.
    Ay8910 = 0x00,
    /// AY-3-8912 (one I/O port).
    Ay8912 = 0x01,
    /// AY-3-8913 (no I/O ports).
    Ay8913 = 0x02,
    /// Microchip AY8930.
    Ay8930 = 0x03,
    /// AY-3-8914.
    Ay8914 = 0x04,
    /// Yamaha YM2149.
    Ym2149 = 0x10,
    /// Yamaha YM3439.
    Ym3439 = 0x11,
    /// Yamaha YMZ284.
    Ymz284 = 0x12,
    /// Yamaha YMZ294.
    Ymz294 = 0x13,
    /// SSG part of YM2203.
    Ym2203 = 0x20,
    /// SSG part of YM2608.
    Ym2608 = 0x21,
    /// SSG part of YM2610.
    Ym2610 = 0x22,
    /// SSG part of YM2610B.
    Ym2610b = 0x23,
}

impl AyVariant {
    /// Map a header byte, falling back to the plain AY-3-8910.
    pub fn from_header(byte: u8) -> Self {
        AyVariant::from_u8(byte).unwrap_or_else(|| {
            warn!("unknown AY variant 0x{byte:02X}, emulating AY-3-8910");
            AyVariant::Ay8910
        })
    }

    /// Envelope resolution of this variant.
    pub fn envelope_steps(self) -> u8 {
        if (self as u8) < 0x10 {
            16
        } else {
            32
        }
    }
}

bitflags! {
    /// AY flags byte from VGM headers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AyFlags: u8 {
        /// Legacy output.
        const LEGACY_OUTPUT = 0x01;
        /// Single output.
        const SINGLE_OUTPUT = 0x02;
        /// Discrete output.
        const DISCRETE_OUTPUT = 0x04;
        /// Raw output.
        const RAW_OUTPUT = 0x08;
        /// YM pin 26 held low: master clock divided by two.
        const YM_CLOCK_DIVIDER = 0x10;
    }
}

/// AY-3-8910 family PSG.
#[derive(Clone)]
pub struct Ay8910 {
    variant: AyVariant,
    flags: AyFlags,
    clock: u32,
    step_clock: u32,
    inner_cycle: u32,
    regs: [u8; 16],
    tone_counter: [u32; 3],
    tone_period: [u32; 3],
    tone_high: [bool; 3],
    noise_counter: u32,
    noise_period: u32,
    noise_half: bool,
    noise_lfsr: u32,
    noise_high: bool,
    mixer: MixerFlags,
    envelope: Envelope,
    stereo: StereoMask,
    volume: u16,
    levels: [u16; 32],
}

impl Ay8910 {
    /// Create a chip of the given variant running at `clock` Hz.
    pub fn new(variant: AyVariant, clock: u32) -> Self {
        let mut chip = Self {
            variant,
            flags: AyFlags::empty(),
            clock,
            step_clock: 1,
            inner_cycle: 0,
            regs: [0; 16],
            tone_counter: [0; 3],
            tone_period: [0; 3],
            tone_high: [false; 3],
            noise_counter: 0,
            noise_period: 0,
            noise_half: false,
            noise_lfsr: 1,
            noise_high: false,
            mixer: MixerFlags::all(),
            envelope: Envelope::new(variant.envelope_steps()),
            stereo: StereoMask::default(),
            volume: DEFAULT_VOLUME,
            levels: [0; 32],
        };
        chip.set_clock(clock);
        chip.rebuild_levels();
        chip.reset();
        chip
    }

    /// Create a chip from the VGM header clock, variant and flags bytes.
    pub fn from_header(clock: u32, variant: u8, flags: u8) -> Self {
        let mut chip = Self::new(AyVariant::from_header(variant), clock);
        chip.flags = AyFlags::from_bits_truncate(flags);
        chip.set_clock(clock);
        chip
    }

    /// Chip variant.
    pub fn variant(&self) -> AyVariant {
        self.variant
    }

    /// Master clock in Hz.
    pub fn clock(&self) -> u32 {
        self.clock
    }

    /// Change the master clock.
    pub fn set_clock(&mut self, clock: u32) {
        self.clock = if clock == 0 { DEFAULT_AY_CLOCK } else { clock };
        let effective = if self.flags.contains(AyFlags::YM_CLOCK_DIVIDER) {
            self.clock / 2
        } else {
            self.clock
        };
        self.step_clock = (effective / 8).max(1);
        self.inner_cycle = 0;
    }

    /// Read back a register value.
    pub fn read_register(&self, register: u8) -> u8 {
        self.regs[(register & 0x0F) as usize]
    }

    fn write_reg(&mut self, reg: usize, value: u8) {
        self.regs[reg] = value & REG_MASK[reg];
        match reg {
            0..=5 => {
                let voice = reg >> 1;
                self.tone_period[voice] =
                    ((self.regs[voice * 2 + 1] as u32) << 8) | self.regs[voice * 2] as u32;
            }
            6 => self.noise_period = self.regs[6] as u32,
            7 => self.mixer = MixerFlags::from_register(self.regs[7]),
            11 | 12 => {
                self.envelope
                    .set_period(((self.regs[12] as u16) << 8) | self.regs[11] as u16);
            }
            13 => self.envelope.set_shape(self.regs[13]),
            _ => {}
        }
    }

    fn rebuild_levels(&mut self) {
        for (index, level) in self.levels.iter_mut().enumerate() {
            let base = if index == 0 {
                0
            } else if index % 2 == 1 {
                VOLUME_TABLE[index / 2] as u32
            } else {
                // Even steps sit halfway (geometrically) between their neighbours.
                let lower = VOLUME_TABLE[index / 2 - 1] as f64;
                let upper = VOLUME_TABLE[index / 2] as f64;
                (lower * upper).sqrt().round() as u32
            };
            let scaled = base * self.volume as u32 / (2 * DEFAULT_VOLUME as u32);
            *level = scaled.min(u16::MAX as u32) as u16;
        }
    }

    /// One internal clock at master / 8.
    fn tick(&mut self) {
        for voice in 0..3 {
            self.tone_counter[voice] += 1;
            if self.tone_counter[voice] >= self.tone_period[voice].max(1) {
                self.tone_high[voice] = !self.tone_high[voice];
                self.tone_counter[voice] = 0;
            }
        }

        // Noise runs at half the tone rate.
        self.noise_half = !self.noise_half;
        if self.noise_half {
            self.noise_counter += 1;
            if self.noise_counter >= self.noise_period.max(1) {
                let feedback = (self.noise_lfsr ^ (self.noise_lfsr >> 3)) & 1;
                self.noise_lfsr = (self.noise_lfsr >> 1) | (feedback << 16);
                self.noise_high = self.noise_lfsr & 1 != 0;
                self.noise_counter = 0;
            }
        }

        self.envelope.tick();
    }

    fn gate_open(&self, voice: usize) -> bool {
        let tone = self.tone_high[voice] || !self.mixer.tone_enabled(voice);
        let noise = self.noise_high || !self.mixer.noise_enabled(voice);
        tone && noise
    }

    fn channel_level(&self, voice: usize) -> u16 {
        let amplitude = self.regs[8 + voice];
        let index = if amplitude & 0x10 != 0 {
            let env = self.envelope.level();
            if self.envelope.steps() == 32 {
                env
            } else {
                env * 2 + 1
            }
        } else {
            (amplitude & 0x0F) * 2 + 1
        };
        let level = self.levels[index as usize];
        // Periods 0 and 1 are far above audible range; the output settles halfway.
        if self.tone_period[voice] <= 1 && self.mixer.tone_enabled(voice) {
            level >> 1
        } else {
            level
        }
    }
}

impl Default for Ay8910 {
    fn default() -> Self {
        Self::new(AyVariant::Ay8910, DEFAULT_AY_CLOCK)
    }
}

impl SoundChip for Ay8910 {
    fn write(&mut self, register: u8, value: u8) {
        if register & 0x80 != 0 {
            trace!("second AY chip write [0x{register:02X}] ignored");
            return;
        }
        self.write_reg((register & 0x0F) as usize, value);
    }

    fn sample(&mut self) -> StereoSample {
        let mut open = [false; 3];
        loop {
            self.tick();
            for (voice, gate) in open.iter_mut().enumerate() {
                *gate |= self.gate_open(voice);
            }
            self.inner_cycle += CHIP_SAMPLE_RATE;
            if self.inner_cycle >= self.step_clock {
                break;
            }
        }
        // Clocks below 352.8 kHz get a single tick per sample.
        self.inner_cycle %= self.step_clock;

        let mut left: u32 = 0;
        let mut right: u32 = 0;
        for (voice, &gate) in open.iter().enumerate() {
            if !gate {
                continue;
            }
            let level = self.channel_level(voice) as u32;
            if self.stereo.left(voice) {
                left += level;
            }
            if self.stereo.right(voice) {
                right += level;
            }
        }
        StereoSample::new(
            left.min(u16::MAX as u32) as u16,
            right.min(u16::MAX as u32) as u16,
        )
    }

    fn reset(&mut self) {
        self.tone_counter = [0; 3];
        self.tone_high = [false; 3];
        self.noise_counter = 0;
        self.noise_half = false;
        self.noise_lfsr = 1;
        self.noise_high = false;
        self.inner_cycle = 0;
        for reg in 0..16 {
            self.write_reg(reg, if reg == 7 { 0x3F } else { 0 });
        }
    }

    fn set_volume(&mut self, level: u16) {
        self.volume = level;
        self.rebuild_levels();
    }

    fn set_stereo_mask(&mut self, mask: u8) {
        // Bit 6 selects the YM2203 SSG, bit 7 the second chip.
        if mask & 0xC0 != 0 {
            trace!("stereo mask 0x{mask:02X} targets another chip");
            return;
        }
        self.stereo = StereoMask::from_bits(mask);
    }
}

impl std::fmt::Debug for Ay8910 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ay8910")
            .field("variant", &self.variant)
            .field("clock", &self.clock)
            .field("regs", &self.regs)
            .field("envelope", &self.envelope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_chip(amplitudes: [u8; 3]) -> Ay8910 {
        let mut chip = Ay8910::new(AyVariant::Ym2149, 2_000_000);
        for voice in 0..3u8 {
            chip.write(voice * 2, 0x00);
            chip.write(voice * 2 + 1, 0x01);
            chip.write(8 + voice, amplitudes[voice as usize]);
        }
        // Tone and noise disabled: gates stay open, output is the raw level.
        chip.write(7, 0x3F);
        chip
    }

    #[test]
    fn full_volume_sums_to_midscale() {
        let mut chip = steady_chip([0x0F; 3]);
        let sample = chip.sample();
        assert_eq!(sample, StereoSample::mono(3 * 5461));
    }

    #[test]
    fn silent_registers_give_near_zero_output() {
        let mut chip = steady_chip([0; 3]);
        let sample = chip.sample();
        assert_eq!(sample, StereoSample::mono(3 * 10));
    }

    #[test]
    fn tone_toggles_output() {
        let mut chip = Ay8910::new(AyVariant::Ym2149, 2_000_000);
        // ~1 kHz on channel A only.
        chip.write(0, 125);
        chip.write(1, 0);
        chip.write(7, 0x3E);
        chip.write(8, 0x0F);
        let samples: Vec<u16> = (0..200).map(|_| chip.sample().left).collect();
        let high = samples.iter().filter(|&&s| s >= 5000).count();
        let low = samples.iter().filter(|&&s| s < 100).count();
        assert!(high > 50, "expected high half-cycles, got {high}");
        assert!(low > 50, "expected low half-cycles, got {low}");
    }

    #[test]
    fn stereo_mask_routes_channels() {
        let mut chip = steady_chip([0x0F, 0, 0]);
        // A left only, B and C off.
        chip.set_stereo_mask(0b00_00_01);
        let sample = chip.sample();
        assert_eq!(sample.left, 5461);
        assert_eq!(sample.right, 0);
        // Masks for another chip are ignored.
        chip.set_stereo_mask(0x80 | 0b00_00_10);
        assert_eq!(chip.sample().right, 0);
    }

    #[test]
    fn volume_scales_levels() {
        let mut chip = steady_chip([0x0F, 0, 0]);
        chip.set_stereo_mask(0b00_00_11);
        chip.set_volume(128);
        assert_eq!(chip.sample().left, 10922);
        chip.set_volume(0);
        assert_eq!(chip.sample().left, 0);
    }

    #[test]
    fn register_masks_and_second_chip() {
        let mut chip = Ay8910::default();
        chip.write(1, 0xFF);
        assert_eq!(chip.read_register(1), 0x0F);
        chip.write(0x80 | 2, 0x55);
        assert_eq!(chip.read_register(2), 0x00);
        chip.reset();
        assert_eq!(chip.read_register(7), 0x3F);
    }

    #[test]
    fn variants_pick_envelope_resolution() {
        assert_eq!(AyVariant::from_header(0x00).envelope_steps(), 16);
        assert_eq!(AyVariant::from_header(0x10), AyVariant::Ym2149);
        assert_eq!(AyVariant::from_header(0x10).envelope_steps(), 32);
        assert_eq!(AyVariant::from_header(0x22).envelope_steps(), 32);
        assert_eq!(AyVariant::from_header(0x77), AyVariant::Ay8910);
    }

    #[test]
    fn clock_divider_flag_halves_clock() {
        let chip = Ay8910::from_header(4_000_000, 0x10, AyFlags::YM_CLOCK_DIVIDER.bits());
        assert_eq!(chip.step_clock, 250_000);
        let chip = Ay8910::from_header(4_000_000, 0x10, 0);
        assert_eq!(chip.step_clock, 500_000);
    }
}
