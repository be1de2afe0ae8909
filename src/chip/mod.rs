//! Sound chip abstraction.
//!
//! The replayer only talks to chips through the traits defined here:
//!
//! - [`SoundChip`]: register-addressable device producing one stereo sample per tick
//!   at [`CHIP_SAMPLE_RATE`].
//! - [`SubroutineChip`]: a sound chip bundled with an emulated CPU that can run
//!   subroutines from a loaded program image (NSF playback).
//!
//! A [`ChipFactory`] builds the chip requested by a header, and the result is held
//! in a [`ChipSlot`] as a tagged [`AttachedChip`].

#[cfg(feature = "ay8910")]
pub mod ay8910;
#[cfg(feature = "nes")]
pub mod nes;
pub mod slot;

pub use slot::{AttachedChip, ChipKind, ChipSlot};

use crate::config::CHIP_SAMPLE_RATE;
use crate::error::CpuFault;

/// Two 16-bit channels produced by a chip in one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StereoSample {
    /// Left channel.
    pub left: u16,
    /// Right channel.
    pub right: u16,
}

impl StereoSample {
    /// Both channels at zero.
    pub const SILENCE: StereoSample = StereoSample { left: 0, right: 0 };

    /// Create a sample from both channels.
    pub const fn new(left: u16, right: u16) -> Self {
        Self { left, right }
    }

    /// Same value on both channels.
    pub const fn mono(value: u16) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Pack as `left | right << 16`.
    pub const fn pack(self) -> u32 {
        self.left as u32 | (self.right as u32) << 16
    }

    /// Inverse of [`pack`](Self::pack).
    pub const fn unpack(packed: u32) -> Self {
        Self {
            left: packed as u16,
            right: (packed >> 16) as u16,
        }
    }

    /// Interleaved little-endian PCM frame, left channel first.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.pack().to_le_bytes()
    }
}

/// Register-addressable sound chip.
///
/// Implementations must tick at [`CHIP_SAMPLE_RATE`]: every call to
/// [`sample`](SoundChip::sample) advances the chip by exactly 1/44100 s.
pub trait SoundChip: Send {
    /// Write `value` to chip register `register`.
    fn write(&mut self, register: u8, value: u8);

    /// Advance one tick and return the produced sample.
    fn sample(&mut self) -> StereoSample;

    /// Return to power-on state.
    fn reset(&mut self);

    /// Receive a data block from the command stream.
    ///
    /// Default: ignore the block.
    fn set_data_block(&mut self, _kind: u8, _payload: &[u8]) {}

    /// Set the output volume; 64 is unity for the built-in chips.
    fn set_volume(&mut self, level: u16);

    /// Tick rate of this chip.
    fn sample_frequency(&self) -> u32 {
        CHIP_SAMPLE_RATE
    }

    /// Apply a per-channel stereo mask.
    ///
    /// Default: no-op for chips without stereo routing.
    fn set_stereo_mask(&mut self, _mask: u8) {}
}

/// 6502 register file exposed to the player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuState {
    /// Accumulator.
    pub a: u8,
    /// X index register.
    pub x: u8,
    /// Y index register.
    pub y: u8,
    /// Stack pointer (offset into page 1).
    pub sp: u8,
    /// Program counter.
    pub pc: u16,
    /// Processor status.
    pub status: u8,
}

/// Result of running a subroutine to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The routine returned after executing `instructions` instructions.
    Returned {
        /// Number of instructions executed, at least 1.
        instructions: u32,
    },
    /// The instruction budget ran out before the routine returned.
    BudgetExhausted,
    /// The CPU faulted.
    Fault(CpuFault),
}

impl CallOutcome {
    /// Signed status code: negative for a fault, zero for an exhausted budget,
    /// otherwise the number of instructions executed.
    pub fn status_code(&self) -> i64 {
        match self {
            CallOutcome::Returned { instructions } => *instructions as i64,
            CallOutcome::BudgetExhausted => 0,
            CallOutcome::Fault(_) => -1,
        }
    }
}

/// Sound chip driven by an emulated CPU.
pub trait SubroutineChip: SoundChip {
    /// Call the routine at `address`, executing at most `budget` instructions.
    fn call_subroutine(&mut self, address: u16, budget: u32) -> CallOutcome;

    /// Mutable access to the CPU registers used for the next call.
    fn cpu_state_mut(&mut self) -> &mut CpuState;

    /// Write one byte through the CPU address space, including memory-mapped registers.
    fn set_data(&mut self, address: u16, value: u8);

    /// Load a program image at `base_address`.
    fn load_image(&mut self, base_address: u16, image: &[u8]);
}

/// Chip requested by a container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipRequest {
    /// AY-3-8910 family PSG.
    Psg {
        /// Master clock in Hz.
        clock: u32,
        /// Variant byte from the header.
        variant: u8,
        /// Flags byte from the header.
        flags: u8,
    },
    /// CPU with audio unit; `clock` overrides the default CPU clock.
    CpuApu {
        /// Master clock in Hz, if the container specifies one.
        clock: Option<u32>,
    },
}

/// Builds chips for the player.
///
/// Returning `None` means the chip kind is not available.
pub trait ChipFactory: Send {
    /// Build a PSG-style chip.
    fn create_psg(&self, clock: u32, variant: u8, flags: u8) -> Option<Box<dyn SoundChip>>;

    /// Build a CPU+APU-style chip.
    fn create_cpu_apu(&self, clock: Option<u32>) -> Option<Box<dyn SubroutineChip>>;

    /// Build whichever chip `request` names.
    fn create(&self, request: ChipRequest) -> Option<AttachedChip> {
        match request {
            ChipRequest::Psg {
                clock,
                variant,
                flags,
            } => self
                .create_psg(clock, variant, flags)
                .map(AttachedChip::Psg),
            ChipRequest::CpuApu { clock } => {
                self.create_cpu_apu(clock).map(AttachedChip::CpuApu)
            }
        }
    }
}

/// Factory for the chip models compiled into this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultChipFactory;

impl ChipFactory for DefaultChipFactory {
    #[cfg(feature = "ay8910")]
    fn create_psg(&self, clock: u32, variant: u8, flags: u8) -> Option<Box<dyn SoundChip>> {
        Some(Box::new(ay8910::Ay8910::from_header(clock, variant, flags)))
    }

    #[cfg(not(feature = "ay8910"))]
    fn create_psg(&self, _clock: u32, _variant: u8, _flags: u8) -> Option<Box<dyn SoundChip>> {
        None
    }

    #[cfg(feature = "nes")]
    fn create_cpu_apu(&self, clock: Option<u32>) -> Option<Box<dyn SubroutineChip>> {
        let mut chip = nes::Nes2A03::new();
        if let Some(clock) = clock {
            chip.set_clock(clock);
        }
        Some(Box::new(chip))
    }

    #[cfg(not(feature = "nes"))]
    fn create_cpu_apu(&self, _clock: Option<u32>) -> Option<Box<dyn SubroutineChip>> {
        None
    }
}
