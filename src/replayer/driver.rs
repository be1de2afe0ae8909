//! NSF playback: init and periodic play subroutine calls.

use log::{debug, error, info};

use super::cursor::PlaybackCursor;
use super::interpreter::StepSignal;
use super::HaltReason;
use crate::chip::{CallOutcome, ChipSlot, SubroutineChip};
use crate::config::CHIP_SAMPLE_RATE;
use crate::format::NsfHeader;

const RAM_END: u16 = 0x07FF;
const APU_CHANNEL_REGS: std::ops::RangeInclusive<u16> = 0x4000..=0x4013;
const APU_STATUS: u16 = 0x4015;
const APU_FRAME_COUNTER: u16 = 0x4017;
const BANK_REGISTERS: u16 = 0x5FF8;
const INIT_STACK_POINTER: u8 = 0xEF;

/// Chip ticks per play call for a frame interval in microseconds.
pub fn frame_wait(interval_us: u16) -> u32 {
    let ticks = (CHIP_SAMPLE_RATE as u64 * interval_us as u64 + 500_000) / 1_000_000;
    (ticks as u32).max(1)
}

/// Drives the init/play routines of one NSF file.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackDriver<'a> {
    header: NsfHeader<'a>,
    budget: u32,
}

impl<'a> PlaybackDriver<'a> {
    /// Driver for `header`, running each call under `budget` instructions.
    pub fn new(header: NsfHeader<'a>, budget: u32) -> Self {
        Self { header, budget }
    }

    /// Instruction budget per call.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Change the instruction budget.
    pub fn set_budget(&mut self, budget: u32) {
        self.budget = budget;
    }

    /// Chip ticks between two play calls.
    pub fn ticks_per_frame(&self) -> u32 {
        frame_wait(self.header.frame_interval_us())
    }

    /// Reset the chip, load the program and run the init routine for `track`.
    ///
    /// Tracks past the song count start song 0.
    pub fn set_track(
        &self,
        track: usize,
        slot: &mut ChipSlot,
        cursor: &mut PlaybackCursor,
    ) -> Result<(), HaltReason> {
        let chip = slot
            .subroutine_chip()
            .ok_or(HaltReason::ChipUnavailable)?;
        chip.reset();
        chip.load_image(self.header.load_address(), self.header.image());

        if self.header.uses_banks() {
            for (i, bank) in self.header.bank_switch().into_iter().enumerate() {
                chip.set_data(BANK_REGISTERS + i as u16, bank);
            }
        }

        for address in 0..=RAM_END {
            chip.set_data(address, 0);
        }
        for address in APU_CHANNEL_REGS {
            chip.set_data(address, 0);
        }
        chip.set_data(APU_STATUS, 0x00);
        chip.set_data(APU_STATUS, 0x0F);
        chip.set_data(APU_FRAME_COUNTER, 0x40);

        let song_count = self.header.song_count() as usize;
        let song = if track < song_count { track } else { 0 };
        if song != track {
            info!("track {track} out of range ({song_count} songs), playing track 0");
        }
        let cpu = chip.cpu_state_mut();
        cpu.x = 0;
        cpu.a = song as u8;
        cpu.sp = INIT_STACK_POINTER;

        let init = self.header.init_address();
        self.call(chip, init)?;
        cursor.restart_timing();
        debug!("track {song} initialized");
        Ok(())
    }

    /// Run the play routine once and schedule the next frame.
    pub fn play_frame(
        &self,
        slot: &mut ChipSlot,
        cursor: &mut PlaybackCursor,
    ) -> Result<StepSignal, HaltReason> {
        let chip = slot
            .subroutine_chip()
            .ok_or(HaltReason::ChipUnavailable)?;
        self.call(chip, self.header.play_address())?;
        cursor.pending_wait = self.ticks_per_frame();
        debug!(
            "next frame {} ticks at {}",
            cursor.pending_wait,
            cursor.samples_played()
        );
        Ok(StepSignal::Continue)
    }

    fn call(&self, chip: &mut dyn SubroutineChip, address: u16) -> Result<u32, HaltReason> {
        match chip.call_subroutine(address, self.budget) {
            CallOutcome::Returned { instructions } => Ok(instructions),
            CallOutcome::BudgetExhausted => {
                error!("subroutine at 0x{address:04X} looks like an infinite loop, stopping");
                Err(HaltReason::BudgetExhausted {
                    address,
                    budget: self.budget,
                })
            }
            CallOutcome::Fault(fault) => {
                error!("subroutine at 0x{address:04X} failed: {fault}");
                Err(HaltReason::Cpu(fault))
            }
        }
    }
}
