//! Peak-hold rate conversion from the chip tick rate to the output rate.
//!
//! Every chip tick contributes one stereo sample. Within an output period each
//! channel keeps the sample furthest from mid-scale, so short spikes survive
//! downsampling instead of being averaged away.

use crate::chip::StereoSample;
use crate::config::CHIP_SAMPLE_RATE;

/// Mid-scale reference for the peak-hold comparison.
pub const PEAK_THRESHOLD: u16 = 8192;

/// Bytes per interleaved 16-bit stereo frame.
pub const FRAME_BYTES: usize = 4;

fn deviation(value: u16) -> u32 {
    (value as i32 - PEAK_THRESHOLD as i32).unsigned_abs()
}

/// Keep whichever of `held` and `sample` lies further from [`PEAK_THRESHOLD`].
///
/// On the same side of the threshold this means "strictly greater" at or above
/// it and "strictly lesser" below it. Ties keep the held value.
pub fn peak_hold(held: u16, sample: u16) -> u16 {
    if deviation(sample) > deviation(held) {
        sample
    } else {
        held
    }
}

/// Fixed-point rate converter with peak-hold mixing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateConverter {
    output_rate: u32,
    accumulator: u64,
    held: StereoSample,
    valid: bool,
    owed: u32,
}

impl Default for RateConverter {
    fn default() -> Self {
        Self::new(CHIP_SAMPLE_RATE)
    }
}

impl RateConverter {
    /// Converter producing `output_rate` frames per second of chip time.
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate,
            accumulator: 0,
            held: StereoSample::SILENCE,
            valid: false,
            owed: 0,
        }
    }

    /// Output rate in Hz.
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Change the output rate. The accumulator keeps its phase.
    pub fn set_output_rate(&mut self, output_rate: u32) {
        self.output_rate = output_rate;
    }

    /// Drop any partial frame and restart the accumulator at zero.
    pub fn reset(&mut self) {
        self.accumulator = 0;
        self.held = StereoSample::SILENCE;
        self.valid = false;
        self.owed = 0;
    }

    /// Frame currently held for output.
    pub fn held(&self) -> StereoSample {
        self.held
    }

    /// Number of committed frames not yet written out.
    pub fn owed_frames(&self) -> u32 {
        self.owed
    }

    /// Feed one chip tick.
    pub fn push(&mut self, sample: StereoSample) {
        if self.valid {
            self.held.left = peak_hold(self.held.left, sample.left);
            self.held.right = peak_hold(self.held.right, sample.right);
        } else {
            self.held = sample;
            self.valid = true;
        }

        self.accumulator += self.output_rate as u64;
        // Above the chip rate a single tick can commit more than one frame.
        let committed = self.accumulator / CHIP_SAMPLE_RATE as u64;
        self.accumulator %= CHIP_SAMPLE_RATE as u64;
        self.owed = self.owed.saturating_add(committed as u32);
        if self.owed > 0 {
            self.valid = false;
        }
    }

    /// Write committed frames into `out` while whole frames fit. Returns bytes written.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let mut written = 0;
        let frame = self.held.to_le_bytes();
        while self.owed > 0 && out.len() - written >= FRAME_BYTES {
            out[written..written + FRAME_BYTES].copy_from_slice(&frame);
            written += FRAME_BYTES;
            self.owed -= 1;
        }
        written
    }
}
