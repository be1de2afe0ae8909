//! Mixer control (R7) and stereo routing.

use bitflags::bitflags;

bitflags! {
    /// Mixer control register (R7). A set bit disables the source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MixerFlags: u8 {
        /// Channel A tone disable
        const CH_A_TONE = 0x01;
        /// Channel B tone disable
        const CH_B_TONE = 0x02;
        /// Channel C tone disable
        const CH_C_TONE = 0x04;
        /// Channel A noise disable
        const CH_A_NOISE = 0x08;
        /// Channel B noise disable
        const CH_B_NOISE = 0x10;
        /// Channel C noise disable
        const CH_C_NOISE = 0x20;
    }
}

impl MixerFlags {
    /// Create mixer flags from raw register value
    pub fn from_register(value: u8) -> Self {
        MixerFlags::from_bits_truncate(value)
    }

    /// True when tone is audible on `voice` (0..3).
    pub fn tone_enabled(&self, voice: usize) -> bool {
        self.bits() & (0x01 << voice) == 0
    }

    /// True when noise is audible on `voice` (0..3).
    pub fn noise_enabled(&self, voice: usize) -> bool {
        self.bits() & (0x08 << voice) == 0
    }
}

/// Two bits per channel: bit 0 left, bit 1 right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StereoMask(u8);

impl StereoMask {
    /// Every channel on both sides.
    pub const CENTER: StereoMask = StereoMask(0x3F);

    /// Build from the low six bits of a mask byte.
    pub fn from_bits(mask: u8) -> Self {
        StereoMask(mask & 0x3F)
    }

    /// Raw bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Channel `voice` feeds the left output.
    pub fn left(self, voice: usize) -> bool {
        self.0 >> (voice * 2) & 0x01 != 0
    }

    /// Channel `voice` feeds the right output.
    pub fn right(self, voice: usize) -> bool {
        self.0 >> (voice * 2) & 0x02 != 0
    }
}

impl Default for StereoMask {
    fn default() -> Self {
        Self::CENTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixer_flags() {
        let flags = MixerFlags::from_register(0x00);
        assert!((0..3).all(|v| flags.tone_enabled(v) && flags.noise_enabled(v)));
    }

    #[test]
    fn test_mixer_flags_disabled() {
        let flags = MixerFlags::from_register(0xFF);
        assert!((0..3).all(|v| !flags.tone_enabled(v) && !flags.noise_enabled(v)));
    }

    #[test]
    fn test_mixer_flags_per_channel() {
        let flags = MixerFlags::from_register(0b0010_1010);
        assert!(flags.tone_enabled(0));
        assert!(!flags.tone_enabled(1));
        assert!(!flags.noise_enabled(0));
        assert!(flags.noise_enabled(1));
        assert!(!flags.noise_enabled(2));
    }

    #[test]
    fn test_stereo_mask_bits() {
        let mask = StereoMask::from_bits(0b10_01_11);
        assert!(mask.left(0) && mask.right(0));
        assert!(mask.left(1) && !mask.right(1));
        assert!(!mask.left(2) && mask.right(2));
        assert_eq!(StereoMask::default().bits(), 0x3F);
    }
}
