//! VGM (Video Game Music) command-stream header.
//!
//! The header is a bounds-checked overlay on the caller's buffer. Fields that
//! lie at or beyond the command data start are reported as zero, which is how
//! the container grows without breaking older readers.

use log::{debug, info, warn};

use super::reader::ByteView;
use crate::chip::ChipRequest;
use crate::error::FormatError;

/// `"Vgm "` read as a little-endian u32.
pub const VGM_MAGIC: u32 = 0x206D_6756;

/// Header length for versions below 1.61.
pub const VGM_HEADER_LEN: usize = 0x40;
/// Header length for version 1.61 and later.
pub const VGM_EXTENDED_HEADER_LEN: usize = 0x80;

const OFFSET_EOF: usize = 0x04;
const OFFSET_VERSION: usize = 0x08;
const OFFSET_GD3: usize = 0x14;
const OFFSET_TOTAL_SAMPLES: usize = 0x18;
const OFFSET_LOOP: usize = 0x1C;
const OFFSET_LOOP_SAMPLES: usize = 0x20;
const OFFSET_RATE: usize = 0x24;
const OFFSET_DATA: usize = 0x34;
const OFFSET_AY8910_CLOCK: usize = 0x74;
const OFFSET_AY8910_TYPE: usize = 0x78;
const OFFSET_AY8910_FLAGS: usize = 0x79;
const OFFSET_LOOP_BASE: usize = 0x7E;
const OFFSET_LOOP_MODIFIER: usize = 0x7F;
const OFFSET_NES_APU_CLOCK: usize = 0x84;

const AY8910_CLOCK_MASK: u32 = 0x3FFF_FFFF;
const NES_APU_CLOCK_MASK: u32 = 0x7FFF_FFFF;
const DEFAULT_RATE: u32 = 50;

/// Read-only view over a VGM header.
#[derive(Debug, Clone, Copy)]
pub struct VgmHeader<'a> {
    view: ByteView<'a>,
    version: u32,
    data_start: usize,
    loop_target: Option<usize>,
}

impl<'a> VgmHeader<'a> {
    /// Validate `data` as a VGM stream and overlay the header on it.
    pub fn parse(data: &'a [u8]) -> Result<Self, FormatError> {
        let view = ByteView::new(data);
        if data.len() < VGM_HEADER_LEN {
            return Err(FormatError::TooShort {
                required: VGM_HEADER_LEN,
                actual: data.len(),
            });
        }

        let magic = view.u32_at(0).unwrap_or_default();
        if magic != VGM_MAGIC {
            return Err(FormatError::BadMagic {
                expected: VGM_MAGIC,
                found: magic,
            });
        }

        let eof = view.u32_at(OFFSET_EOF).unwrap_or_default();
        if eof as usize != data.len() - 4 {
            return Err(FormatError::EofMismatch {
                field: eof,
                len: data.len(),
            });
        }

        let version = view.u32_at(OFFSET_VERSION).unwrap_or_default();
        let header_len = header_len_for(version);
        if data.len() < header_len {
            return Err(FormatError::TooShort {
                required: header_len,
                actual: data.len(),
            });
        }

        let relative_data = view.u32_at(OFFSET_DATA).unwrap_or_default();
        let data_start = if version >= 0x150 && relative_data != 0 {
            relative_data as usize + OFFSET_DATA
        } else {
            VGM_HEADER_LEN
        };
        if data_start >= data.len() {
            return Err(FormatError::DataOutOfRange { offset: data_start });
        }

        let relative_loop = view.u32_at(OFFSET_LOOP).unwrap_or_default();
        let loop_target = if relative_loop == 0 {
            None
        } else {
            let target = relative_loop as usize + OFFSET_LOOP;
            if (data_start..data.len()).contains(&target) {
                Some(target)
            } else {
                warn!("loop offset 0x{target:08X} outside of command data, looping disabled");
                None
            }
        };

        Ok(Self {
            view,
            version,
            data_start,
            loop_target,
        })
    }

    /// The whole input buffer.
    pub fn bytes(&self) -> &'a [u8] {
        self.view.bytes()
    }

    /// BCD version number, e.g. `0x171` for 1.71.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Nominal header length for this version (64 or 128 bytes).
    pub fn header_len(&self) -> usize {
        header_len_for(self.version)
    }

    /// Absolute offset of the first command.
    pub fn data_start(&self) -> usize {
        self.data_start
    }

    /// Absolute loop target, if the stream loops.
    pub fn loop_target(&self) -> Option<usize> {
        self.loop_target
    }

    /// Raw relative loop offset field.
    pub fn loop_offset_field(&self) -> u32 {
        self.view.u32_at(OFFSET_LOOP).unwrap_or_default()
    }

    /// Total length of one pass in 44.1 kHz samples.
    pub fn total_samples(&self) -> u32 {
        self.view.u32_at(OFFSET_TOTAL_SAMPLES).unwrap_or_default()
    }

    /// Length of the looped section in 44.1 kHz samples.
    pub fn loop_samples(&self) -> u32 {
        self.view.u32_at(OFFSET_LOOP_SAMPLES).unwrap_or_default()
    }

    /// Recording rate in Hz (50 when unspecified).
    pub fn rate(&self) -> u32 {
        match self.view.u32_at(OFFSET_RATE).unwrap_or_default() {
            0 => DEFAULT_RATE,
            rate => rate,
        }
    }

    /// Loop base; informational only.
    pub fn loop_base(&self) -> i8 {
        self.optional_u8(OFFSET_LOOP_BASE) as i8
    }

    /// Loop modifier; informational only.
    pub fn loop_modifier(&self) -> u8 {
        self.optional_u8(OFFSET_LOOP_MODIFIER)
    }

    /// AY8910 clock in Hz (0 when no AY chip is used).
    pub fn ay8910_clock(&self) -> u32 {
        self.optional_u32(OFFSET_AY8910_CLOCK) & AY8910_CLOCK_MASK
    }

    /// AY8910 chip variant byte.
    pub fn ay8910_type(&self) -> u8 {
        self.optional_u8(OFFSET_AY8910_TYPE)
    }

    /// AY8910 flags byte.
    pub fn ay8910_flags(&self) -> u8 {
        self.optional_u8(OFFSET_AY8910_FLAGS)
    }

    /// NES APU clock in Hz (0 when no NES APU is used).
    pub fn nes_apu_clock(&self) -> u32 {
        self.optional_u32(OFFSET_NES_APU_CLOCK) & NES_APU_CLOCK_MASK
    }

    /// Absolute offset of the GD3 tag block, if present.
    pub fn gd3_offset(&self) -> Option<usize> {
        match self.view.u32_at(OFFSET_GD3).unwrap_or_default() {
            0 => None,
            relative => Some(relative as usize + OFFSET_GD3),
        }
    }

    /// The chip to attach. The AY8910 clock is checked first.
    pub fn chip_request(&self) -> Option<ChipRequest> {
        let ay_clock = self.ay8910_clock();
        if ay_clock != 0 {
            return Some(ChipRequest::Psg {
                clock: ay_clock,
                variant: self.ay8910_type(),
                flags: self.ay8910_flags(),
            });
        }
        let nes_clock = self.nes_apu_clock();
        if nes_clock != 0 {
            return Some(ChipRequest::CpuApu {
                clock: Some(nes_clock),
            });
        }
        None
    }

    /// Emit the header summary to the log.
    pub fn log_summary(&self) {
        info!(
            "VGM version {:X}.{:02X}, rate {} Hz",
            self.version >> 8,
            self.version & 0xFF,
            self.rate()
        );
        debug!("ay8910 frequency: {}Hz", self.ay8910_clock());
        debug!("chip type: 0x{:02X}", self.ay8910_type());
        debug!("chip flags: 0x{:02X}", self.ay8910_flags());
        debug!("nes apu frequency: {}Hz", self.nes_apu_clock());
        debug!("total samples: {}", self.total_samples());
        debug!("vgm data offset: 0x{:08X}", self.data_start);
        debug!("loop offset: 0x{:08X}", self.loop_target.unwrap_or(0));
        debug!("loop samples: {}", self.loop_samples());
        debug!("loop modifier: {}", self.loop_modifier());
        debug!("loop base: {}", self.loop_base());
    }

    fn optional_u32(&self, offset: usize) -> u32 {
        if offset + 4 <= self.data_start {
            self.view.u32_at(offset).unwrap_or_default()
        } else {
            0
        }
    }

    fn optional_u8(&self, offset: usize) -> u8 {
        if offset < self.data_start {
            self.view.u8_at(offset).unwrap_or_default()
        } else {
            0
        }
    }
}

fn header_len_for(version: u32) -> usize {
    if version >= 0x161 {
        VGM_EXTENDED_HEADER_LEN
    } else {
        VGM_HEADER_LEN
    }
}
