//! NSF (NES Sound Format) header.

use log::{debug, info, warn};

use super::reader::ByteView;
use crate::error::FormatError;

/// `"NESM"` read as a little-endian u32.
pub const NSF_MAGIC: u32 = 0x4D53_454E;

/// Fixed header length; the program image follows.
pub const NSF_HEADER_LEN: usize = 0x80;

/// Frame interval used when the header leaves it blank (NTSC, ~60.1 Hz).
pub const DEFAULT_NTSC_SPEED_US: u16 = 16_639;

const OFFSET_VERSION: usize = 0x05;
const OFFSET_SONG_COUNT: usize = 0x06;
const OFFSET_STARTING_SONG: usize = 0x07;
const OFFSET_LOAD: usize = 0x08;
const OFFSET_INIT: usize = 0x0A;
const OFFSET_PLAY: usize = 0x0C;
const OFFSET_TITLE: usize = 0x0E;
const OFFSET_ARTIST: usize = 0x2E;
const OFFSET_COPYRIGHT: usize = 0x4E;
const TEXT_FIELD_LEN: usize = 32;
const OFFSET_NTSC_SPEED: usize = 0x6E;
const OFFSET_BANKS: usize = 0x70;
const OFFSET_PAL_SPEED: usize = 0x78;
const OFFSET_REGION: usize = 0x7A;
const OFFSET_EXPANSION: usize = 0x7B;

/// Read-only view over an NSF header.
#[derive(Debug, Clone, Copy)]
pub struct NsfHeader<'a> {
    view: ByteView<'a>,
}

impl<'a> NsfHeader<'a> {
    /// Validate `data` as an NSF file and overlay the header on it.
    pub fn parse(data: &'a [u8]) -> Result<Self, FormatError> {
        if data.len() < NSF_HEADER_LEN {
            return Err(FormatError::TooShort {
                required: NSF_HEADER_LEN,
                actual: data.len(),
            });
        }
        let view = ByteView::new(data);
        let magic = view.u32_at(0).unwrap_or_default();
        if magic != NSF_MAGIC {
            return Err(FormatError::BadMagic {
                expected: NSF_MAGIC,
                found: magic,
            });
        }
        Ok(Self { view })
    }

    /// Format version byte.
    pub fn version(&self) -> u8 {
        self.byte(OFFSET_VERSION)
    }

    /// Number of songs in the file.
    pub fn song_count(&self) -> u8 {
        self.byte(OFFSET_SONG_COUNT)
    }

    /// One-based index of the song the author suggests playing first.
    pub fn starting_song(&self) -> u8 {
        self.byte(OFFSET_STARTING_SONG)
    }

    /// Address where the program image is loaded.
    pub fn load_address(&self) -> u16 {
        self.word(OFFSET_LOAD)
    }

    /// Entry point of the init routine.
    pub fn init_address(&self) -> u16 {
        self.word(OFFSET_INIT)
    }

    /// Entry point of the per-frame play routine.
    pub fn play_address(&self) -> u16 {
        self.word(OFFSET_PLAY)
    }

    /// Song title.
    pub fn title(&self) -> String {
        self.text(OFFSET_TITLE)
    }

    /// Artist name.
    pub fn artist(&self) -> String {
        self.text(OFFSET_ARTIST)
    }

    /// Copyright holder.
    pub fn copyright(&self) -> String {
        self.text(OFFSET_COPYRIGHT)
    }

    /// Raw NTSC play interval in microseconds.
    pub fn ntsc_speed_us(&self) -> u16 {
        self.word(OFFSET_NTSC_SPEED)
    }

    /// NTSC play interval, falling back to the standard rate when the field is zero.
    pub fn frame_interval_us(&self) -> u16 {
        match self.ntsc_speed_us() {
            0 => DEFAULT_NTSC_SPEED_US,
            speed => speed,
        }
    }

    /// Raw PAL play interval in microseconds.
    pub fn pal_speed_us(&self) -> u16 {
        self.word(OFFSET_PAL_SPEED)
    }

    /// Initial 4 KiB bank numbers for 0x8000..=0xFFFF.
    pub fn bank_switch(&self) -> [u8; 8] {
        let mut banks = [0u8; 8];
        if let Some(raw) = self.view.slice(OFFSET_BANKS, banks.len()) {
            banks.copy_from_slice(raw);
        }
        banks
    }

    /// True when any bank-switch entry is nonzero.
    pub fn uses_banks(&self) -> bool {
        self.bank_switch().iter().any(|&bank| bank != 0)
    }

    /// Region byte (bit 0: PAL, bit 1: dual).
    pub fn region(&self) -> u8 {
        self.byte(OFFSET_REGION)
    }

    /// Expansion audio chip bits.
    pub fn expansion_chips(&self) -> u8 {
        self.byte(OFFSET_EXPANSION)
    }

    /// Program image following the header.
    pub fn image(&self) -> &'a [u8] {
        self.view.tail(NSF_HEADER_LEN).unwrap_or_default()
    }

    /// Emit the header summary to the log.
    pub fn log_summary(&self) {
        info!(
            "NSF v{} \"{}\" by {}, {} songs",
            self.version(),
            self.title(),
            self.artist(),
            self.song_count()
        );
        debug!(
            "load 0x{:04X} init 0x{:04X} play 0x{:04X}",
            self.load_address(),
            self.init_address(),
            self.play_address()
        );
        debug!("Nsf NTSC rate: {} us", self.ntsc_speed_us());
        debug!("bank switch: {:02X?}", self.bank_switch());
        if self.expansion_chips() != 0 {
            warn!(
                "expansion audio 0x{:02X} is not emulated",
                self.expansion_chips()
            );
        }
    }

    fn byte(&self, offset: usize) -> u8 {
        self.view.u8_at(offset).unwrap_or_default()
    }

    fn word(&self, offset: usize) -> u16 {
        self.view.u16_at(offset).unwrap_or_default()
    }

    fn text(&self, offset: usize) -> String {
        let raw = self.view.slice(offset, TEXT_FIELD_LEN).unwrap_or_default();
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).trim().to_string()
    }
}
