//! Single attached-chip slot and write routing.

use std::fmt;

use log::trace;

use super::{SoundChip, StereoSample, SubroutineChip};
use crate::config::DEFAULT_VOLUME;

/// Kind tag of an attached chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipKind {
    /// Register-addressable PSG.
    Psg,
    /// CPU plus audio unit driven by subroutine calls.
    CpuApu,
}

/// The chip owned by a player, tagged with its kind.
pub enum AttachedChip {
    /// Register-addressable PSG.
    Psg(Box<dyn SoundChip>),
    /// CPU plus audio unit.
    CpuApu(Box<dyn SubroutineChip>),
}

impl AttachedChip {
    /// Kind tag.
    pub fn kind(&self) -> ChipKind {
        match self {
            AttachedChip::Psg(_) => ChipKind::Psg,
            AttachedChip::CpuApu(_) => ChipKind::CpuApu,
        }
    }
}

impl fmt::Debug for AttachedChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttachedChip").field(&self.kind()).finish()
    }
}

/// Holds zero or one chip and routes writes to it.
///
/// Routed writes check the attached kind first; a write aimed at a kind that
/// is not attached is dropped.
#[derive(Debug)]
pub struct ChipSlot {
    chip: Option<AttachedChip>,
    volume: u16,
}

impl Default for ChipSlot {
    fn default() -> Self {
        Self {
            chip: None,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl ChipSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current chip. The stored volume is applied to the new chip.
    pub fn attach(&mut self, mut chip: AttachedChip) {
        match &mut chip {
            AttachedChip::Psg(psg) => psg.set_volume(self.volume),
            AttachedChip::CpuApu(apu) => apu.set_volume(self.volume),
        }
        self.chip = Some(chip);
    }

    /// Drop the current chip, if any.
    pub fn detach(&mut self) {
        self.chip = None;
    }

    /// Kind of the attached chip.
    pub fn kind(&self) -> Option<ChipKind> {
        self.chip.as_ref().map(AttachedChip::kind)
    }

    /// True when a chip is attached.
    pub fn is_attached(&self) -> bool {
        self.chip.is_some()
    }

    /// Route a PSG register write. Returns false when no PSG is attached.
    pub fn write_psg(&mut self, register: u8, value: u8) -> bool {
        match &mut self.chip {
            Some(AttachedChip::Psg(chip)) => {
                chip.write(register, value);
                true
            }
            _ => {
                trace!("dropped PSG write [0x{register:02X}] = 0x{value:02X}");
                false
            }
        }
    }

    /// Route an APU register write. Returns false when no CPU+APU chip is attached.
    pub fn write_apu(&mut self, register: u8, value: u8) -> bool {
        match &mut self.chip {
            Some(AttachedChip::CpuApu(chip)) => {
                chip.write(register, value);
                true
            }
            _ => {
                trace!("dropped APU write [0x{register:02X}] = 0x{value:02X}");
                false
            }
        }
    }

    /// Route a PSG stereo mask. Returns false when no PSG is attached.
    pub fn set_stereo_mask(&mut self, mask: u8) -> bool {
        match &mut self.chip {
            Some(AttachedChip::Psg(chip)) => {
                chip.set_stereo_mask(mask);
                true
            }
            _ => false,
        }
    }

    /// Forward a data block to whichever chip is attached.
    pub fn data_block(&mut self, kind: u8, payload: &[u8]) {
        match &mut self.chip {
            Some(AttachedChip::Psg(chip)) => chip.set_data_block(kind, payload),
            Some(AttachedChip::CpuApu(chip)) => chip.set_data_block(kind, payload),
            None => trace!("dropped data block type 0x{kind:02X}"),
        }
    }

    /// Advance the chip one tick; silence when nothing is attached.
    pub fn sample(&mut self) -> StereoSample {
        match &mut self.chip {
            Some(AttachedChip::Psg(chip)) => chip.sample(),
            Some(AttachedChip::CpuApu(chip)) => chip.sample(),
            None => StereoSample::SILENCE,
        }
    }

    /// Store and forward the volume level.
    pub fn set_volume(&mut self, level: u16) {
        self.volume = level;
        match &mut self.chip {
            Some(AttachedChip::Psg(chip)) => chip.set_volume(level),
            Some(AttachedChip::CpuApu(chip)) => chip.set_volume(level),
            None => {}
        }
    }

    /// Current volume level.
    pub fn volume(&self) -> u16 {
        self.volume
    }

    /// Tick rate of the attached chip.
    pub fn sample_frequency(&self) -> Option<u32> {
        match &self.chip {
            Some(AttachedChip::Psg(chip)) => Some(chip.sample_frequency()),
            Some(AttachedChip::CpuApu(chip)) => Some(chip.sample_frequency()),
            None => None,
        }
    }

    /// The attached CPU+APU chip, if that is the attached kind.
    pub fn subroutine_chip(&mut self) -> Option<&mut (dyn SubroutineChip + 'static)> {
        match &mut self.chip {
            Some(AttachedChip::CpuApu(chip)) => Some(chip.as_mut()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        writes: Vec<(u8, u8)>,
        blocks: Vec<(u8, usize)>,
        volume: Option<u16>,
    }

    struct RecordingPsg(Arc<Mutex<Log>>);

    impl SoundChip for RecordingPsg {
        fn write(&mut self, register: u8, value: u8) {
            self.0.lock().unwrap().writes.push((register, value));
        }
        fn sample(&mut self) -> StereoSample {
            StereoSample::new(1, 2)
        }
        fn reset(&mut self) {}
        fn set_data_block(&mut self, kind: u8, payload: &[u8]) {
            self.0.lock().unwrap().blocks.push((kind, payload.len()));
        }
        fn set_volume(&mut self, level: u16) {
            self.0.lock().unwrap().volume = Some(level);
        }
    }

    #[test]
    fn empty_slot_is_silent_and_drops_writes() {
        let mut slot = ChipSlot::new();
        assert!(!slot.write_psg(0, 1));
        assert!(!slot.write_apu(0, 1));
        assert_eq!(slot.sample(), StereoSample::SILENCE);
        assert!(slot.subroutine_chip().is_none());
        assert_eq!(slot.sample_frequency(), None);
    }

    #[test]
    fn routes_by_kind() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut slot = ChipSlot::new();
        slot.set_volume(100);
        slot.attach(AttachedChip::Psg(Box::new(RecordingPsg(log.clone()))));
        assert_eq!(slot.kind(), Some(ChipKind::Psg));
        assert!(slot.write_psg(7, 0x38));
        assert!(!slot.write_apu(0x15, 0x0F));
        slot.data_block(0xC2, &[1, 2, 3]);
        assert_eq!(slot.sample(), StereoSample::new(1, 2));

        let log = log.lock().unwrap();
        assert_eq!(log.writes, vec![(7, 0x38)]);
        assert_eq!(log.blocks, vec![(0xC2, 3)]);
        assert_eq!(log.volume, Some(100));
    }

    #[test]
    fn detach_clears_slot() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut slot = ChipSlot::new();
        slot.attach(AttachedChip::Psg(Box::new(RecordingPsg(log))));
        slot.detach();
        assert!(!slot.is_attached());
        assert_eq!(slot.kind(), None);
    }
}
