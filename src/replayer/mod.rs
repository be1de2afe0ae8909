//! Playback engine.
//!
//! [`Player`] opens a VGM or NSF buffer, attaches the chip its header asks
//! for and renders interleaved 16-bit stereo PCM on demand:
//!
//! ```no_run
//! use vgm_replayer::Player;
//!
//! let data = std::fs::read("song.vgm").unwrap();
//! let mut player = Player::new();
//! player.open(&data).unwrap();
//! let mut pcm = vec![0u8; 4096];
//! while player.decode_pcm(&mut pcm) > 0 {
//!     // hand the bytes to an audio sink
//! }
//! ```

pub mod cursor;
pub mod driver;
pub mod interpreter;
pub mod synth;

pub use cursor::PlaybackCursor;
pub use driver::PlaybackDriver;
pub use interpreter::{CommandInterpreter, StepSignal};
pub use synth::RateConverter;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::chip::{ChipFactory, ChipRequest, ChipSlot, DefaultChipFactory};
use crate::config::{duration_to_ticks, ReplayerConfig, CHIP_SAMPLE_RATE};
use crate::error::{CpuFault, FormatError, ProtocolError, ReplayerError, Result};
use crate::format::{parse_gd3, NsfHeader, SourceFormat, VgmHeader};

/// Why playback stopped for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The command stream could not be decoded.
    Protocol(ProtocolError),
    /// The CPU faulted inside a subroutine.
    Cpu(CpuFault),
    /// A subroutine ran past its instruction budget.
    BudgetExhausted {
        /// Entry address of the subroutine.
        address: u16,
        /// Budget that ran out.
        budget: u32,
    },
    /// No CPU+APU chip is attached.
    ChipUnavailable,
}

impl From<HaltReason> for ReplayerError {
    fn from(reason: HaltReason) -> Self {
        match reason {
            HaltReason::Protocol(err) => ReplayerError::Protocol(err),
            HaltReason::Cpu(fault) => ReplayerError::Cpu(fault),
            HaltReason::BudgetExhausted { address, budget } => {
                ReplayerError::BudgetExhausted { address, budget }
            }
            HaltReason::ChipUnavailable => ReplayerError::Format(FormatError::ChipUnavailable {
                kind: "CPU+APU",
            }),
        }
    }
}

/// Player state as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// No file is open.
    Idle,
    /// Decoding produces audio.
    Playing,
    /// The source ended or the duration cap was reached.
    Finished,
    /// Decoding stopped on an error; close and reopen to recover.
    Halted(HaltReason),
}

/// Descriptive information about the open file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackMetadata {
    /// Song or game title.
    pub title: String,
    /// Composer.
    pub author: String,
    /// Target system or copyright line.
    pub system: String,
    /// Container format name.
    pub format: String,
    /// Number of tracks.
    pub track_count: usize,
    /// Length of one pass, when the container records it.
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    None,
    Vgm(VgmHeader<'a>),
    Nsf(NsfHeader<'a>),
}

/// VGM/NSF player over a caller-owned buffer.
pub struct Player<'a> {
    config: ReplayerConfig,
    factory: Box<dyn ChipFactory>,
    slot: ChipSlot,
    source: Source<'a>,
    cursor: PlaybackCursor,
    synth: RateConverter,
    status: PlaybackStatus,
}

impl Default for Player<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Player<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("config", &self.config)
            .field("format", &self.format())
            .field("chip", &self.slot.kind())
            .field("cursor", &self.cursor)
            .field("status", &self.status)
            .finish()
    }
}

impl<'a> Player<'a> {
    /// Player with default configuration and the built-in chips.
    pub fn new() -> Self {
        Self::with_config(ReplayerConfig::default())
    }

    /// Player with `config` and the built-in chips.
    pub fn with_config(config: ReplayerConfig) -> Self {
        Self::with_factory(config, Box::new(DefaultChipFactory))
    }

    /// Player building its chips through `factory`.
    ///
    /// An output rate of 0 falls back to [`CHIP_SAMPLE_RATE`].
    pub fn with_factory(mut config: ReplayerConfig, factory: Box<dyn ChipFactory>) -> Self {
        if config.sample_rate == 0 {
            warn!("output rate of 0 Hz, using {CHIP_SAMPLE_RATE} Hz");
            config.sample_rate = CHIP_SAMPLE_RATE;
        }
        let mut slot = ChipSlot::new();
        slot.set_volume(config.volume);
        let mut cursor = PlaybackCursor::new();
        cursor.set_max_ticks(config.max_duration_ticks());
        Self {
            config,
            factory,
            slot,
            source: Source::None,
            cursor,
            synth: RateConverter::new(config.sample_rate),
            status: PlaybackStatus::Idle,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &ReplayerConfig {
        &self.config
    }

    /// Open `data`, trying VGM first and NSF second.
    ///
    /// Any previously open file is closed first. On failure the player is left closed.
    pub fn open(&mut self, data: &'a [u8]) -> Result<SourceFormat> {
        self.close();
        let result = match VgmHeader::parse(data) {
            Ok(header) => self.open_vgm(header).map(|_| SourceFormat::Vgm),
            Err(stream) => match NsfHeader::parse(data) {
                Ok(header) => self.open_nsf(header).map(|_| SourceFormat::Nsf),
                Err(subroutine) => {
                    debug!("not VGM: {stream}");
                    debug!("not NSF: {subroutine}");
                    Err(FormatError::Unrecognized {
                        stream: Box::new(stream),
                        subroutine: Box::new(subroutine),
                    }
                    .into())
                }
            },
        };
        match result {
            Ok(format) => {
                self.status = PlaybackStatus::Playing;
                info!("opened {format} file");
                Ok(format)
            }
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    fn open_vgm(&mut self, header: VgmHeader<'a>) -> Result<()> {
        header.log_summary();
        if let Some(request) = header.chip_request() {
            match self.factory.create(request) {
                Some(chip) => self.slot.attach(chip),
                None => warn!("no chip model for {request:?}, playing silence"),
            }
        } else {
            warn!("no supported chip clock in header");
        }
        self.cursor
            .start_stream(header.data_start(), header.loop_target());
        self.synth.reset();
        self.source = Source::Vgm(header);
        self.check_chip_rate();
        Ok(())
    }

    fn open_nsf(&mut self, header: NsfHeader<'a>) -> Result<()> {
        header.log_summary();
        let chip = self
            .factory
            .create(ChipRequest::CpuApu { clock: None })
            .ok_or(FormatError::ChipUnavailable { kind: "CPU+APU" })?;
        self.slot.attach(chip);
        self.source = Source::Nsf(header);
        self.synth.reset();
        self.check_chip_rate();
        let driver = PlaybackDriver::new(header, self.config.instruction_budget);
        driver
            .set_track(0, &mut self.slot, &mut self.cursor)
            .map_err(|reason| FormatError::InitFailed {
                reason: ReplayerError::from(reason).to_string(),
            })?;
        Ok(())
    }

    /// Release the chip and forget the buffer.
    pub fn close(&mut self) {
        self.slot.detach();
        self.source = Source::None;
        self.cursor.clear();
        self.synth.reset();
        self.status = PlaybackStatus::Idle;
    }

    /// Select a track and restart playback from its beginning.
    ///
    /// NSF tracks at or past the song count fall back to track 0. VGM files
    /// have a single track: any index rewinds the stream.
    pub fn set_track(&mut self, index: usize) -> Result<()> {
        match self.source {
            Source::None => Err(ReplayerError::NotOpen),
            Source::Vgm(header) => {
                debug!("VGM has one track, rewinding (requested {index})");
                self.cursor
                    .start_stream(header.data_start(), header.loop_target());
                self.synth.reset();
                self.status = PlaybackStatus::Playing;
                Ok(())
            }
            Source::Nsf(header) => {
                let driver = PlaybackDriver::new(header, self.config.instruction_budget);
                self.synth.reset();
                match driver.set_track(index, &mut self.slot, &mut self.cursor) {
                    Ok(()) => {
                        self.status = PlaybackStatus::Playing;
                        Ok(())
                    }
                    Err(reason) => {
                        self.status = PlaybackStatus::Halted(reason.clone());
                        Err(reason.into())
                    }
                }
            }
        }
    }

    /// Render up to `out.len()` bytes of interleaved little-endian 16-bit stereo.
    ///
    /// Returns the number of bytes written, always a multiple of 4. Zero means
    /// the source is exhausted, the duration cap was reached or playback halted.
    pub fn decode_pcm(&mut self, out: &mut [u8]) -> usize {
        if self.status != PlaybackStatus::Playing {
            return 0;
        }
        let capacity = out.len() - out.len() % synth::FRAME_BYTES;
        let out = &mut out[..capacity];
        let mut written = 0;

        loop {
            written += self.synth.drain_into(&mut out[written..]);
            if self.synth.owed_frames() > 0 || written == capacity {
                break;
            }
            if self.cursor.cap_reached() {
                info!("duration cap reached after {} ticks", self.cursor.samples_played());
                self.status = PlaybackStatus::Finished;
                break;
            }
            if self.cursor.pending_wait == 0 {
                match self.advance() {
                    Ok(StepSignal::Continue) => continue,
                    Ok(StepSignal::Stop) => {
                        self.status = PlaybackStatus::Finished;
                        break;
                    }
                    Err(reason) => {
                        error!("playback halted: {}", ReplayerError::from(reason.clone()));
                        self.status = PlaybackStatus::Halted(reason);
                        break;
                    }
                }
            }
            let sample = self.slot.sample();
            self.cursor.tick();
            self.synth.push(sample);
        }
        written
    }

    fn advance(&mut self) -> std::result::Result<StepSignal, HaltReason> {
        match self.source {
            Source::Vgm(header) => CommandInterpreter::new(header.bytes())
                .step(&mut self.cursor, &mut self.slot)
                .map_err(HaltReason::Protocol),
            Source::Nsf(header) => PlaybackDriver::new(header, self.config.instruction_budget)
                .play_frame(&mut self.slot, &mut self.cursor),
            Source::None => Ok(StepSignal::Stop),
        }
    }

    /// Set the chip volume; 64 is unity.
    pub fn set_volume(&mut self, level: u16) {
        self.config.volume = level;
        self.slot.set_volume(level);
    }

    /// Set the output sample rate in Hz. Zero is rejected.
    pub fn set_sample_frequency(&mut self, rate: u32) {
        if rate == 0 {
            warn!("ignoring output rate of 0 Hz");
            return;
        }
        self.config.sample_rate = rate;
        self.synth.set_output_rate(rate);
        self.check_chip_rate();
    }

    /// Output sample rate in Hz.
    pub fn sample_frequency(&self) -> u32 {
        self.synth.output_rate()
    }

    /// Cap playback at `milliseconds` of chip time; 0 removes the cap.
    pub fn set_max_duration(&mut self, milliseconds: u32) {
        self.config.max_duration_ms = milliseconds;
        self.cursor.set_max_ticks(duration_to_ticks(milliseconds));
    }

    /// Number of tracks: 0 when closed, 1 for VGM, the song count for NSF.
    pub fn track_count(&self) -> usize {
        match self.source {
            Source::None => 0,
            Source::Vgm(_) => 1,
            Source::Nsf(header) => header.song_count() as usize,
        }
    }

    /// Current state.
    pub fn status(&self) -> &PlaybackStatus {
        &self.status
    }

    /// The error that halted playback, if any.
    pub fn last_error(&self) -> Option<ReplayerError> {
        match &self.status {
            PlaybackStatus::Halted(reason) => Some(reason.clone().into()),
            _ => None,
        }
    }

    /// Chip ticks rendered since open or the last track change.
    pub fn samples_played(&self) -> u64 {
        self.cursor.samples_played()
    }

    /// Format of the open file.
    pub fn format(&self) -> Option<SourceFormat> {
        match self.source {
            Source::None => None,
            Source::Vgm(_) => Some(SourceFormat::Vgm),
            Source::Nsf(_) => Some(SourceFormat::Nsf),
        }
    }

    /// Title, author and length of the open file.
    ///
    /// VGM files without a readable GD3 block report empty strings.
    pub fn metadata(&self) -> TrackMetadata {
        match self.source {
            Source::None => TrackMetadata::default(),
            Source::Vgm(header) => {
                let tags = header
                    .gd3_offset()
                    .and_then(|offset| parse_gd3(header.bytes(), offset))
                    .unwrap_or_default();
                let title = if tags.track_name.is_empty() {
                    tags.game_name
                } else {
                    tags.track_name
                };
                let total = header.total_samples();
                TrackMetadata {
                    title,
                    author: tags.author,
                    system: tags.system_name,
                    format: SourceFormat::Vgm.to_string(),
                    track_count: 1,
                    duration_seconds: (total > 0)
                        .then(|| total as f64 / CHIP_SAMPLE_RATE as f64),
                }
            }
            Source::Nsf(header) => TrackMetadata {
                title: header.title(),
                author: header.artist(),
                system: header.copyright(),
                format: SourceFormat::Nsf.to_string(),
                track_count: header.song_count() as usize,
                duration_seconds: None,
            },
        }
    }

    fn check_chip_rate(&self) {
        if let Some(rate) = self.slot.sample_frequency() {
            if rate != CHIP_SAMPLE_RATE {
                error!("chip must run at {CHIP_SAMPLE_RATE} Hz, reports {rate} Hz");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{SoundChip, StereoSample, SubroutineChip};

    fn minimal_vgm(commands: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"Vgm ");
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0x150u32.to_le_bytes());
        data.resize(0x40, 0);
        data.extend_from_slice(commands);
        let eof = (data.len() - 4) as u32;
        data[4..8].copy_from_slice(&eof.to_le_bytes());
        data
    }

    #[test]
    fn closed_player_reports_idle() {
        let mut player = Player::new();
        assert_eq!(player.status(), &PlaybackStatus::Idle);
        assert_eq!(player.track_count(), 0);
        assert_eq!(player.format(), None);
        assert!(matches!(player.set_track(0), Err(ReplayerError::NotOpen)));
        assert_eq!(player.decode_pcm(&mut [0u8; 16]), 0);
    }

    #[test]
    fn wait_renders_silence_without_chip() {
        let data = minimal_vgm(&[0x70 | 9, 0x66]);
        let mut player = Player::new();
        assert_eq!(player.open(&data).unwrap(), SourceFormat::Vgm);
        let mut out = [0xFFu8; 64];
        assert_eq!(player.decode_pcm(&mut out), 40);
        assert!(out[..40].iter().all(|&b| b == 0));
        assert_eq!(player.decode_pcm(&mut out), 0);
        assert_eq!(player.status(), &PlaybackStatus::Finished);
        assert_eq!(player.samples_played(), 10);
    }

    #[test]
    fn partial_frames_are_not_written() {
        let data = minimal_vgm(&[0x62, 0x66]);
        let mut player = Player::new();
        player.open(&data).unwrap();
        let mut out = [0u8; 7];
        assert_eq!(player.decode_pcm(&mut out), 4);
    }

    #[test]
    fn protocol_error_halts_after_draining() {
        let data = minimal_vgm(&[0x71, 0x00]);
        let mut player = Player::new();
        player.open(&data).unwrap();
        let mut out = [0u8; 64];
        assert_eq!(player.decode_pcm(&mut out), 8);
        assert!(matches!(player.status(), PlaybackStatus::Halted(_)));
        assert!(matches!(
            player.last_error(),
            Some(ReplayerError::Protocol(ProtocolError::UnknownCommand { opcode: 0x00, .. }))
        ));
        assert_eq!(player.decode_pcm(&mut out), 0);
    }

    struct ConstantPsg(u16);

    impl SoundChip for ConstantPsg {
        fn write(&mut self, _register: u8, value: u8) {
            self.0 = value as u16 * 100;
        }
        fn sample(&mut self) -> StereoSample {
            StereoSample::mono(self.0)
        }
        fn reset(&mut self) {}
        fn set_volume(&mut self, _level: u16) {}
    }

    struct ConstantFactory;

    impl ChipFactory for ConstantFactory {
        fn create_psg(&self, _clock: u32, _variant: u8, _flags: u8) -> Option<Box<dyn SoundChip>> {
            Some(Box::new(ConstantPsg(0)))
        }
        fn create_cpu_apu(&self, _clock: Option<u32>) -> Option<Box<dyn SubroutineChip>> {
            None
        }
    }

    #[test]
    fn custom_factory_receives_writes() {
        // 1.61 header so the AY clock field lies before the command data.
        let mut data = vec![0u8; 0x80];
        data[..4].copy_from_slice(b"Vgm ");
        data[0x08..0x0C].copy_from_slice(&0x161u32.to_le_bytes());
        data[0x34..0x38].copy_from_slice(&(0x80u32 - 0x34).to_le_bytes());
        data[0x74..0x78].copy_from_slice(&1_789_772u32.to_le_bytes());
        data.extend_from_slice(&[0xA0, 0x08, 0x05, 0x71, 0x66]);
        let eof = (data.len() - 4) as u32;
        data[4..8].copy_from_slice(&eof.to_le_bytes());

        let mut player = Player::with_factory(ReplayerConfig::default(), Box::new(ConstantFactory));
        player.open(&data).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(player.decode_pcm(&mut out), 8);
        assert_eq!(&out[..4], &StereoSample::mono(500).to_le_bytes());
        assert_eq!(&out[4..], &StereoSample::mono(500).to_le_bytes());
    }

    #[test]
    fn nsf_without_cpu_chip_fails_to_open() {
        let mut data = vec![0u8; 0x80];
        data[..5].copy_from_slice(b"NESM\x1A");
        data[6] = 1;
        let mut player = Player::with_factory(ReplayerConfig::default(), Box::new(ConstantFactory));
        let err = player.open(&data).unwrap_err();
        assert!(matches!(
            err,
            ReplayerError::Format(FormatError::ChipUnavailable { .. })
        ));
        assert_eq!(player.status(), &PlaybackStatus::Idle);
        assert_eq!(player.format(), None);
    }
}
