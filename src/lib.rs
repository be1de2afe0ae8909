//! VGM and NSF chiptune decoder
//!
//! Turns two chiptune containers into interleaved 16-bit stereo PCM:
//!
//! - **VGM**: a stream of register writes and waits for an AY-3-8910 family PSG
//!   or a NES APU.
//! - **NSF**: a 6502 program whose init and play routines drive the NES APU.
//!
//! Every chip ticks at 44100 Hz; a peak-hold converter resamples to the
//! requested output rate.
//!
//! # Crate feature flags
//! - `ay8910` (default): built-in AY-3-8910 / YM2149 model (`chip::ay8910`)
//! - `nes` (default): built-in NES 2A03 model, 6502 CPU plus APU (`chip::nes`)
//! - `cli` (opt-in): the `vgm-replayer` command line renderer
//!
//! # Quick start
//! ```no_run
//! use vgm_replayer::{Player, PlaybackStatus};
//!
//! let data = std::fs::read("song.nsf").unwrap();
//! let mut player = Player::new();
//! player.open(&data).unwrap();
//! player.set_track(2).unwrap();
//!
//! let mut pcm = vec![0u8; 8192];
//! loop {
//!     let written = player.decode_pcm(&mut pcm);
//!     if written == 0 {
//!         break;
//!     }
//!     // play or store pcm[..written]
//! }
//! if let PlaybackStatus::Halted(_) = player.status() {
//!     eprintln!("{}", player.last_error().unwrap());
//! }
//! ```
//!
//! ## Render to WAV
//! ```no_run
//! use vgm_replayer::{export::render_wav_file, Player};
//!
//! let data = std::fs::read("song.vgm").unwrap();
//! let mut player = Player::new();
//! player.open(&data).unwrap();
//! render_wav_file(&mut player, "song.wav").unwrap();
//! ```

#![warn(missing_docs)]

pub mod chip; // Sound chip traits and built-in models
pub mod config; // Player configuration
pub mod error; // Error types
pub mod export; // WAV rendering
pub mod format; // VGM / NSF / GD3 parsing
pub mod replayer; // Playback engine

pub use chip::{
    AttachedChip, CallOutcome, ChipFactory, ChipKind, ChipRequest, ChipSlot, CpuState,
    DefaultChipFactory, SoundChip, StereoSample, SubroutineChip,
};
pub use config::{ReplayerConfig, CHIP_SAMPLE_RATE};
pub use error::{CpuFault, FormatError, ProtocolError, ReplayerError, Result};
pub use export::{render_wav, ExportSummary};
pub use format::{Gd3Tags, NsfHeader, SourceFormat, VgmHeader};
pub use replayer::{HaltReason, PlaybackStatus, Player, TrackMetadata};
