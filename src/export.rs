//! WAV file export.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use log::info;

use crate::error::Result;
use crate::replayer::{synth::FRAME_BYTES, Player};

/// Bytes decoded per chunk.
const CHUNK_BYTES: usize = 4096 * FRAME_BYTES;

/// Outcome of a finished export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSummary {
    /// Stereo frames written.
    pub frames: u64,
    /// Output rate of the file in Hz.
    pub sample_rate: u32,
}

impl ExportSummary {
    /// Length of the rendered audio.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames as f64 / self.sample_rate as f64
        }
    }
}

/// Decode `player` until it stops and write the PCM as a 16-bit stereo WAV stream.
///
/// The player must already be open. Samples are stored bit-for-bit as produced by
/// [`Player::decode_pcm`].
pub fn render_wav<W: Write + Seek>(player: &mut Player<'_>, writer: W) -> Result<ExportSummary> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: player.sample_frequency(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav = hound::WavWriter::new(writer, spec)?;

    let mut buffer = vec![0u8; CHUNK_BYTES];
    let mut frames = 0u64;
    loop {
        let written = player.decode_pcm(&mut buffer);
        if written == 0 {
            break;
        }
        for pair in buffer[..written].chunks_exact(2) {
            wav.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        frames += (written / FRAME_BYTES) as u64;
    }
    wav.finalize()?;

    let summary = ExportSummary {
        frames,
        sample_rate: spec.sample_rate,
    };
    info!(
        "rendered {} frames ({:.1}s) at {} Hz",
        summary.frames,
        summary.duration_seconds(),
        summary.sample_rate
    );
    Ok(summary)
}

/// Render `player` into a WAV file at `path`.
pub fn render_wav_file<P: AsRef<Path>>(player: &mut Player<'_>, path: P) -> Result<ExportSummary> {
    let file = File::create(path.as_ref())?;
    info!("writing WAV file to {}", path.as_ref().display());
    render_wav(player, BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wait_then_end(ticks: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"Vgm ");
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0x150u32.to_le_bytes());
        data.resize(0x40, 0);
        data.push(0x61);
        data.extend_from_slice(&ticks.to_le_bytes());
        data.push(0x66);
        let eof = (data.len() - 4) as u32;
        data[4..8].copy_from_slice(&eof.to_le_bytes());
        data
    }

    #[test]
    fn writes_one_frame_per_tick() {
        let data = wait_then_end(10_000);
        let mut player = Player::new();
        player.open(&data).unwrap();

        let mut cursor = Cursor::new(Vec::new());
        let summary = render_wav(&mut player, &mut cursor).unwrap();
        assert_eq!(summary.frames, 10_000);
        assert_eq!(summary.sample_rate, 44_100);

        cursor.set_position(0);
        let reader = hound::WavReader::new(cursor).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.len(), 20_000);
    }

    #[test]
    fn duration_uses_output_rate() {
        let summary = ExportSummary {
            frames: 22_050,
            sample_rate: 22_050,
        };
        assert_eq!(summary.duration_seconds(), 1.0);
    }
}
