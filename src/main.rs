//! Command line renderer for VGM and NSF files.
//!
//! Renders one track to a WAV file, or prints its metadata as JSON.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use vgm_replayer::export::render_wav_file;
use vgm_replayer::{PlaybackStatus, Player, ReplayerConfig};

#[derive(Parser)]
#[command(name = "vgm-replayer")]
#[command(about = "Render VGM and NSF chiptunes to WAV")]
#[command(version)]
struct Args {
    /// VGM or NSF file to play
    input: PathBuf,

    /// Output WAV file (defaults to the input name with a .wav extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Track to render (NSF only)
    #[arg(short, long, default_value_t = 0)]
    track: usize,

    /// Output sample rate in Hz
    #[arg(short, long)]
    rate: Option<u32>,

    /// Stop after this many milliseconds (0 = until the song ends)
    #[arg(short, long)]
    duration_ms: Option<u32>,

    /// Chip volume, 64 = unity
    #[arg(long)]
    volume: Option<u16>,

    /// JSON configuration file; flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print metadata as JSON instead of rendering
    #[arg(long)]
    info: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn replayer_config(&self) -> Result<ReplayerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                ReplayerConfig::from_json_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => ReplayerConfig::default(),
        };
        if let Some(rate) = self.rate {
            config.sample_rate = rate;
        }
        if let Some(duration) = self.duration_ms {
            config.max_duration_ms = duration;
        }
        if let Some(volume) = self.volume {
            config.volume = volume;
        }
        Ok(config)
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension("wav"))
    }
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(log_level(args.verbose))
        .parse_default_env()
        .init();

    let config = args.replayer_config()?;
    if config.sample_rate == 0 {
        bail!("sample rate must be greater than zero");
    }

    let data = fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let mut player = Player::with_config(config);
    let format = player
        .open(&data)
        .with_context(|| format!("opening {}", args.input.display()))?;
    info!("{} is a {format} file", args.input.display());

    if args.info {
        let metadata = player.metadata();
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    if args.track != 0 {
        player
            .set_track(args.track)
            .with_context(|| format!("starting track {}", args.track))?;
    }

    let output = args.output_path();
    let summary = render_wav_file(&mut player, &output)
        .with_context(|| format!("writing {}", output.display()))?;

    if let PlaybackStatus::Halted(_) = player.status() {
        if let Some(err) = player.last_error() {
            eprintln!("playback stopped early: {err}");
        }
    }
    println!(
        "{}: {} frames ({:.1}s) at {} Hz",
        output.display(),
        summary.frames,
        summary.duration_seconds(),
        summary.sample_rate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from(["vgm-replayer", "song.vgm", "--rate", "22050", "-d", "0"]);
        let config = args.replayer_config().unwrap();
        assert_eq!(config.sample_rate, 22_050);
        assert_eq!(config.max_duration_ms, 0);
        assert_eq!(config.volume, 64);
        assert_eq!(args.output_path(), PathBuf::from("song.wav"));
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(log_level(0), LevelFilter::Warn);
        assert_eq!(log_level(2), LevelFilter::Debug);
        assert_eq!(log_level(9), LevelFilter::Trace);
    }
}
