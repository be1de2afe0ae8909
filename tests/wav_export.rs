mod common;

use common::{ay_vgm, vgm};
use vgm_replayer::export::render_wav_file;
use vgm_replayer::Player;

#[test]
fn renders_file_at_player_rate() {
    let data = ay_vgm(&[0xA0, 0x08, 0x0F, 0x63, 0x66], 0x10);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.wav");

    let mut player = Player::new();
    player.set_sample_frequency(22_050);
    player.open(&data).unwrap();
    let summary = render_wav_file(&mut player, &path).unwrap();
    assert_eq!(summary.frames, 441);
    assert_eq!(summary.sample_rate, 22_050);

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 22_050);
    assert_eq!(spec.bits_per_sample, 16);
    let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(samples.len(), 882);
    assert!(samples.iter().any(|&s| s != 0));
}

#[test]
fn unwritable_path_is_io_error() {
    let data = vgm(&[0x62, 0x66], None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.wav");

    let mut player = Player::new();
    player.open(&data).unwrap();
    let err = render_wav_file(&mut player, &path).unwrap_err();
    assert!(matches!(err, vgm_replayer::ReplayerError::Io(_)));
}
