#![allow(dead_code)]

use vgm_replayer::Player;

pub const AY_CLOCK: u32 = 1_789_772;

/// 1.50 VGM with a 64-byte header, commands at 0x40 and no chip clocks.
pub fn vgm(commands: &[u8], loop_target: Option<usize>) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"Vgm ");
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0x150u32.to_le_bytes());
    data.resize(0x40, 0);
    data.extend_from_slice(commands);
    if let Some(target) = loop_target {
        data[0x1C..0x20].copy_from_slice(&((target - 0x1C) as u32).to_le_bytes());
    }
    patch_eof(&mut data);
    data
}

/// 1.61 VGM with a 128-byte header and an AY8910 of the given type.
pub fn ay_vgm(commands: &[u8], ay_type: u8) -> Vec<u8> {
    let mut data = vec![0u8; 0x80];
    data[..4].copy_from_slice(b"Vgm ");
    data[0x08..0x0C].copy_from_slice(&0x161u32.to_le_bytes());
    data[0x34..0x38].copy_from_slice(&(0x80u32 - 0x34).to_le_bytes());
    data[0x74..0x78].copy_from_slice(&AY_CLOCK.to_le_bytes());
    data[0x78] = ay_type;
    data.extend_from_slice(commands);
    patch_eof(&mut data);
    data
}

fn patch_eof(data: &mut [u8]) {
    let eof = (data.len() - 4) as u32;
    data[4..8].copy_from_slice(&eof.to_le_bytes());
}

/// NSF loading `image` at 0x8000 with the given init and play addresses.
pub fn nsf(songs: u8, init: u16, play: u16, image: &[u8]) -> Vec<u8> {
    banked_nsf(songs, init, play, [0; 8], image)
}

/// Like [`nsf`], with an initial bank table for 0x8000..=0xFFFF.
pub fn banked_nsf(songs: u8, init: u16, play: u16, banks: [u8; 8], image: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 0x80];
    data[..5].copy_from_slice(b"NESM\x1A");
    data[5] = 1;
    data[6] = songs;
    data[7] = 1;
    data[0x08..0x0A].copy_from_slice(&0x8000u16.to_le_bytes());
    data[0x0A..0x0C].copy_from_slice(&init.to_le_bytes());
    data[0x0C..0x0E].copy_from_slice(&play.to_le_bytes());
    data[0x0E..0x0E + 4].copy_from_slice(b"Test");
    data[0x2E..0x2E + 6].copy_from_slice(b"Nobody");
    data[0x6E..0x70].copy_from_slice(&16_639u16.to_le_bytes());
    data[0x70..0x78].copy_from_slice(&banks);
    data.extend_from_slice(image);
    data
}

/// Decode until the player stops, `chunk` bytes at a time.
pub fn decode_all(player: &mut Player<'_>, chunk: usize) -> Vec<u8> {
    let mut pcm = Vec::new();
    let mut buffer = vec![0u8; chunk];
    loop {
        let written = player.decode_pcm(&mut buffer);
        if written == 0 {
            return pcm;
        }
        assert_eq!(written % 4, 0);
        pcm.extend_from_slice(&buffer[..written]);
    }
}

/// Split interleaved PCM into (left, right) pairs.
pub fn frames(pcm: &[u8]) -> Vec<(u16, u16)> {
    pcm.chunks_exact(4)
        .map(|f| {
            (
                u16::from_le_bytes([f[0], f[1]]),
                u16::from_le_bytes([f[2], f[3]]),
            )
        })
        .collect()
}
