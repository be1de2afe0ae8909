//! VGM command decoding.
//!
//! Every opcode maps to a fixed byte length except the data block (`0x67`),
//! whose payload length is stored inline. A wrong length desynchronizes the
//! rest of the stream, so unsupported chips are still decoded here even
//! though nothing acts on them.

use super::reader::ByteView;
use crate::error::ProtocolError;

/// Wait length of opcode `0x62` (1/60 s).
pub const WAIT_NTSC_FRAME: u32 = 735;
/// Wait length of opcode `0x63` (1/50 s).
pub const WAIT_PAL_FRAME: u32 = 882;

const DATA_BLOCK_HEADER_LEN: usize = 7;

/// One decoded command, borrowing any payload from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Pause for the given number of chip ticks.
    Wait(u32),
    /// YM2612 DAC write from the data bank followed by a wait (no `+1`).
    DacWriteWait(u32),
    /// End of sound data.
    End,
    /// AY8910 register write (`0xA0`).
    AyWrite {
        /// Register index.
        register: u8,
        /// Value written.
        value: u8,
    },
    /// NES APU register write (`0xB4`).
    NesApuWrite {
        /// Register index.
        register: u8,
        /// Value written.
        value: u8,
    },
    /// AY8910 stereo mask (`0x31`).
    AyStereoMask(u8),
    /// Data block (`0x67`).
    DataBlock {
        /// Block type byte.
        kind: u8,
        /// Block payload.
        payload: &'a [u8],
    },
    /// Command recognized for its length only.
    Skip {
        /// Opcode of the skipped command.
        opcode: u8,
    },
}

/// Total length in bytes (opcode included) of every fixed-size command.
///
/// Returns `None` for the data block, whose length is variable, and for
/// opcodes outside of the command table.
pub fn command_length(opcode: u8) -> Option<usize> {
    let len = match opcode {
        0x62 | 0x63 | 0x66 | 0x70..=0x8F => 1,
        0x30..=0x3F | 0x4F | 0x50 | 0x94 => 2,
        0x40..=0x4E | 0x51..=0x5F | 0x61 | 0xA0..=0xBF => 3,
        0xC0..=0xDF => 4,
        0x90 | 0x91 | 0x95 | 0xE0..=0xFF => 5,
        0x92 => 6,
        0x93 => 11,
        0x68 => 12,
        _ => return None,
    };
    Some(len)
}

/// Decode the command at `offset`, returning it with its length in bytes.
pub fn decode_command(data: &[u8], offset: usize) -> Result<(Command<'_>, usize), ProtocolError> {
    let view = ByteView::new(data);
    let opcode = view
        .u8_at(offset)
        .ok_or(ProtocolError::MissingEnd { offset })?;
    let truncated = ProtocolError::Truncated { opcode, offset };

    if opcode == 0x67 {
        let kind = view.u8_at(offset + 2).ok_or(truncated.clone())?;
        let len = view.u32_at(offset + 3).ok_or(truncated.clone())? as usize;
        let payload = view
            .slice(offset + DATA_BLOCK_HEADER_LEN, len)
            .ok_or(truncated)?;
        return Ok((
            Command::DataBlock { kind, payload },
            DATA_BLOCK_HEADER_LEN + len,
        ));
    }

    let len = command_length(opcode).ok_or(ProtocolError::UnknownCommand { opcode, offset })?;
    let operands = view.slice(offset + 1, len - 1).ok_or(truncated)?;

    let command = match opcode {
        0x61 => Command::Wait(u16::from_le_bytes([operands[0], operands[1]]) as u32 + 1),
        0x62 => Command::Wait(WAIT_NTSC_FRAME),
        0x63 => Command::Wait(WAIT_PAL_FRAME),
        0x66 => Command::End,
        0x70..=0x7F => Command::Wait((opcode & 0x0F) as u32 + 1),
        0x80..=0x8F => Command::DacWriteWait((opcode & 0x0F) as u32),
        0x31 => Command::AyStereoMask(operands[0]),
        0xA0 => Command::AyWrite {
            register: operands[0],
            value: operands[1],
        },
        0xB4 => Command::NesApuWrite {
            register: operands[0],
            value: operands[1],
        },
        _ => Command::Skip { opcode },
    };
    Ok((command, len))
}
