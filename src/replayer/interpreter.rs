//! VGM command stream interpreter.

use log::{debug, trace};

use super::cursor::PlaybackCursor;
use crate::chip::ChipSlot;
use crate::error::ProtocolError;
use crate::format::command::{decode_command, Command};

/// Whether decoding may continue after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSignal {
    /// More commands (or frames) follow.
    Continue,
    /// The source is exhausted.
    Stop,
}

/// Walks the command stream of one VGM buffer.
#[derive(Debug, Clone, Copy)]
pub struct CommandInterpreter<'a> {
    data: &'a [u8],
}

impl<'a> CommandInterpreter<'a> {
    /// Interpreter over a whole VGM buffer (header included).
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Decode and apply the command under the cursor.
    pub fn step(
        &self,
        cursor: &mut PlaybackCursor,
        slot: &mut ChipSlot,
    ) -> Result<StepSignal, ProtocolError> {
        let offset = cursor.offset;
        let (command, len) = decode_command(self.data, offset)?;
        trace!("0x{offset:08X}: {command:?}");
        cursor.offset = offset + len;

        match command {
            Command::Wait(ticks) | Command::DacWriteWait(ticks) => {
                cursor.pending_wait = ticks;
            }
            Command::End => match cursor.take_loop() {
                Some(target) => debug!("end of data, looping to 0x{target:08X}"),
                None => {
                    debug!("end of data at 0x{offset:08X}");
                    return Ok(StepSignal::Stop);
                }
            },
            Command::AyWrite { register, value } => {
                slot.write_psg(register, value);
            }
            Command::NesApuWrite { register, value } => {
                slot.write_apu(register, value);
            }
            Command::AyStereoMask(mask) => {
                slot.set_stereo_mask(mask);
            }
            Command::DataBlock { kind, payload } => {
                debug!("data block type 0x{kind:02X}, {} bytes", payload.len());
                slot.data_block(kind, payload);
            }
            Command::Skip { .. } => {}
        }
        Ok(StepSignal::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_wait(data: &[u8], cursor: &mut PlaybackCursor) -> Result<StepSignal, ProtocolError> {
        let interpreter = CommandInterpreter::new(data);
        let mut slot = ChipSlot::new();
        loop {
            let signal = interpreter.step(cursor, &mut slot)?;
            if signal == StepSignal::Stop || cursor.pending_wait > 0 {
                return Ok(signal);
            }
        }
    }

    #[test]
    fn wait_commands_set_pending_wait() {
        let cases: [(&[u8], u32); 6] = [
            (&[0x61, 0x10, 0x00], 17),
            (&[0x62], 735),
            (&[0x63], 882),
            (&[0x70], 1),
            (&[0x7F], 16),
            (&[0x85], 5),
        ];
        for (bytes, expected) in cases {
            let mut cursor = PlaybackCursor::new();
            cursor.start_stream(0, None);
            run_to_wait(bytes, &mut cursor).unwrap();
            assert_eq!(cursor.pending_wait, expected, "{bytes:02X?}");
            assert_eq!(cursor.offset, bytes.len());
        }
    }

    #[test]
    fn skips_unrouted_writes_and_blocks() {
        // YM2612 write, data block, AY write with no chip, end
        let data = [
            0x52, 0x28, 0x00, 0x67, 0x66, 0x00, 0x02, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xA0, 0x07,
            0x38, 0x66,
        ];
        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0, None);
        assert_eq!(run_to_wait(&data, &mut cursor), Ok(StepSignal::Stop));
        assert_eq!(cursor.offset, data.len());
    }

    #[test]
    fn zero_wait_shortcut_keeps_decoding() {
        // 0x80 waits zero ticks, so decoding continues to the next command.
        let data = [0x80, 0x71];
        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0, None);
        run_to_wait(&data, &mut cursor).unwrap();
        assert_eq!(cursor.pending_wait, 2);
        assert_eq!(cursor.offset, 2);
    }

    #[test]
    fn end_jumps_to_loop_target_once() {
        let data = [0x62, 0x66];
        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0, Some(0));
        let interpreter = CommandInterpreter::new(&data);
        let mut slot = ChipSlot::new();

        let mut signals = Vec::new();
        for _ in 0..4 {
            signals.push(interpreter.step(&mut cursor, &mut slot).unwrap());
        }
        assert_eq!(
            signals,
            vec![
                StepSignal::Continue,
                StepSignal::Continue,
                StepSignal::Continue,
                StepSignal::Stop
            ]
        );
    }

    #[test]
    fn unknown_and_truncated_commands_fail() {
        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0, None);
        assert_eq!(
            run_to_wait(&[0x80, 0x00], &mut cursor),
            Err(ProtocolError::UnknownCommand {
                opcode: 0x00,
                offset: 1
            })
        );

        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0, None);
        assert_eq!(
            run_to_wait(&[0xE0, 0x00], &mut cursor),
            Err(ProtocolError::Truncated {
                opcode: 0xE0,
                offset: 0
            })
        );

        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0, None);
        assert_eq!(
            run_to_wait(&[0x80], &mut cursor),
            Err(ProtocolError::MissingEnd { offset: 1 })
        );
    }
}
