//! Error handling for the VGM/NSF replayer.

use thiserror::Error;

/// Convenient result alias for parsing and playback.
pub type Result<T> = std::result::Result<T, ReplayerError>;

/// Top-level error type returned by the public API.
#[derive(Debug, Error)]
pub enum ReplayerError {
    /// Neither container format accepted the buffer, or a header was inconsistent.
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    /// Command stream could not be decoded any further.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Emulated CPU failed while running a subroutine.
    #[error("cpu fault: {0}")]
    Cpu(#[from] CpuFault),
    /// Subroutine did not return within its instruction budget.
    #[error("subroutine at 0x{address:04x} exceeded its budget of {budget} instructions")]
    BudgetExhausted {
        /// Entry address of the subroutine.
        address: u16,
        /// Instruction budget that was exhausted.
        budget: u32,
    },
    /// Operation requires an open file.
    #[error("no file is open")]
    NotOpen,
    /// WAV export failed.
    #[error("audio file write error: {0}")]
    AudioFile(#[from] hound::Error),
    /// Configuration could not be read.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// IO error from filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections raised while validating a container header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Buffer too small to contain the header.
    #[error("buffer of {actual} bytes is smaller than the {required}-byte header")]
    TooShort {
        /// Minimum size for this header.
        required: usize,
        /// Size of the provided buffer.
        actual: usize,
    },
    /// Magic identifier at offset 0 does not match.
    #[error("bad magic 0x{found:08x}, expected 0x{expected:08x}")]
    BadMagic {
        /// Expected identifier.
        expected: u32,
        /// Identifier found in the buffer.
        found: u32,
    },
    /// EOF offset field disagrees with the buffer length.
    #[error("EOF offset 0x{field:08x} does not match buffer length {len}")]
    EofMismatch {
        /// Value of the EOF offset field.
        field: u32,
        /// Length of the provided buffer.
        len: usize,
    },
    /// Command data would start outside of the buffer.
    #[error("data offset 0x{offset:08x} lies outside of the buffer")]
    DataOutOfRange {
        /// Absolute data start offset.
        offset: usize,
    },
    /// No chip model is available for a format that needs one.
    #[error("no {kind} chip is available")]
    ChipUnavailable {
        /// Human-readable chip kind.
        kind: &'static str,
    },
    /// Neither format recognized the buffer.
    #[error("unrecognized file (stream: {stream}; subroutine: {subroutine})")]
    Unrecognized {
        /// Why the stream format rejected the buffer.
        stream: Box<FormatError>,
        /// Why the subroutine format rejected the buffer.
        subroutine: Box<FormatError>,
    },
    /// The init subroutine failed while opening.
    #[error("init subroutine failed: {reason}")]
    InitFailed {
        /// Description of the failure.
        reason: String,
    },
}

/// Errors raised while walking a command stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Opcode is not part of the command table.
    #[error("unknown command 0x{opcode:02x} at offset 0x{offset:08x}")]
    UnknownCommand {
        /// Offending opcode.
        opcode: u8,
        /// Absolute offset of the opcode.
        offset: usize,
    },
    /// Command operands extend past the end of the buffer.
    #[error("command 0x{opcode:02x} at offset 0x{offset:08x} is truncated")]
    Truncated {
        /// Opcode whose operands are missing.
        opcode: u8,
        /// Absolute offset of the opcode.
        offset: usize,
    },
    /// Cursor ran off the end of the buffer without an end command.
    #[error("stream ended at offset 0x{offset:08x} without an end command")]
    MissingEnd {
        /// Offset where decoding stopped.
        offset: usize,
    },
}

/// Faults reported by an emulated CPU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuFault {
    /// Opcode is not implemented by the CPU core.
    #[error("illegal opcode 0x{opcode:02x} at 0x{pc:04x}")]
    IllegalOpcode {
        /// Offending opcode.
        opcode: u8,
        /// Program counter of the opcode.
        pc: u16,
    },
    /// The CPU executed a halting instruction.
    #[error("CPU jammed at 0x{pc:04x}")]
    Jammed {
        /// Program counter where the CPU stopped.
        pc: u16,
    },
}
