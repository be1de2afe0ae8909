//! Container formats: VGM command streams and NSF program images.
//!
//! Both headers are zero-copy views over the caller's buffer.

pub mod command;
pub mod gd3;
pub mod nsf;
pub mod reader;
pub mod vgm;

pub use command::{command_length, decode_command, Command};
pub use gd3::{parse_gd3, Gd3Tags};
pub use nsf::NsfHeader;
pub use reader::ByteView;
pub use vgm::VgmHeader;

use std::fmt;

/// Which container an opened buffer turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// Register-write command stream.
    Vgm,
    /// 6502 program driven by init/play subroutines.
    Nsf,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Vgm => write!(f, "VGM"),
            SourceFormat::Nsf => write!(f, "NSF"),
        }
    }
}
