//! Bounds-checked little-endian reads over a borrowed buffer.

use nom::error::Error as NomError;
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::IResult;

/// Read-only window over caller-owned bytes.
///
/// Every accessor returns `None` instead of reading past the end.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
}

impl<'a> ByteView<'a> {
    /// Wrap a borrowed buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Underlying bytes.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty buffer.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte at `offset`.
    pub fn u8_at(&self, offset: usize) -> Option<u8> {
        parse_at(self.data, offset, le_u8)
    }

    /// Little-endian u16 at `offset`.
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        parse_at(self.data, offset, le_u16)
    }

    /// Little-endian u32 at `offset`.
    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        parse_at(self.data, offset, le_u32)
    }

    /// Sub-slice of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        self.data.get(offset..end)
    }

    /// Everything from `offset` to the end.
    pub fn tail(&self, offset: usize) -> Option<&'a [u8]> {
        self.data.get(offset..)
    }
}

fn parse_at<'a, T>(
    data: &'a [u8],
    offset: usize,
    parser: fn(&'a [u8]) -> IResult<&'a [u8], T, NomError<&'a [u8]>>,
) -> Option<T> {
    let input = data.get(offset..)?;
    parser(input).ok().map(|(_, value)| value)
}
