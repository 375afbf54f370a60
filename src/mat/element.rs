//! Tagged data elements of the level-5 format.

use super::ReadMatError;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use std::io::Read;

pub(crate) const MI_INT8: u32 = 1;
pub(crate) const MI_UINT8: u32 = 2;
pub(crate) const MI_INT16: u32 = 3;
pub(crate) const MI_UINT16: u32 = 4;
pub(crate) const MI_INT32: u32 = 5;
pub(crate) const MI_UINT32: u32 = 6;
pub(crate) const MI_SINGLE: u32 = 7;
pub(crate) const MI_DOUBLE: u32 = 9;
pub(crate) const MI_INT64: u32 = 12;
pub(crate) const MI_UINT64: u32 = 13;
pub(crate) const MI_MATRIX: u32 = 14;
pub(crate) const MI_COMPRESSED: u32 = 15;
pub(crate) const MI_UTF8: u32 = 16;
pub(crate) const MI_UTF16: u32 = 17;
pub(crate) const MI_UTF32: u32 = 18;

/// Size of a tag, and so the least space any element takes.
pub(crate) const TAG_LEN: usize = 8;

/// Byte order of a file, taken from the header's endian indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

macro_rules! endian_readers {
    ($($name:ident -> $ty:ty),*) => {
        impl Endian {
            $(
                pub(crate) fn $name(self, buf: &[u8]) -> $ty {
                    match self {
                        Endian::Little => LittleEndian::$name(buf),
                        Endian::Big => BigEndian::$name(buf),
                    }
                }
            )*
        }
    };
}

endian_readers!(
    read_u16 -> u16,
    read_i16 -> i16,
    read_u32 -> u32,
    read_i32 -> i32,
    read_u64 -> u64,
    read_i64 -> i64,
    read_f32 -> f32,
    read_f64 -> f64
);

/// A data element with its tag decoded.
#[derive(Debug)]
pub(crate) struct Element<'a> {
    pub data_type: u32,
    pub data: &'a [u8],
}

impl<'a> Element<'a> {
    /// Inflates an `miCOMPRESSED` element; the result holds exactly one
    /// tagged element.
    pub fn decompress(&self) -> Result<Vec<u8>, ReadMatError> {
        let mut out = Vec::new();
        ZlibDecoder::new(self.data)
            .read_to_end(&mut out)
            .map_err(ReadMatError::Decompress)?;
        Ok(out)
    }

    pub fn expect_type(self, data_type: u32) -> Result<Self, ReadMatError> {
        if self.data_type == data_type {
            Ok(self)
        } else {
            Err(ReadMatError::UnexpectedElement {
                expected: type_name(data_type),
                found: self.data_type,
            })
        }
    }

    /// Decodes integer-typed data into `i64`s.
    pub fn to_i64_vec(&self, endian: Endian) -> Result<Vec<i64>, ReadMatError> {
        Ok(self.to_f64_vec(endian)?.into_iter().map(|v| v as i64).collect())
    }

    /// Decodes numeric data of any storage type into `f64`s.
    pub fn to_f64_vec(&self, endian: Endian) -> Result<Vec<f64>, ReadMatError> {
        let data = self.data;
        let (size, decode): (usize, fn(Endian, &[u8]) -> f64) = match self.data_type {
            MI_INT8 => (1, |_, b| b[0] as i8 as f64),
            MI_UINT8 | MI_UTF8 => (1, |_, b| b[0] as f64),
            MI_INT16 => (2, |e, b| e.read_i16(b) as f64),
            MI_UINT16 | MI_UTF16 => (2, |e, b| e.read_u16(b) as f64),
            MI_INT32 => (4, |e, b| e.read_i32(b) as f64),
            MI_UINT32 | MI_UTF32 => (4, |e, b| e.read_u32(b) as f64),
            MI_SINGLE => (4, |e, b| e.read_f32(b) as f64),
            MI_DOUBLE => (8, |e, b| e.read_f64(b)),
            MI_INT64 => (8, |e, b| e.read_i64(b) as f64),
            MI_UINT64 => (8, |e, b| e.read_u64(b) as f64),
            other => {
                return Err(ReadMatError::UnexpectedElement {
                    expected: "numeric data",
                    found: other,
                })
            }
        };
        if data.len() % size != 0 {
            return Err(ReadMatError::LengthMismatch {
                expected: data.len() - data.len() % size,
                found: data.len(),
            });
        }
        Ok(data.chunks_exact(size).map(|b| decode(endian, b)).collect())
    }
}

/// Sequential reader over the tagged elements in a byte buffer.
pub(crate) struct ElementReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ElementReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        ElementReader {
            buf,
            pos: 0,
            endian,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Number of bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ReadMatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ReadMatError::Truncated)?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn next_element(&mut self) -> Result<Element<'a>, ReadMatError> {
        let first = self.endian.read_u32(self.take(4)?);
        // Small data element: byte count in the upper half, data packed into
        // the second word of the tag.
        let small_len = (first >> 16) as usize;
        if small_len != 0 {
            if small_len > 4 {
                return Err(ReadMatError::LengthMismatch {
                    expected: 4,
                    found: small_len,
                });
            }
            let packed = self.take(4)?;
            return Ok(Element {
                data_type: first & 0xffff,
                data: &packed[..small_len],
            });
        }
        let len = self.endian.read_u32(self.take(4)?) as usize;
        let data = self.take(len)?;
        // Compressed elements are not padded.
        if first != MI_COMPRESSED {
            let padding = (TAG_LEN - len % TAG_LEN) % TAG_LEN;
            self.pos = (self.pos + padding).min(self.buf.len());
        }
        Ok(Element {
            data_type: first,
            data,
        })
    }

    pub fn expect(&mut self, data_type: u32) -> Result<Element<'a>, ReadMatError> {
        self.next_element()?.expect_type(data_type)
    }
}

pub(crate) fn type_name(data_type: u32) -> &'static str {
    match data_type {
        MI_INT8 => "miINT8",
        MI_UINT8 => "miUINT8",
        MI_INT16 => "miINT16",
        MI_UINT16 => "miUINT16",
        MI_INT32 => "miINT32",
        MI_UINT32 => "miUINT32",
        MI_SINGLE => "miSINGLE",
        MI_DOUBLE => "miDOUBLE",
        MI_INT64 => "miINT64",
        MI_UINT64 => "miUINT64",
        MI_MATRIX => "miMATRIX",
        MI_COMPRESSED => "miCOMPRESSED",
        MI_UTF8 => "miUTF8",
        MI_UTF16 => "miUTF16",
        MI_UTF32 => "miUTF32",
        _ => "unknown",
    }
}
