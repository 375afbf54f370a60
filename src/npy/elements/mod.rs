//! Implementations of the element traits for floating-point types.

use super::{ReadDataError, ReadableElement, WritableElement, WriteDataError};
use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use py_literal::Value as PyValue;
use std::io;
use std::mem;

/// Reads the rest of `reader` and checks that it holds exactly `len`
/// elements of `elem_size` bytes.
fn read_exact_elements<R: io::Read>(
    mut reader: R,
    len: usize,
    elem_size: usize,
) -> Result<Vec<u8>, ReadDataError> {
    let needed = len
        .checked_mul(elem_size)
        .ok_or(ReadDataError::LengthOverflow)?;
    // The length comes from the header, so it is not trusted for allocation.
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    match bytes.len() {
        n if n < needed => Err(ReadDataError::MissingData(needed - n)),
        n if n > needed => Err(ReadDataError::ExtraBytes(n - needed)),
        _ => Ok(bytes),
    }
}

macro_rules! impl_float_element {
    ($elem:ty, $little_desc:expr, $big_desc:expr, $write_one:ident, $write_into:ident, $read_into:ident) => {
        impl WritableElement for $elem {
            fn type_descriptor() -> PyValue {
                PyValue::String($little_desc.into())
            }

            fn write<W: io::Write>(&self, mut writer: W) -> Result<(), WriteDataError> {
                writer.$write_one::<LittleEndian>(*self)?;
                Ok(())
            }

            fn write_slice<W: io::Write>(
                slice: &[Self],
                mut writer: W,
            ) -> Result<(), WriteDataError> {
                let mut bytes = vec![0; slice.len() * mem::size_of::<$elem>()];
                LittleEndian::$write_into(slice, &mut bytes);
                writer.write_all(&bytes)?;
                Ok(())
            }
        }

        impl ReadableElement for $elem {
            fn read_to_end_exact_vec<R: io::Read>(
                reader: R,
                type_desc: &PyValue,
                len: usize,
            ) -> Result<Vec<Self>, ReadDataError> {
                let big_endian = match type_desc {
                    PyValue::String(s) if s == $little_desc => false,
                    PyValue::String(s) if s == $big_desc => true,
                    other => return Err(ReadDataError::WrongDescriptor(other.clone())),
                };
                let bytes = read_exact_elements(reader, len, mem::size_of::<$elem>())?;
                let mut out = vec![0.; len];
                if big_endian {
                    BigEndian::$read_into(&bytes, &mut out);
                } else {
                    LittleEndian::$read_into(&bytes, &mut out);
                }
                Ok(out)
            }
        }
    };
}

impl_float_element!(f64, "<f8", ">f8", write_f64, write_f64_into, read_f64_into);
impl_float_element!(f32, "<f4", ">f4", write_f32, write_f32_into, read_f32_into);
