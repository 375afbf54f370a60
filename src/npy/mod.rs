//! Reading and writing single arrays in the [`.npy`] format.
//!
//! Beam archives store every array member in this format so that they can
//! be opened directly with `numpy.load`.
//!
//! [`.npy`]: https://numpy.org/doc/stable/reference/generated/numpy.lib.format.html

mod elements;
pub mod header;

use self::header::{Header, ReadHeaderError, WriteHeaderError};
use ndarray::prelude::*;
use ndarray::{Data, DataOwned, ShapeError};
use py_literal::Value as PyValue;
use std::error::Error;
use std::fmt;
use std::io;

/// An array element type that can be written to an `.npy` file.
pub trait WritableElement: Sized {
    /// The `descr` entry of the header for this type.
    fn type_descriptor() -> PyValue;

    /// Writes a single element.
    fn write<W: io::Write>(&self, writer: W) -> Result<(), WriteDataError>;

    /// Writes a contiguous run of elements.
    fn write_slice<W: io::Write>(slice: &[Self], writer: W) -> Result<(), WriteDataError>;
}

/// An array element type that can be read from an `.npy` file.
pub trait ReadableElement: Sized {
    /// Reads exactly `len` elements described by `type_desc` and checks that
    /// the reader is exhausted afterwards.
    fn read_to_end_exact_vec<R: io::Read>(
        reader: R,
        type_desc: &PyValue,
        len: usize,
    ) -> Result<Vec<Self>, ReadDataError>;
}

/// An error writing array data.
#[derive(Debug)]
pub enum WriteDataError {
    Io(io::Error),
}

impl Error for WriteDataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WriteDataError::Io(err) => Some(err),
        }
    }
}

impl fmt::Display for WriteDataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteDataError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl From<io::Error> for WriteDataError {
    fn from(err: io::Error) -> WriteDataError {
        WriteDataError::Io(err)
    }
}

/// An error reading array data.
#[derive(Debug)]
pub enum ReadDataError {
    Io(io::Error),
    /// The descriptor in the header does not match the element type.
    WrongDescriptor(PyValue),
    /// Number of bytes missing for the declared shape.
    MissingData(usize),
    /// Number of bytes left over after the declared shape.
    ExtraBytes(usize),
    /// The declared shape overflows `usize` bytes.
    LengthOverflow,
}

impl Error for ReadDataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadDataError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ReadDataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadDataError::Io(err) => write!(f, "I/O error: {}", err),
            ReadDataError::WrongDescriptor(desc) => {
                write!(f, "incorrect descriptor ({}) for this type", desc)
            }
            ReadDataError::MissingData(n) => write!(f, "reached EOF {} bytes early", n),
            ReadDataError::ExtraBytes(n) => write!(f, "file had {} extra bytes before EOF", n),
            ReadDataError::LengthOverflow => write!(f, "array length overflows usize"),
        }
    }
}

impl From<io::Error> for ReadDataError {
    fn from(err: io::Error) -> ReadDataError {
        ReadDataError::Io(err)
    }
}

/// An error writing an `.npy` file.
#[derive(Debug)]
pub enum WriteNpyError {
    Header(WriteHeaderError),
    Data(WriteDataError),
}

impl Error for WriteNpyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WriteNpyError::Header(err) => Some(err),
            WriteNpyError::Data(err) => Some(err),
        }
    }
}

impl fmt::Display for WriteNpyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteNpyError::Header(err) => write!(f, "error writing header: {}", err),
            WriteNpyError::Data(err) => write!(f, "error writing data: {}", err),
        }
    }
}

impl From<WriteHeaderError> for WriteNpyError {
    fn from(err: WriteHeaderError) -> WriteNpyError {
        WriteNpyError::Header(err)
    }
}

impl From<WriteDataError> for WriteNpyError {
    fn from(err: WriteDataError) -> WriteNpyError {
        WriteNpyError::Data(err)
    }
}

/// An error reading an `.npy` file.
#[derive(Debug)]
pub enum ReadNpyError {
    Header(ReadHeaderError),
    Data(ReadDataError),
    /// The data could not be arranged into the header's shape, or the shape
    /// did not have the requested dimensionality.
    Shape(ShapeError),
}

impl Error for ReadNpyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadNpyError::Header(err) => Some(err),
            ReadNpyError::Data(err) => Some(err),
            ReadNpyError::Shape(err) => Some(err),
        }
    }
}

impl fmt::Display for ReadNpyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadNpyError::Header(err) => write!(f, "error reading header: {}", err),
            ReadNpyError::Data(err) => write!(f, "error reading data: {}", err),
            ReadNpyError::Shape(err) => write!(f, "data does not match shape: {}", err),
        }
    }
}

impl From<ReadHeaderError> for ReadNpyError {
    fn from(err: ReadHeaderError) -> ReadNpyError {
        ReadNpyError::Header(err)
    }
}

impl From<ReadDataError> for ReadNpyError {
    fn from(err: ReadDataError) -> ReadNpyError {
        ReadNpyError::Data(err)
    }
}

impl From<ShapeError> for ReadNpyError {
    fn from(err: ShapeError) -> ReadNpyError {
        ReadNpyError::Shape(err)
    }
}

/// Extension trait for writing `ArrayBase` to `.npy` files.
pub trait WriteNpyExt {
    /// Writes the array to `writer` in `.npy` format.
    fn write_npy<W: io::Write>(&self, writer: W) -> Result<(), WriteNpyError>;
}

impl<A, S, D> WriteNpyExt for ArrayBase<S, D>
where
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn write_npy<W: io::Write>(&self, mut writer: W) -> Result<(), WriteNpyError> {
        let fortran_order = !self.is_standard_layout() && self.t().is_standard_layout();
        let contiguous = if self.is_standard_layout() || fortran_order {
            self.as_slice_memory_order()
        } else {
            None
        };
        Header {
            type_descriptor: A::type_descriptor(),
            fortran_order: contiguous.is_some() && fortran_order,
            shape: self.shape().to_owned(),
        }
        .write(&mut writer)?;
        match contiguous {
            Some(slice) => A::write_slice(slice, &mut writer)?,
            None => {
                for elem in self.iter() {
                    elem.write(&mut writer)?;
                }
            }
        }
        Ok(())
    }
}

/// Extension trait for reading `Array` from `.npy` files.
pub trait ReadNpyExt: Sized {
    /// Reads the array from `reader` in `.npy` format.
    fn read_npy<R: io::Read>(reader: R) -> Result<Self, ReadNpyError>;
}

impl<A, S, D> ReadNpyExt for ArrayBase<S, D>
where
    A: ReadableElement,
    S: DataOwned<Elem = A>,
    D: Dimension,
{
    fn read_npy<R: io::Read>(mut reader: R) -> Result<Self, ReadNpyError> {
        let header = Header::from_reader(&mut reader)?;
        let len = header
            .shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or(ReadDataError::LengthOverflow)?;
        let data = A::read_to_end_exact_vec(&mut reader, &header.type_descriptor, len)?;
        let array = if header.fortran_order {
            ArrayBase::<S, IxDyn>::from_shape_vec(IxDyn(&header.shape).f(), data)?
        } else {
            ArrayBase::<S, IxDyn>::from_shape_vec(IxDyn(&header.shape), data)?
        };
        Ok(array.into_dimensionality::<D>()?)
    }
}
