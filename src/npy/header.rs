//! The `.npy` header: magic string, version, and the Python-literal
//! dictionary describing the array that follows.

use byteorder::{ByteOrder, LittleEndian};
use num_traits::ToPrimitive;
use py_literal::{
    FormatError as PyValueFormatError, ParseError as PyValueParseError, Value as PyValue,
};
use std::error::Error;
use std::fmt;
use std::io;

/// Magic string that starts every `.npy` file.
const MAGIC_STRING: &[u8] = b"\x93NUMPY";

/// Total header length (prefix plus dictionary) is padded to a multiple of this.
const HEADER_ALIGN: usize = 16;

#[derive(Debug)]
pub enum ParseHeaderError {
    MagicString,
    Version { major: u8, minor: u8 },
    /// The dictionary contains non-ASCII bytes, which versions 1.0 and 2.0
    /// forbid.
    NonAscii,
    Utf8Parse(std::str::Utf8Error),
    UnknownKey(PyValue),
    MissingKey(&'static str),
    IllegalValue { key: &'static str, value: PyValue },
    DictParse(PyValueParseError),
    MetaNotDict(PyValue),
    MissingNewline,
}

impl Error for ParseHeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseHeaderError::Utf8Parse(err) => Some(err),
            ParseHeaderError::DictParse(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ParseHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ParseHeaderError::*;
        match self {
            MagicString => write!(f, "start does not match the .npy magic string"),
            Version { major, minor } => write!(f, "unsupported .npy version {}.{}", major, minor),
            NonAscii => write!(f, "non-ascii bytes in a version 1.0/2.0 header"),
            Utf8Parse(err) => write!(f, "header is not valid UTF-8: {}", err),
            UnknownKey(key) => write!(f, "unknown header key: {}", key),
            MissingKey(key) => write!(f, "missing header key: {}", key),
            IllegalValue { key, value } => write!(f, "illegal value for key {}: {}", key, value),
            DictParse(err) => write!(f, "error parsing header dict: {}", err),
            MetaNotDict(value) => write!(f, "header is not a dict: {}", value),
            MissingNewline => write!(f, "header does not end with a newline"),
        }
    }
}

impl From<std::str::Utf8Error> for ParseHeaderError {
    fn from(err: std::str::Utf8Error) -> ParseHeaderError {
        ParseHeaderError::Utf8Parse(err)
    }
}

impl From<PyValueParseError> for ParseHeaderError {
    fn from(err: PyValueParseError) -> ParseHeaderError {
        ParseHeaderError::DictParse(err)
    }
}

#[derive(Debug)]
pub enum ReadHeaderError {
    Io(io::Error),
    Parse(ParseHeaderError),
}

impl Error for ReadHeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadHeaderError::Io(err) => Some(err),
            ReadHeaderError::Parse(err) => Some(err),
        }
    }
}

impl fmt::Display for ReadHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadHeaderError::Io(err) => write!(f, "I/O error: {}", err),
            ReadHeaderError::Parse(err) => write!(f, "error parsing header: {}", err),
        }
    }
}

impl From<io::Error> for ReadHeaderError {
    fn from(err: io::Error) -> ReadHeaderError {
        ReadHeaderError::Io(err)
    }
}

impl From<ParseHeaderError> for ReadHeaderError {
    fn from(err: ParseHeaderError) -> ReadHeaderError {
        ReadHeaderError::Parse(err)
    }
}

#[derive(Debug)]
pub enum WriteHeaderError {
    Io(io::Error),
    Format(PyValueFormatError),
}

impl Error for WriteHeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WriteHeaderError::Io(err) => Some(err),
            WriteHeaderError::Format(err) => Some(err),
        }
    }
}

impl fmt::Display for WriteHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteHeaderError::Io(err) => write!(f, "I/O error: {}", err),
            WriteHeaderError::Format(err) => write!(f, "error formatting header dict: {}", err),
        }
    }
}

impl From<io::Error> for WriteHeaderError {
    fn from(err: io::Error) -> WriteHeaderError {
        WriteHeaderError::Io(err)
    }
}

impl From<PyValueFormatError> for WriteHeaderError {
    fn from(err: PyValueFormatError) -> WriteHeaderError {
        WriteHeaderError::Format(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Version {
    V1,
    V2,
    V3,
}

impl Version {
    fn from_bytes(major: u8, minor: u8) -> Result<Self, ParseHeaderError> {
        match (major, minor) {
            (1, 0) => Ok(Version::V1),
            (2, 0) => Ok(Version::V2),
            (3, 0) => Ok(Version::V3),
            (major, minor) => Err(ParseHeaderError::Version { major, minor }),
        }
    }

    fn major(self) -> u8 {
        match self {
            Version::V1 => 1,
            Version::V2 => 2,
            Version::V3 => 3,
        }
    }

    /// Width of the little-endian `HEADER_LEN` field.
    fn len_field_bytes(self) -> usize {
        match self {
            Version::V1 => 2,
            Version::V2 | Version::V3 => 4,
        }
    }

    /// Magic string, two version bytes and the length field.
    fn prefix_len(self) -> usize {
        MAGIC_STRING.len() + 2 + self.len_field_bytes()
    }
}

/// Description of the array stored after the header.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub type_descriptor: PyValue,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_py_value())
    }
}

impl Header {
    fn from_py_value(value: PyValue) -> Result<Self, ParseHeaderError> {
        let dict = match value {
            PyValue::Dict(dict) => dict,
            other => return Err(ParseHeaderError::MetaNotDict(other)),
        };
        let mut type_descriptor = None;
        let mut fortran_order = None;
        let mut shape = None;
        for (key, value) in dict {
            let key = match key {
                PyValue::String(key) => key,
                other => return Err(ParseHeaderError::UnknownKey(other)),
            };
            match key.as_str() {
                "descr" => type_descriptor = Some(value),
                "fortran_order" => match value {
                    PyValue::Boolean(b) => fortran_order = Some(b),
                    value => {
                        return Err(ParseHeaderError::IllegalValue {
                            key: "fortran_order",
                            value,
                        })
                    }
                },
                "shape" => match parse_shape(&value) {
                    Some(s) => shape = Some(s),
                    None => return Err(ParseHeaderError::IllegalValue { key: "shape", value }),
                },
                _ => return Err(ParseHeaderError::UnknownKey(PyValue::String(key))),
            }
        }
        Ok(Header {
            type_descriptor: type_descriptor.ok_or(ParseHeaderError::MissingKey("descr"))?,
            fortran_order: fortran_order.ok_or(ParseHeaderError::MissingKey("fortran_order"))?,
            shape: shape.ok_or(ParseHeaderError::MissingKey("shape"))?,
        })
    }

    pub fn from_reader<R: io::Read>(mut reader: R) -> Result<Self, ReadHeaderError> {
        let mut magic = [0; 6];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC_STRING {
            return Err(ParseHeaderError::MagicString.into());
        }

        let mut version = [0; 2];
        reader.read_exact(&mut version)?;
        let version = Version::from_bytes(version[0], version[1])?;

        let mut len_buf = [0; 4];
        reader.read_exact(&mut len_buf[..version.len_field_bytes()])?;
        let header_len = match version {
            Version::V1 => LittleEndian::read_u16(&len_buf) as usize,
            Version::V2 | Version::V3 => LittleEndian::read_u32(&len_buf) as usize,
        };

        let mut buf = vec![0; header_len];
        reader.read_exact(&mut buf)?;
        let dict = match buf.split_last() {
            Some((&b'\n', rest)) => rest,
            _ => return Err(ParseHeaderError::MissingNewline.into()),
        };
        if version != Version::V3 && !dict.is_ascii() {
            return Err(ParseHeaderError::NonAscii.into());
        }
        let dict = std::str::from_utf8(dict).map_err(ParseHeaderError::from)?;
        let value: PyValue = dict.parse().map_err(ParseHeaderError::from)?;
        Ok(Header::from_py_value(value)?)
    }

    fn to_py_value(&self) -> PyValue {
        PyValue::Dict(vec![
            (PyValue::String("descr".into()), self.type_descriptor.clone()),
            (
                PyValue::String("fortran_order".into()),
                PyValue::Boolean(self.fortran_order),
            ),
            (
                PyValue::String("shape".into()),
                PyValue::Tuple(
                    self.shape
                        .iter()
                        .map(|&len| PyValue::Integer(len.into()))
                        .collect(),
                ),
            ),
        ])
    }

    /// Formats the complete header, choosing version 1.0 unless the
    /// dictionary is too long for its 16-bit length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteHeaderError> {
        let mut dict = Vec::new();
        self.to_py_value().write_ascii(&mut dict)?;

        // The trailing newline counts towards HEADER_LEN.
        let version = if dict.len() + 1 > u16::MAX as usize {
            Version::V2
        } else {
            Version::V1
        };
        let unpadded = version.prefix_len() + dict.len() + 1;
        let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
        dict.resize(dict.len() + padding, b' ');
        dict.push(b'\n');

        let mut out = Vec::with_capacity(version.prefix_len() + dict.len());
        out.extend_from_slice(MAGIC_STRING);
        out.push(version.major());
        out.push(0);
        match version {
            Version::V1 => {
                let mut len = [0; 2];
                LittleEndian::write_u16(&mut len, dict.len() as u16);
                out.extend_from_slice(&len);
            }
            Version::V2 | Version::V3 => {
                let mut len = [0; 4];
                LittleEndian::write_u32(&mut len, dict.len() as u32);
                out.extend_from_slice(&len);
            }
        }
        out.extend_from_slice(&dict);
        debug_assert_eq!(out.len() % HEADER_ALIGN, 0);
        Ok(out)
    }

    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), WriteHeaderError> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }
}

fn parse_shape(value: &PyValue) -> Option<Vec<usize>> {
    match value {
        PyValue::Tuple(elems) => elems
            .iter()
            .map(|elem| match elem {
                PyValue::Integer(int) => int.to_usize(),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}
