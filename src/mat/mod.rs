//! Reader for MATLAB level-5 MAT-files.
//!
//! Supports the classes a NUTMEG beam file is made of: numeric arrays of any
//! width (widened to `f64`), char arrays, cell arrays and struct arrays,
//! including variables stored as `miCOMPRESSED` elements. Version 7.3 files
//! are HDF5 containers and are rejected with
//! [`ReadMatError::UnsupportedVersion`].
//!
//! # Example
//!
//! ```no_run
//! use tfbeam::mat::MatFile;
//!
//! let mat = MatFile::open("s_beamtf1_avg.mat")?;
//! if let Some(beam) = mat.find_by_name("beam").and_then(|v| v.as_struct()) {
//!     println!("beam fields: {:?}", beam.field_names());
//! }
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

mod element;
mod value;

pub use self::element::Endian;
pub use self::value::{MatCell, MatStruct, MatValue};

use self::element::{
    Element, ElementReader, MI_COMPRESSED, MI_INT32, MI_INT8, MI_MATRIX, MI_UINT32, MI_UINT8,
    MI_UTF8, TAG_LEN,
};
use log::{debug, warn};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

const HEADER_LEN: usize = 128;
const DESCRIPTION_LEN: usize = 116;
const SUPPORTED_VERSION: u16 = 0x0100;

const MX_CELL: u32 = 1;
const MX_STRUCT: u32 = 2;
const MX_OBJECT: u32 = 3;
const MX_CHAR: u32 = 4;
const MX_SPARSE: u32 = 5;
const MX_DOUBLE: u32 = 6;
const MX_UINT64: u32 = 15;
const MX_FUNCTION: u32 = 16;
const MX_OPAQUE: u32 = 17;

const FLAG_COMPLEX: u32 = 0x0800;

/// An error reading a MAT-file.
#[derive(Debug)]
pub enum ReadMatError {
    Io(io::Error),
    /// The file ends in the middle of the header or of a data element, or is
    /// too short for the number of elements an array declares.
    Truncated,
    /// Bytes 126..128 are neither `IM` nor `MI`.
    BadEndianIndicator([u8; 2]),
    /// Any version other than 0x0100; 0x0200 marks an HDF5-based v7.3 file.
    UnsupportedVersion(u16),
    UnexpectedElement {
        expected: &'static str,
        found: u32,
    },
    /// Element or array length disagrees with what its header declares.
    LengthMismatch {
        expected: usize,
        found: usize,
    },
    /// A valid but unsupported construct, such as sparse or complex arrays.
    Unsupported(String),
    Decompress(io::Error),
}

impl Error for ReadMatError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadMatError::Io(err) => Some(err),
            ReadMatError::Decompress(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ReadMatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ReadMatError::*;
        match self {
            Io(err) => write!(f, "I/O error: {}", err),
            Truncated => write!(f, "unexpected end of file"),
            BadEndianIndicator(bytes) => write!(f, "bad endian indicator: {:?}", bytes),
            UnsupportedVersion(0x0200) => {
                write!(f, "version 7.3 (HDF5) MAT-files are not supported")
            }
            UnsupportedVersion(v) => write!(f, "unsupported MAT-file version {:#06x}", v),
            UnexpectedElement { expected, found } => write!(
                f,
                "expected {} element, found {} ({})",
                expected,
                element::type_name(*found),
                found
            ),
            LengthMismatch { expected, found } => {
                write!(f, "length mismatch: expected {}, found {}", expected, found)
            }
            Unsupported(what) => write!(f, "unsupported MAT-file content: {}", what),
            Decompress(err) => write!(f, "error inflating compressed element: {}", err),
        }
    }
}

impl From<io::Error> for ReadMatError {
    fn from(err: io::Error) -> ReadMatError {
        ReadMatError::Io(err)
    }
}

/// The variables of a MAT-file, in file order.
#[derive(Clone, Debug)]
pub struct MatFile {
    description: String,
    endian: Endian,
    variables: Vec<(String, MatValue)>,
}

impl MatFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MatFile, ReadMatError> {
        let path = path.as_ref();
        debug!("reading MAT-file {}", path.display());
        MatFile::parse(&fs::read(path)?)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<MatFile, ReadMatError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        MatFile::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<MatFile, ReadMatError> {
        if bytes.len() < HEADER_LEN {
            return Err(ReadMatError::Truncated);
        }
        let endian = match &bytes[126..128] {
            b"IM" => Endian::Little,
            b"MI" => Endian::Big,
            other => return Err(ReadMatError::BadEndianIndicator([other[0], other[1]])),
        };
        let version = endian.read_u16(&bytes[124..126]);
        if version != SUPPORTED_VERSION {
            return Err(ReadMatError::UnsupportedVersion(version));
        }
        let description = String::from_utf8_lossy(&bytes[..DESCRIPTION_LEN])
            .trim_end_matches(|c: char| c == ' ' || c == '\0')
            .to_owned();

        let mut variables = Vec::new();
        let mut reader = ElementReader::new(&bytes[HEADER_LEN..], endian);
        while !reader.is_empty() {
            let elem = reader.next_element()?;
            if let Some(variable) = read_variable(elem, endian)? {
                variables.push(variable);
            }
        }
        Ok(MatFile {
            description,
            endian,
            variables,
        })
    }

    /// The descriptive text at the start of the header.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn find_by_name(&self, name: &str) -> Option<&MatValue> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn into_variable(self, name: &str) -> Option<MatValue> {
        self.variables
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &MatValue)> {
        self.variables.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Decodes one top-level element. Elements that are not arrays are skipped.
fn read_variable(
    elem: Element<'_>,
    endian: Endian,
) -> Result<Option<(String, MatValue)>, ReadMatError> {
    match elem.data_type {
        MI_MATRIX => read_matrix(elem.data, endian).map(Some),
        MI_COMPRESSED => {
            let inflated = elem.decompress()?;
            let mut inner = ElementReader::new(&inflated, endian);
            read_variable(inner.next_element()?, endian)
        }
        other => {
            warn!(
                "skipping top-level {} element",
                element::type_name(other)
            );
            Ok(None)
        }
    }
}

/// Decodes the contents of an `miMATRIX` element into its name and value.
fn read_matrix(data: &[u8], endian: Endian) -> Result<(String, MatValue), ReadMatError> {
    // An element with no content is MATLAB's `[]`.
    if data.is_empty() {
        return Ok((String::new(), MatValue::Numeric(ArrayD::zeros(IxDyn(&[0, 0])))));
    }
    let mut reader = ElementReader::new(data, endian);

    let flags = reader.expect(MI_UINT32)?;
    if flags.data.len() < 4 {
        return Err(ReadMatError::LengthMismatch {
            expected: 8,
            found: flags.data.len(),
        });
    }
    let flags = endian.read_u32(flags.data);
    let class = flags & 0xff;

    let shape = reader
        .expect(MI_INT32)?
        .to_i64_vec(endian)?
        .into_iter()
        .map(|d| {
            usize::try_from(d)
                .map_err(|_| ReadMatError::Unsupported(format!("negative dimension {}", d)))
        })
        .collect::<Result<Vec<usize>, _>>()?;
    let numel = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| ReadMatError::Unsupported("array size overflows usize".to_owned()))?;

    let name_elem = reader.next_element()?;
    if name_elem.data_type != MI_INT8 && name_elem.data_type != MI_UINT8 {
        return Err(ReadMatError::UnexpectedElement {
            expected: "miINT8",
            found: name_elem.data_type,
        });
    }
    let name = String::from_utf8_lossy(name_elem.data).into_owned();

    let value = match class {
        MX_CELL => {
            check_nested(&reader, numel)?;
            let items = (0..numel)
                .map(|_| read_nested(&mut reader, endian))
                .collect::<Result<Vec<_>, _>>()?;
            MatValue::Cell(MatCell { shape, items })
        }
        MX_STRUCT => read_struct(&mut reader, endian, shape, numel)?,
        MX_CHAR => MatValue::Char(read_chars(reader.next_element()?, endian, &shape)?),
        MX_DOUBLE..=MX_UINT64 => {
            if flags & FLAG_COMPLEX != 0 {
                return Err(ReadMatError::Unsupported(format!(
                    "complex array `{}`",
                    name
                )));
            }
            let real = reader.next_element()?.to_f64_vec(endian)?;
            if real.len() != numel {
                return Err(ReadMatError::LengthMismatch {
                    expected: numel,
                    found: real.len(),
                });
            }
            let array = ArrayD::from_shape_vec(IxDyn(&shape).f(), real).map_err(|err| {
                ReadMatError::Unsupported(format!("array `{}` has invalid shape: {}", name, err))
            })?;
            MatValue::Numeric(array)
        }
        MX_OBJECT | MX_SPARSE | MX_FUNCTION | MX_OPAQUE => {
            return Err(ReadMatError::Unsupported(format!(
                "array `{}` of class {}",
                name,
                class_name(class)
            )))
        }
        other => {
            return Err(ReadMatError::Unsupported(format!(
                "array `{}` of unknown class {}",
                name, other
            )))
        }
    };
    Ok((name, value))
}

/// Reads an unnamed `miMATRIX` element nested in a cell or struct.
fn read_nested(reader: &mut ElementReader<'_>, endian: Endian) -> Result<MatValue, ReadMatError> {
    let elem = reader.expect(MI_MATRIX)?;
    Ok(read_matrix(elem.data, endian)?.1)
}

fn read_struct(
    reader: &mut ElementReader<'_>,
    endian: Endian,
    shape: Vec<usize>,
    numel: usize,
) -> Result<MatValue, ReadMatError> {
    let name_len = reader.expect(MI_INT32)?.to_i64_vec(endian)?;
    let name_len = match name_len.as_slice() {
        &[len] if len > 0 => len as usize,
        _ => {
            return Err(ReadMatError::Unsupported(format!(
                "struct field name length {:?}",
                name_len
            )))
        }
    };
    let names = reader.expect(MI_INT8)?;
    let field_names: Vec<String> = names
        .data
        .chunks(name_len)
        .map(|chunk| {
            let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
            String::from_utf8_lossy(&chunk[..end]).into_owned()
        })
        .collect();
    let count = numel
        .checked_mul(field_names.len())
        .ok_or(ReadMatError::Truncated)?;
    check_nested(reader, count)?;
    let values = (0..count)
        .map(|_| read_nested(reader, endian))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MatValue::Struct(MatStruct {
        shape,
        field_names,
        len: numel,
        values,
    }))
}

/// Fails unless `count` nested elements can fit in what is left of `reader`.
fn check_nested(reader: &ElementReader<'_>, count: usize) -> Result<(), ReadMatError> {
    if count > reader.remaining() / TAG_LEN {
        return Err(ReadMatError::Truncated);
    }
    Ok(())
}

/// Decodes character data, joining the rows of a multi-row char matrix with
/// newlines.
fn read_chars(elem: Element<'_>, endian: Endian, shape: &[usize]) -> Result<String, ReadMatError> {
    let units: Vec<u32> = match elem.data_type {
        MI_UTF8 => {
            return Ok(String::from_utf8_lossy(elem.data).into_owned());
        }
        _ => elem
            .to_f64_vec(endian)?
            .into_iter()
            .map(|c| c as u32)
            .collect(),
    };
    let chars: Vec<char> = units
        .into_iter()
        .map(|c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    let rows = shape.first().copied().unwrap_or(1);
    if rows <= 1 {
        return Ok(chars.into_iter().collect());
    }
    let cols = chars.len() / rows;
    let lines: Vec<String> = (0..rows)
        .map(|r| (0..cols).map(|c| chars[r + c * rows]).collect())
        .collect();
    Ok(lines.join("\n"))
}

fn class_name(class: u32) -> &'static str {
    match class {
        MX_OBJECT => "object",
        MX_SPARSE => "sparse",
        MX_FUNCTION => "function handle",
        MX_OPAQUE => "opaque",
        _ => "unknown",
    }
}
