//! The zip container a beam is saved to.
//!
//! An archive is an ordinary `.npz` file: every array is a `<name>.npy`
//! member, so `numpy.load` opens it directly. Scalar attributes live in one
//! extra member, [`META_ENTRY`], holding a Python-literal dict.

use crate::npy::{
    ReadNpyError, ReadNpyExt, ReadableElement, WritableElement, WriteNpyError, WriteNpyExt,
};
use ndarray::prelude::*;
use ndarray::{Data, DataOwned};
use py_literal::{
    FormatError as PyValueFormatError, ParseError as PyValueParseError, Value as PyValue,
};
use std::error::Error;
use std::fmt;
use std::io::{self, Read, Seek, Write};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the member holding the metadata dict.
pub const META_ENTRY: &str = "tfbeam_meta";

const NPY_SUFFIX: &str = ".npy";

/// How archive members are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// No compression, like `numpy.savez`.
    Stored,
    /// Deflate, like `numpy.savez_compressed`.
    #[cfg(feature = "compressed_archives")]
    Deflated,
}

impl Default for Compression {
    fn default() -> Compression {
        #[cfg(feature = "compressed_archives")]
        {
            Compression::Deflated
        }
        #[cfg(not(feature = "compressed_archives"))]
        {
            Compression::Stored
        }
    }
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored => CompressionMethod::Stored,
            #[cfg(feature = "compressed_archives")]
            Compression::Deflated => CompressionMethod::Deflated,
        }
    }
}

/// An error writing an archive.
#[derive(Debug)]
pub enum WriteArchiveError {
    /// An error caused by the zip file.
    Zip(ZipError),
    /// An error writing an array member.
    Npy(WriteNpyError),
    /// An error formatting the metadata dict.
    Meta(PyValueFormatError),
}

impl Error for WriteArchiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WriteArchiveError::Zip(err) => Some(err),
            WriteArchiveError::Npy(err) => Some(err),
            WriteArchiveError::Meta(err) => Some(err),
        }
    }
}

impl fmt::Display for WriteArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteArchiveError::Zip(err) => write!(f, "zip file error: {}", err),
            WriteArchiveError::Npy(err) => write!(f, "error writing array member: {}", err),
            WriteArchiveError::Meta(err) => write!(f, "error formatting metadata: {}", err),
        }
    }
}

impl From<ZipError> for WriteArchiveError {
    fn from(err: ZipError) -> WriteArchiveError {
        WriteArchiveError::Zip(err)
    }
}

impl From<io::Error> for WriteArchiveError {
    fn from(err: io::Error) -> WriteArchiveError {
        WriteArchiveError::Zip(ZipError::from(err))
    }
}

impl From<WriteNpyError> for WriteArchiveError {
    fn from(err: WriteNpyError) -> WriteArchiveError {
        WriteArchiveError::Npy(err)
    }
}

impl From<PyValueFormatError> for WriteArchiveError {
    fn from(err: PyValueFormatError) -> WriteArchiveError {
        WriteArchiveError::Meta(err)
    }
}

/// Writer for beam archives.
///
/// # Example
///
/// ```no_run
/// use ndarray::array;
/// use py_literal::Value as PyValue;
/// use std::fs::File;
/// use tfbeam::archive::{ArchiveWriter, Compression};
///
/// let mut archive = ArchiveWriter::new(File::create("beam.npz")?, Compression::Stored);
/// archive.add_array("s", &array![[1., 2.], [3., 4.]])?;
/// archive.add_meta(&PyValue::Dict(vec![]))?;
/// archive.finish()?;
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(writer: W, compression: Compression) -> ArchiveWriter<W> {
        ArchiveWriter {
            zip: ZipWriter::new(writer),
            options: FileOptions::default().compression_method(compression.method()),
        }
    }

    /// Adds `array` as the member `<name>.npy`.
    pub fn add_array<S, D>(
        &mut self,
        name: &str,
        array: &ArrayBase<S, D>,
    ) -> Result<(), WriteArchiveError>
    where
        S::Elem: WritableElement,
        S: Data,
        D: Dimension,
    {
        self.zip.start_file(npy_entry(name), self.options)?;
        array.write_npy(&mut self.zip)?;
        Ok(())
    }

    /// Writes `meta` as the metadata member.
    pub fn add_meta(&mut self, meta: &PyValue) -> Result<(), WriteArchiveError> {
        let mut text = Vec::new();
        meta.write_ascii(&mut text)?;
        text.push(b'\n');
        self.zip.start_file(META_ENTRY, self.options)?;
        self.zip.write_all(&text)?;
        Ok(())
    }

    /// Finishes the zip structures, flushes and returns the writer.
    ///
    /// Dropping the writer also finishes the archive but swallows errors, so
    /// this must be called to learn whether the save succeeded.
    pub fn finish(mut self) -> Result<W, WriteArchiveError> {
        let mut writer = self.zip.finish()?;
        writer.flush()?;
        Ok(writer)
    }
}

/// An error reading an archive.
#[derive(Debug)]
pub enum ReadArchiveError {
    /// An error caused by the zip archive.
    Zip(ZipError),
    /// An error reading an array member.
    Npy(ReadNpyError),
    /// An error reading the metadata member.
    Io(io::Error),
    /// The metadata member is not a valid Python literal.
    Meta(PyValueParseError),
}

impl Error for ReadArchiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadArchiveError::Zip(err) => Some(err),
            ReadArchiveError::Npy(err) => Some(err),
            ReadArchiveError::Io(err) => Some(err),
            ReadArchiveError::Meta(err) => Some(err),
        }
    }
}

impl fmt::Display for ReadArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadArchiveError::Zip(err) => write!(f, "zip file error: {}", err),
            ReadArchiveError::Npy(err) => write!(f, "error reading array member: {}", err),
            ReadArchiveError::Io(err) => write!(f, "error reading metadata: {}", err),
            ReadArchiveError::Meta(err) => write!(f, "error parsing metadata: {}", err),
        }
    }
}

impl From<ZipError> for ReadArchiveError {
    fn from(err: ZipError) -> ReadArchiveError {
        ReadArchiveError::Zip(err)
    }
}

impl From<ReadNpyError> for ReadArchiveError {
    fn from(err: ReadNpyError) -> ReadArchiveError {
        ReadArchiveError::Npy(err)
    }
}

impl From<io::Error> for ReadArchiveError {
    fn from(err: io::Error) -> ReadArchiveError {
        ReadArchiveError::Io(err)
    }
}

impl From<PyValueParseError> for ReadArchiveError {
    fn from(err: PyValueParseError) -> ReadArchiveError {
        ReadArchiveError::Meta(err)
    }
}

/// Reader for beam archives (or any `.npz` file of supported element types).
pub struct ArchiveReader<R: Read + Seek> {
    zip: ZipArchive<R>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(reader: R) -> Result<ArchiveReader<R>, ReadArchiveError> {
        Ok(ArchiveReader {
            zip: ZipArchive::new(reader)?,
        })
    }

    /// Names of all members, in archive order.
    pub fn names(&self) -> Vec<String> {
        self.zip.file_names().map(str::to_owned).collect()
    }

    /// Returns `true` if an array named `name` (with or without the `.npy`
    /// suffix) is present.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    fn resolve(&self, name: &str) -> Option<String> {
        let suffixed = npy_entry(name);
        self.zip
            .file_names()
            .find(|&entry| entry == name || entry == suffixed)
            .map(str::to_owned)
    }

    /// Reads the array member `name`, accepting it with or without the
    /// `.npy` suffix.
    pub fn by_name<S, D>(&mut self, name: &str) -> Result<ArrayBase<S, D>, ReadArchiveError>
    where
        S::Elem: ReadableElement,
        S: DataOwned,
        D: Dimension,
    {
        let entry = self.resolve(name).ok_or(ZipError::FileNotFound)?;
        Ok(ArrayBase::<S, D>::read_npy(self.zip.by_name(&entry)?)?)
    }

    /// Reads and parses the metadata member.
    pub fn meta(&mut self) -> Result<PyValue, ReadArchiveError> {
        let mut text = String::new();
        self.zip.by_name(META_ENTRY)?.read_to_string(&mut text)?;
        Ok(text.trim_end().parse()?)
    }
}

fn npy_entry(name: &str) -> String {
    if name.ends_with(NPY_SUFFIX) {
        name.to_owned()
    } else {
        format!("{}{}", name, NPY_SUFFIX)
    }
}
