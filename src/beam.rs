//! Time-frequency beamformer results.
//!
//! A [`TfBeam`] holds one comparison of source power over voxels, time and
//! frequency bands, together with the geometry and timing metadata needed to
//! interpret it. Beams are read from NUTMEG `beam` MAT-files and saved to
//! `.npz` archives.

use crate::archive::{ArchiveReader, ArchiveWriter, Compression, ReadArchiveError, WriteArchiveError};
use crate::mat::{MatFile, MatStruct, MatValue, ReadMatError};
use crate::record::beam_struct;
use ndarray::prelude::*;
use ndarray::Zip;
use num_traits::ToPrimitive;
use py_literal::Value as PyValue;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Extension given to saved beams.
pub const ARCHIVE_EXTENSION: &str = "npz";

const FORMAT_VERSION: u32 = 1;

/// How the signals of a beam file are combined into a single data array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// `10 * log10(active / control)`.
    FDb,
    /// `active / control`.
    F,
    Active,
    Control,
}

impl Comparison {
    pub fn label(self) -> &'static str {
        match self {
            Comparison::FDb => "F dB",
            Comparison::F => "F",
            Comparison::Active => "active",
            Comparison::Control => "control",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Comparison {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Comparison, LoadError> {
        match s {
            "F dB" => Ok(Comparison::FDb),
            "F" => Ok(Comparison::F),
            "active" => Ok(Comparison::Active),
            "control" => Ok(Comparison::Control),
            other => Err(LoadError::UnknownComparison(other.to_owned())),
        }
    }
}

/// An error building a beam from a MAT-file or a saved archive.
#[derive(Debug)]
pub enum LoadError {
    Io(io::Error),
    Mat(ReadMatError),
    Archive(ReadArchiveError),
    MissingVariable(&'static str),
    NotAStruct {
        name: String,
        found: &'static str,
    },
    MissingField(String),
    BadField {
        field: String,
        reason: String,
    },
    UnknownComparison(String),
    ShapeMismatch {
        field: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    BadMeta(String),
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::Io(err) => Some(err),
            LoadError::Mat(err) => Some(err),
            LoadError::Archive(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use LoadError::*;
        match self {
            Io(err) => write!(f, "I/O error: {}", err),
            Mat(err) => write!(f, "error reading MAT-file: {}", err),
            Archive(err) => write!(f, "error reading beam archive: {}", err),
            MissingVariable(name) => write!(f, "no variable named `{}`", name),
            NotAStruct { name, found } => write!(f, "`{}` is not a struct but {}", name, found),
            MissingField(field) => write!(f, "missing field `{}`", field),
            BadField { field, reason } => write!(f, "bad field `{}`: {}", field, reason),
            UnknownComparison(label) => write!(f, "unknown comparison {:?}", label),
            ShapeMismatch {
                field,
                expected,
                found,
            } => write!(
                f,
                "shape mismatch in `{}`: expected {:?}, found {:?}",
                field, expected, found
            ),
            BadMeta(reason) => write!(f, "bad archive metadata: {}", reason),
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> LoadError {
        LoadError::Io(err)
    }
}

impl From<ReadMatError> for LoadError {
    fn from(err: ReadMatError) -> LoadError {
        LoadError::Mat(err)
    }
}

impl From<ReadArchiveError> for LoadError {
    fn from(err: ReadArchiveError) -> LoadError {
        LoadError::Archive(err)
    }
}

/// An error deriving a beam from new data.
#[derive(Debug)]
pub enum DeriveError {
    /// The first axis of the new data does not run over the beam's voxels.
    VoxelCount { expected: usize, shape: Vec<usize> },
}

impl Error for DeriveError {}

impl fmt::Display for DeriveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeriveError::VoxelCount { expected, shape } => write!(
                f,
                "data of shape {:?} does not have {} voxels along its first axis",
                shape, expected
            ),
        }
    }
}

/// An error saving a beam.
#[derive(Debug)]
pub enum SaveError {
    Io(io::Error),
    Archive(WriteArchiveError),
}

impl Error for SaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SaveError::Io(err) => Some(err),
            SaveError::Archive(err) => Some(err),
        }
    }
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SaveError::Io(err) => write!(f, "I/O error: {}", err),
            SaveError::Archive(err) => write!(f, "error writing beam archive: {}", err),
        }
    }
}

impl From<io::Error> for SaveError {
    fn from(err: io::Error) -> SaveError {
        SaveError::Io(err)
    }
}

impl From<WriteArchiveError> for SaveError {
    fn from(err: WriteArchiveError) -> SaveError {
        SaveError::Archive(err)
    }
}

/// Options for [`TfBeam::save_with`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub compression: Compression,
}

/// A time-frequency beam.
#[derive(Clone, Debug, PartialEq)]
pub struct TfBeam {
    uses: String,
    data: ArrayD<f64>,
    voxels: Array2<f64>,
    voxelsize: Array1<f64>,
    srate: f64,
    timewindow: Array1<f64>,
    bands: Array2<f64>,
    timepts: Option<Array1<f64>>,
}

impl TfBeam {
    /// Reads the `beam` variable of a MAT-file and builds the beam for
    /// `comparison`.
    pub fn from_file<P: AsRef<Path>>(path: P, comparison: Comparison) -> Result<TfBeam, LoadError> {
        let mat = MatFile::open(path)?;
        TfBeam::from_record(beam_struct(&mat)?, comparison)
    }

    /// Builds the beam for `comparison` from a decoded `beam` struct.
    pub fn from_record(beam: &MatStruct, comparison: Comparison) -> Result<TfBeam, LoadError> {
        let signals = signals(required(beam, "s")?)?;
        let data = compare(&signals, comparison)?;
        let voxels = matrix(beam, "voxels", 3)?;
        let voxelsize = vector(beam, "voxelsize")?;
        let srate = scalar(beam, "srate")?;
        let timewindow = vector(beam, "timewindow")?;
        if timewindow.len() != 2 {
            return Err(LoadError::ShapeMismatch {
                field: "timewindow".to_owned(),
                expected: vec![2],
                found: vec![timewindow.len()],
            });
        }
        let bands = matrix(beam, "bands", 2)?;
        let timepts = match beam.field("timepts") {
            Some(MatValue::Numeric(array)) if array.is_empty() => None,
            Some(_) => Some(vector(beam, "timepts")?),
            None => None,
        };
        if data.shape().first() != Some(&voxels.nrows()) {
            return Err(LoadError::ShapeMismatch {
                field: "s".to_owned(),
                expected: vec![voxels.nrows()],
                found: data.shape().to_vec(),
            });
        }
        Ok(TfBeam {
            uses: comparison.label().to_owned(),
            data,
            voxels,
            voxelsize,
            srate,
            timewindow,
            bands,
            timepts,
        })
    }

    /// Returns a new beam with this beam's metadata wrapping `data`, labelled
    /// `uses`. The data is taken as is.
    pub fn derive(&self, data: ArrayD<f64>, uses: &str) -> Result<TfBeam, DeriveError> {
        if data.shape().first() != Some(&self.nvox()) {
            return Err(DeriveError::VoxelCount {
                expected: self.nvox(),
                shape: data.shape().to_vec(),
            });
        }
        Ok(TfBeam {
            uses: uses.to_owned(),
            data,
            voxels: self.voxels.clone(),
            voxelsize: self.voxelsize.clone(),
            srate: self.srate,
            timewindow: self.timewindow.clone(),
            bands: self.bands.clone(),
            timepts: self.timepts.clone(),
        })
    }

    /// Saves with default options. See [`TfBeam::save_with`].
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, SaveError> {
        self.save_with(path, &SaveOptions::default())
    }

    /// Saves the beam as an archive, replacing any existing file, and returns
    /// the path written. Like `numpy.save`, the `.npz` extension is appended
    /// unless `path` already has it.
    pub fn save_with<P: AsRef<Path>>(
        &self,
        path: P,
        options: &SaveOptions,
    ) -> Result<PathBuf, SaveError> {
        let path = archive_path(path.as_ref());
        let file = File::create(&path)?;
        let mut archive = ArchiveWriter::new(BufWriter::new(file), options.compression);
        archive.add_array("s", &self.data)?;
        archive.add_array("voxels", &self.voxels)?;
        archive.add_array("voxelsize", &self.voxelsize)?;
        archive.add_array("timewindow", &self.timewindow)?;
        archive.add_array("bands", &self.bands)?;
        if let Some(timepts) = &self.timepts {
            archive.add_array("timepts", timepts)?;
        }
        archive.add_meta(&self.meta())?;
        archive.finish()?;
        Ok(path)
    }

    /// Reads a beam saved with [`TfBeam::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TfBeam, LoadError> {
        let file = File::open(path)?;
        let mut archive = ArchiveReader::new(BufReader::new(file))?;
        let (uses, srate) = parse_meta(archive.meta()?)?;
        let timepts = if archive.contains("timepts") {
            Some(archive.by_name("timepts")?)
        } else {
            None
        };
        Ok(TfBeam {
            uses,
            data: archive.by_name("s")?,
            voxels: archive.by_name("voxels")?,
            voxelsize: archive.by_name("voxelsize")?,
            srate,
            timewindow: archive.by_name("timewindow")?,
            bands: archive.by_name("bands")?,
            timepts,
        })
    }

    fn meta(&self) -> PyValue {
        PyValue::Dict(vec![
            (
                PyValue::String("format_version".into()),
                PyValue::Integer(FORMAT_VERSION.into()),
            ),
            (
                PyValue::String("uses".into()),
                PyValue::String(self.uses.clone()),
            ),
            (PyValue::String("srate".into()), PyValue::Float(self.srate)),
        ])
    }

    /// The comparison label, e.g. `"F dB"` or `"p_corr_pos"`.
    pub fn uses(&self) -> &str {
        &self.uses
    }

    /// The data array; its first axis runs over voxels.
    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn voxels(&self) -> &Array2<f64> {
        &self.voxels
    }

    pub fn voxelsize(&self) -> &Array1<f64> {
        &self.voxelsize
    }

    pub fn srate(&self) -> f64 {
        self.srate
    }

    pub fn timewindow(&self) -> &Array1<f64> {
        &self.timewindow
    }

    pub fn bands(&self) -> &Array2<f64> {
        &self.bands
    }

    pub fn timepts(&self) -> Option<&Array1<f64>> {
        self.timepts.as_ref()
    }

    pub fn nvox(&self) -> usize {
        self.voxels.nrows()
    }
}

/// The file [`TfBeam::save`] writes for `path`.
pub fn archive_path(path: &Path) -> PathBuf {
    if path.extension().map_or(false, |ext| ext == ARCHIVE_EXTENSION) {
        path.to_owned()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(ARCHIVE_EXTENSION);
        PathBuf::from(name)
    }
}

fn required<'a>(beam: &'a MatStruct, field: &str) -> Result<&'a MatValue, LoadError> {
    beam.field(field)
        .ok_or_else(|| LoadError::MissingField(field.to_owned()))
}

fn bad_field(field: &str, reason: String) -> LoadError {
    LoadError::BadField {
        field: field.to_owned(),
        reason,
    }
}

fn numeric<'a>(beam: &'a MatStruct, field: &str) -> Result<&'a ArrayD<f64>, LoadError> {
    let value = required(beam, field)?;
    value.as_numeric().ok_or_else(|| {
        bad_field(
            field,
            format!("expected a numeric array, found {}", value.class_name()),
        )
    })
}

/// Reads a field holding a row or column vector (or any array with at most
/// one non-singleton axis).
fn vector(beam: &MatStruct, field: &str) -> Result<Array1<f64>, LoadError> {
    let array = numeric(beam, field)?;
    if array.shape().iter().filter(|&&len| len > 1).count() > 1 {
        return Err(bad_field(
            field,
            format!("expected a vector, found shape {:?}", array.shape()),
        ));
    }
    Ok(array.iter().copied().collect())
}

fn matrix(beam: &MatStruct, field: &str, ncols: usize) -> Result<Array2<f64>, LoadError> {
    let array = numeric(beam, field)?
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|err| bad_field(field, format!("expected a matrix: {}", err)))?;
    if array.ncols() != ncols {
        return Err(LoadError::ShapeMismatch {
            field: field.to_owned(),
            expected: vec![array.nrows(), ncols],
            found: array.shape().to_vec(),
        });
    }
    Ok(array.to_owned())
}

fn scalar(beam: &MatStruct, field: &str) -> Result<f64, LoadError> {
    let array = numeric(beam, field)?;
    match array.len() {
        1 => Ok(array.iter().copied().sum()),
        n => Err(bad_field(field, format!("expected a scalar, found {} values", n))),
    }
}

/// The signal arrays in `s`: a single numeric array or a cell of them.
fn signals(value: &MatValue) -> Result<Vec<ArrayD<f64>>, LoadError> {
    match value {
        MatValue::Numeric(array) => Ok(vec![array.clone()]),
        MatValue::Cell(cell) if !cell.is_empty() => cell
            .iter()
            .map(|item| {
                item.as_numeric().cloned().ok_or_else(|| {
                    bad_field("s", format!("cell holds a {} array", item.class_name()))
                })
            })
            .collect(),
        MatValue::Cell(_) => Err(bad_field("s", "empty cell".to_owned())),
        other => Err(bad_field(
            "s",
            format!("expected numeric or cell, found {}", other.class_name()),
        )),
    }
}

/// Combines the signals into the data for `comparison`. A single signal is
/// taken to already hold the requested comparison.
fn compare(signals: &[ArrayD<f64>], comparison: Comparison) -> Result<ArrayD<f64>, LoadError> {
    match (signals, comparison) {
        ([], _) => Err(bad_field("s", "no signals".to_owned())),
        ([only], _) => Ok(only.clone()),
        ([active, ..], Comparison::Active) => Ok(active.clone()),
        ([_, control, ..], Comparison::Control) => Ok(control.clone()),
        ([active, control, ..], Comparison::F | Comparison::FDb) => {
            if active.shape() != control.shape() {
                return Err(LoadError::ShapeMismatch {
                    field: "s".to_owned(),
                    expected: active.shape().to_vec(),
                    found: control.shape().to_vec(),
                });
            }
            let ratio = Zip::from(active).and(control).map_collect(|&a, &c| a / c);
            Ok(match comparison {
                Comparison::FDb => ratio.mapv_into(|r| 10.0 * r.log10()),
                _ => ratio,
            })
        }
    }
}

fn parse_meta(meta: PyValue) -> Result<(String, f64), LoadError> {
    let dict = match meta {
        PyValue::Dict(dict) => dict,
        other => return Err(LoadError::BadMeta(format!("not a dict: {}", other))),
    };
    let mut uses = None;
    let mut srate = None;
    for (key, value) in dict {
        match (key, value) {
            (PyValue::String(key), PyValue::Integer(version)) if key == "format_version" => {
                if version.to_u32() != Some(FORMAT_VERSION) {
                    return Err(LoadError::BadMeta(format!(
                        "unsupported format version {}",
                        version
                    )));
                }
            }
            (PyValue::String(key), PyValue::String(label)) if key == "uses" => uses = Some(label),
            (PyValue::String(key), PyValue::Float(rate)) if key == "srate" => srate = Some(rate),
            (PyValue::String(key), PyValue::Integer(rate)) if key == "srate" => {
                srate = rate.to_f64()
            }
            (key, value) => {
                return Err(LoadError::BadMeta(format!(
                    "unexpected entry {}: {}",
                    key, value
                )))
            }
        }
    }
    match (uses, srate) {
        (Some(uses), Some(srate)) => Ok((uses, srate)),
        (None, _) => Err(LoadError::BadMeta("missing `uses`".to_owned())),
        (_, None) => Err(LoadError::BadMeta("missing `srate`".to_owned())),
    }
}
