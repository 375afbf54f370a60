//! The raw `beam` record of a MAT-file, classified once at load time.

use crate::beam::LoadError;
use crate::mat::{MatFile, MatStruct, MatValue};
use ndarray::ArrayD;
use std::path::Path;

/// Name of the top-level variable holding the beam struct.
pub const BEAM_VARIABLE: &str = "beam";

/// Name of the optional nested struct holding SnPM results.
pub const SNPM_FIELD: &str = "snpm";

/// Returns the `beam` struct of `mat`, which must have at least one element.
pub(crate) fn beam_struct(mat: &MatFile) -> Result<&MatStruct, LoadError> {
    match mat.find_by_name(BEAM_VARIABLE) {
        Some(MatValue::Struct(beam)) if !beam.is_empty() => Ok(beam),
        Some(MatValue::Struct(_)) => Err(LoadError::NotAStruct {
            name: BEAM_VARIABLE.to_owned(),
            found: "empty struct array",
        }),
        Some(other) => Err(LoadError::NotAStruct {
            name: BEAM_VARIABLE.to_owned(),
            found: other.class_name(),
        }),
        None => Err(LoadError::MissingVariable(BEAM_VARIABLE)),
    }
}

/// The `snpm` field of a beam record.
///
/// Its content is not validated when the record is opened; a statistic that
/// is absent or not numeric only surfaces when it is asked for.
#[derive(Clone, Debug, PartialEq)]
pub struct SnpmStats {
    value: MatValue,
}

impl SnpmStats {
    /// The numeric array stored under `name`, if any.
    pub fn stat(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.value.as_struct()?.field(name)?.as_numeric()
    }

    /// Field names of the `snpm` struct; empty if it is not a struct.
    pub fn names(&self) -> &[String] {
        match self.value.as_struct() {
            Some(st) => st.field_names(),
            None => &[],
        }
    }
}

/// Shape of a beam record.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordKind {
    /// Only the fields needed for the base beam.
    BaseOnly,
    /// The base fields plus an `snpm` statistics struct.
    WithSnpm(SnpmStats),
}

/// The `beam` record of a MAT-file, read independently of [`TfBeam`].
///
/// [`TfBeam`]: crate::beam::TfBeam
#[derive(Clone, Debug, PartialEq)]
pub struct BeamRecord {
    field_names: Vec<String>,
    kind: RecordKind,
}

impl BeamRecord {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<BeamRecord, LoadError> {
        BeamRecord::from_mat(&MatFile::open(path)?)
    }

    pub fn from_mat(mat: &MatFile) -> Result<BeamRecord, LoadError> {
        let beam = beam_struct(mat)?;
        let kind = match beam.field(SNPM_FIELD) {
            Some(value) => RecordKind::WithSnpm(SnpmStats {
                value: value.clone(),
            }),
            None => RecordKind::BaseOnly,
        };
        Ok(BeamRecord {
            field_names: beam.field_names().to_vec(),
            kind,
        })
    }

    /// Top-level field names of the `beam` struct.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn snpm(&self) -> Option<&SnpmStats> {
        match &self.kind {
            RecordKind::WithSnpm(stats) => Some(stats),
            RecordKind::BaseOnly => None,
        }
    }
}
