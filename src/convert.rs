//! Batch conversion of beam MAT-files to archives.
//!
//! For every input `<dir>/<base>.mat` the converter saves the base beam to
//! `<dir>/<base>.npz`. If the file's `beam` struct carries an `snpm` field, it
//! then saves one derived beam per configured statistic to
//! `<dir>/<base>_<name>.npz`, in configuration order.

use crate::beam::{archive_path, DeriveError, LoadError, SaveError, TfBeam};
use crate::config::{ConverterConfig, FailurePolicy};
use crate::record::{BeamRecord, RecordKind};
use log::{debug, error, info};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

/// An error converting one input file.
#[derive(Debug)]
pub enum ConvertError {
    Load {
        path: PathBuf,
        source: LoadError,
    },
    /// The `snpm` struct has no numeric array for a configured statistic.
    FieldMissing {
        path: PathBuf,
        field: String,
    },
    Derive {
        path: PathBuf,
        field: String,
        source: DeriveError,
    },
    Save {
        path: PathBuf,
        source: SaveError,
    },
}

impl ConvertError {
    /// The input file that failed.
    pub fn path(&self) -> &Path {
        match self {
            ConvertError::Load { path, .. }
            | ConvertError::FieldMissing { path, .. }
            | ConvertError::Derive { path, .. }
            | ConvertError::Save { path, .. } => path,
        }
    }
}

impl Error for ConvertError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConvertError::Load { source, .. } => Some(source),
            ConvertError::Derive { source, .. } => Some(source),
            ConvertError::Save { source, .. } => Some(source),
            ConvertError::FieldMissing { .. } => None,
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConvertError::Load { path, source } => {
                write!(f, "failed to load {}: {}", path.display(), source)
            }
            ConvertError::FieldMissing { path, field } => write!(
                f,
                "{}: `snpm` has no numeric field `{}`",
                path.display(),
                field
            ),
            ConvertError::Derive {
                path,
                field,
                source,
            } => write!(
                f,
                "{}: cannot derive `{}` beam: {}",
                path.display(),
                field,
                source
            ),
            ConvertError::Save { path, source } => {
                write!(f, "{}: failed to save beam: {}", path.display(), source)
            }
        }
    }
}

/// The files written for one input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionReport {
    pub input: PathBuf,
    /// Paths written, base beam first.
    pub saved: Vec<PathBuf>,
}

/// Outcome of [`BeamConverter::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    pub converted: Vec<ConversionReport>,
    /// Inputs that failed under [`FailurePolicy::Continue`].
    pub failed: Vec<(PathBuf, ConvertError)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Output base for `input`: the path with its final extension removed.
pub fn output_base(input: &Path) -> PathBuf {
    input.with_extension("")
}

/// Output path (before the archive extension) of the statistic `name`.
pub fn stat_output(base: &Path, name: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push("_");
    path.push(name);
    PathBuf::from(path)
}

pub struct BeamConverter {
    config: ConverterConfig,
}

impl Default for BeamConverter {
    fn default() -> BeamConverter {
        BeamConverter::new(ConverterConfig::default())
    }
}

impl BeamConverter {
    pub fn new(config: ConverterConfig) -> BeamConverter {
        BeamConverter { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Converts one MAT-file.
    ///
    /// Artifacts are written one at a time. If a statistic fails, the base
    /// beam and the statistics before it stay on disk.
    pub fn convert_file<P: AsRef<Path>>(&self, input: P) -> Result<ConversionReport, ConvertError> {
        let input = input.as_ref();
        let load_error = |source| ConvertError::Load {
            path: input.to_owned(),
            source,
        };
        let base_beam =
            TfBeam::from_file(input, self.config.base_comparison).map_err(load_error)?;
        // The record is read again for its raw fields.
        debug!("reading beam record of {}", input.display());
        let record = BeamRecord::open(input).map_err(load_error)?;

        let base = output_base(input);
        let mut saved = vec![self.save(&base_beam, &base, input)?];
        if let RecordKind::WithSnpm(stats) = record.kind() {
            for name in &self.config.stat_names {
                let data = stats
                    .stat(name)
                    .ok_or_else(|| ConvertError::FieldMissing {
                        path: input.to_owned(),
                        field: name.clone(),
                    })?;
                let stat_beam =
                    base_beam
                        .derive(data.clone(), name)
                        .map_err(|source| ConvertError::Derive {
                            path: input.to_owned(),
                            field: name.clone(),
                            source,
                        })?;
                saved.push(self.save(&stat_beam, &stat_output(&base, name), input)?);
            }
        }
        Ok(ConversionReport {
            input: input.to_owned(),
            saved,
        })
    }

    fn save(&self, beam: &TfBeam, dest: &Path, input: &Path) -> Result<PathBuf, ConvertError> {
        info!(
            "saving {} beam to {}",
            beam.uses(),
            archive_path(dest).display()
        );
        beam.save_with(dest, &self.config.save)
            .map_err(|source| ConvertError::Save {
                path: input.to_owned(),
                source,
            })
    }

    /// Converts `inputs` in order, following the configured
    /// [`FailurePolicy`].
    pub fn run<I>(&self, inputs: I) -> Result<RunSummary, ConvertError>
    where
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        let mut summary = RunSummary::default();
        for input in inputs {
            let input = input.as_ref();
            match self.convert_file(input) {
                Ok(report) => summary.converted.push(report),
                Err(err) => match self.config.failure_policy {
                    FailurePolicy::HaltOnFirst => return Err(err),
                    FailurePolicy::Continue => {
                        error!("{}", err);
                        summary.failed.push((input.to_owned(), err));
                    }
                },
            }
        }
        debug!(
            "converted {} file(s), {} failed",
            summary.converted.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}
