//! This crate converts NUTMEG time-frequency beamformer results, stored as
//! MATLAB [MAT-files], into `.npz` archives that can be opened with
//! `numpy.load` or read back with [`TfBeam::load`].
//!
//! [MAT-files]: https://www.mathworks.com/help/pdf_doc/matlab/matfile_format.pdf
//!
//! A beam file holds a single `beam` struct. Its signal data `s` is turned
//! into one comparison (by default the F ratio in decibels) and saved with
//! the beam's geometry and timing. If the struct also carries an `snpm`
//! field, each SnPM statistic map (`T`, `p_uncorr_pos`, `p_uncorr_neg`,
//! `p_corr_pos`, `p_corr_neg`) is saved as its own beam sharing that
//! metadata.
//!
//! See [`BeamConverter`] for batch conversion and [`TfBeam`] for working with
//! single beams. The [`mat`], [`npy`] and [`archive`] modules expose the file
//! formats underneath.
//!
//! # Example
//!
//! ```no_run
//! use tfbeam::{BeamConverter, ConverterConfig, FailurePolicy};
//!
//! let converter =
//!     BeamConverter::new(ConverterConfig::default().with_failure_policy(FailurePolicy::Continue));
//! let summary = converter.run(["scan1.mat", "scan2.mat"])?;
//! for report in &summary.converted {
//!     println!("{}: {} archive(s)", report.input.display(), report.saved.len());
//! }
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! # Limitations
//!
//! * Only level-5 MAT-files (version 0x0100, as written by MATLAB up to
//!   `-v7`) are read. `-v7.3` files are HDF5 containers and are rejected.
//!
//! * Sparse, complex, object and function-handle arrays are not supported.

pub mod archive;
pub mod beam;
pub mod config;
pub mod convert;
pub mod mat;
pub mod npy;
pub mod record;

pub use crate::beam::{Comparison, DeriveError, LoadError, SaveError, SaveOptions, TfBeam};
pub use crate::config::{ConverterConfig, FailurePolicy, STAT_NAMES};
pub use crate::convert::{BeamConverter, ConversionReport, ConvertError, RunSummary};
pub use crate::npy::{
    ReadNpyError, ReadNpyExt, ReadableElement, WritableElement, WriteNpyError, WriteNpyExt,
};
pub use crate::record::{BeamRecord, RecordKind, SnpmStats};
