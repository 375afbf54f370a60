//! Settings for [`BeamConverter`](crate::convert::BeamConverter).

use crate::archive::Compression;
use crate::beam::{Comparison, SaveOptions};

/// The SnPM statistics saved as derived beams, in save order.
pub const STAT_NAMES: [&str; 5] = [
    "T",
    "p_uncorr_pos",
    "p_uncorr_neg",
    "p_corr_pos",
    "p_corr_neg",
];

/// What a batch run does when one input fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run and return the error. Inputs after the failing one are
    /// not touched.
    #[default]
    HaltOnFirst,
    /// Log the error, record it in the run summary and go on with the next
    /// input.
    Continue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConverterConfig {
    /// Comparison used for the base beam.
    pub base_comparison: Comparison,
    /// Statistics read from `snpm`, in the order they are saved.
    pub stat_names: Vec<String>,
    pub save: SaveOptions,
    pub failure_policy: FailurePolicy,
}

impl Default for ConverterConfig {
    fn default() -> ConverterConfig {
        ConverterConfig {
            base_comparison: Comparison::FDb,
            stat_names: STAT_NAMES.iter().map(|&name| name.to_owned()).collect(),
            save: SaveOptions::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl ConverterConfig {
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> ConverterConfig {
        self.failure_policy = policy;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> ConverterConfig {
        self.save.compression = compression;
        self
    }
}
