//! Converts NUTMEG beam MAT-files, and the SnPM statistics stored with them,
//! into tfbeam `.npz` archives written next to each input.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tfbeam::archive::Compression;
use tfbeam::{BeamConverter, ConverterConfig, FailurePolicy};

#[derive(Parser)]
#[command(name = "extract_stats_tfbeams")]
#[command(version)]
#[command(about = "Save the F dB beam and SnPM statistic beams of each MAT-file as .npz archives")]
struct Cli {
    /// Beam MAT-files to convert, in order
    #[arg(required = true)]
    matfiles: Vec<PathBuf>,

    /// Convert the remaining files when one fails, instead of stopping
    #[arg(short, long)]
    keep_going: bool,

    /// Store archive members uncompressed
    #[arg(long)]
    stored: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = ConverterConfig::default();
    if cli.keep_going {
        config = config.with_failure_policy(FailurePolicy::Continue);
    }
    if cli.stored {
        config = config.with_compression(Compression::Stored);
    }

    let summary = BeamConverter::new(config)
        .run(&cli.matfiles)
        .context("conversion stopped")?;
    if !summary.is_success() {
        bail!(
            "{} of {} file(s) failed",
            summary.failed.len(),
            cli.matfiles.len()
        );
    }
    Ok(())
}
