//! Batch conversion.

use crate::fixture::{
    base_fields, beam_with, hollow_struct, snpm, stat, write_base_beam, write_stats_beam, Mat,
    MatFileBuilder,
};
use ndarray::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tfbeam::{
    BeamConverter, BeamRecord, ConvertError, ConverterConfig, FailurePolicy, LoadError,
    RecordKind, TfBeam, STAT_NAMES,
};
use tfbeam::mat::ReadMatError;

fn npz(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.npz", stem))
}

#[test]
fn base_only_file_gives_one_archive() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan1.mat");
    write_base_beam(&input);

    let report = BeamConverter::default().convert_file(&input).unwrap();
    assert_eq!(report.input, input);
    assert_eq!(report.saved, [npz(dir.path(), "scan1")]);

    let beam = TfBeam::load(npz(dir.path(), "scan1")).unwrap();
    assert_eq!(beam.uses(), "F dB");
    for &v in beam.data() {
        assert!((v - 10. * 2f64.log10()).abs() < 1e-9);
    }

    let mut entries: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    entries.sort();
    assert_eq!(entries, ["scan1.mat", "scan1.npz"]);
}

#[test]
fn stats_file_gives_base_and_five_stat_archives() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan2.mat");
    write_stats_beam(&input, STAT_NAMES.len());

    let report = BeamConverter::default().convert_file(&input).unwrap();
    let mut expected = vec![npz(dir.path(), "scan2")];
    expected.extend(
        STAT_NAMES
            .iter()
            .map(|name| npz(dir.path(), &format!("scan2_{}", name))),
    );
    assert_eq!(report.saved, expected);

    let base = TfBeam::load(&report.saved[0]).unwrap();
    for (i, (name, path)) in STAT_NAMES.iter().zip(&report.saved[1..]).enumerate() {
        let beam = TfBeam::load(path).unwrap();
        assert_eq!(beam.uses(), *name);
        assert_eq!(beam.data(), &stat(i));
        assert_eq!(beam.voxels(), base.voxels());
        assert_eq!(beam.voxelsize(), base.voxelsize());
        assert_eq!(beam.srate(), base.srate());
        assert_eq!(beam.timewindow(), base.timewindow());
        assert_eq!(beam.bands(), base.bands());
        assert_eq!(beam.timepts(), base.timepts());
    }
}

#[test]
fn record_kind_follows_snpm_field() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.mat");
    let stats = dir.path().join("stats.mat");
    write_base_beam(&plain);
    write_stats_beam(&stats, 3);

    let record = BeamRecord::open(&plain).unwrap();
    assert_eq!(record.kind(), &RecordKind::BaseOnly);
    assert!(record.snpm().is_none());

    let record = BeamRecord::open(&stats).unwrap();
    assert!(record.field_names().iter().any(|name| name == "snpm"));
    let snpm = record.snpm().unwrap();
    assert_eq!(snpm.names(), &STAT_NAMES[..3]);
    assert_eq!(snpm.stat("p_uncorr_pos"), Some(&stat(1)));
    assert_eq!(snpm.stat("p_corr_pos"), None);
}

#[test]
fn missing_stat_keeps_earlier_archives() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan3.mat");
    write_stats_beam(&input, 4);

    match BeamConverter::default().convert_file(&input) {
        Err(ConvertError::FieldMissing { path, field }) => {
            assert_eq!(path, input);
            assert_eq!(field, "p_corr_neg");
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(npz(dir.path(), "scan3").exists());
    for name in &STAT_NAMES[..4] {
        assert!(npz(dir.path(), &format!("scan3_{}", name)).exists());
    }
    assert!(!npz(dir.path(), "scan3_p_corr_neg").exists());
}

#[test]
fn non_numeric_stat_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.mat");
    let mut fields = base_fields();
    fields.push(("snpm", Mat::Struct(vec![("T", Mat::Char("n/a".to_owned()))])));
    beam_with(fields).write(&input);

    assert!(matches!(
        BeamConverter::default().convert_file(&input),
        Err(ConvertError::FieldMissing { field, .. }) if field == "T"
    ));
    assert!(npz(dir.path(), "scan").exists());
}

#[test]
fn stat_with_wrong_voxel_count() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.mat");
    let mut fields = base_fields();
    fields.push((
        "snpm",
        Mat::Struct(vec![("T", Mat::num(Array2::<f64>::zeros((1, 5))))]),
    ));
    beam_with(fields).write(&input);

    assert!(matches!(
        BeamConverter::default().convert_file(&input),
        Err(ConvertError::Derive { field, .. }) if field == "T"
    ));
}

#[test]
fn halt_on_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    let good1 = dir.path().join("good1.mat");
    let bad = dir.path().join("bad.mat");
    let good2 = dir.path().join("good2.mat");
    write_base_beam(&good1);
    fs::write(&bad, b"not a MAT-file").unwrap();
    write_base_beam(&good2);

    let res = BeamConverter::default().run([&good1, &bad, &good2]);
    match res {
        Err(err @ ConvertError::Load { .. }) => {
            assert_eq!(err.path(), bad);
            assert!(matches!(
                err,
                ConvertError::Load {
                    source: LoadError::Mat(_),
                    ..
                }
            ));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(npz(dir.path(), "good1").exists());
    assert!(!npz(dir.path(), "good2").exists());
}

#[test]
fn continue_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let good1 = dir.path().join("good1.mat");
    let bad = dir.path().join("bad.mat");
    let good2 = dir.path().join("good2.mat");
    write_base_beam(&good1);
    fs::write(&bad, b"not a MAT-file").unwrap();
    write_stats_beam(&good2, STAT_NAMES.len());

    let config = ConverterConfig::default().with_failure_policy(FailurePolicy::Continue);
    let summary = BeamConverter::new(config)
        .run([&good1, &bad, &good2])
        .unwrap();
    assert!(!summary.is_success());
    let converted: Vec<&Path> = summary
        .converted
        .iter()
        .map(|report| report.input.as_path())
        .collect();
    assert_eq!(converted, [good1.as_path(), good2.as_path()]);
    assert_eq!(summary.converted[1].saved.len(), 1 + STAT_NAMES.len());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, bad);
    assert!(npz(dir.path(), "good2_p_corr_neg").exists());
}

#[test]
fn compressed_beam_variable() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.mat");
    let mut fields = base_fields();
    fields.push(("snpm", snpm(STAT_NAMES.len())));
    MatFileBuilder::new()
        .variable("comment", &Mat::Char("converted by nut_beamstats".to_owned()))
        .compressed("beam", &Mat::Struct(fields))
        .write(&input);

    let report = BeamConverter::default().convert_file(&input).unwrap();
    assert_eq!(report.saved.len(), 6);
    assert_eq!(TfBeam::load(&report.saved[5]).unwrap().data(), &stat(4));
}

#[test]
fn rerunning_overwrites_with_identical_archives() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.mat");
    write_stats_beam(&input, STAT_NAMES.len());

    let converter = BeamConverter::default();
    let first = converter.run([&input]).unwrap();
    let beams: Vec<TfBeam> = first.converted[0]
        .saved
        .iter()
        .map(|path| TfBeam::load(path).unwrap())
        .collect();

    let second = converter.run([&input]).unwrap();
    assert_eq!(first.converted, second.converted);
    for (path, beam) in second.converted[0].saved.iter().zip(&beams) {
        assert_eq!(&TfBeam::load(path).unwrap(), beam);
    }
}

#[test]
fn oversized_struct_fails_only_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("huge.mat");
    let good = dir.path().join("good.mat");
    MatFileBuilder::new()
        .raw(hollow_struct("beam", &[i32::MAX, i32::MAX], &["s"]))
        .write(&bad);
    write_base_beam(&good);

    let config = ConverterConfig::default().with_failure_policy(FailurePolicy::Continue);
    let summary = BeamConverter::new(config).run([&bad, &good]).unwrap();
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, bad);
    assert!(matches!(
        summary.failed[0].1,
        ConvertError::Load {
            source: LoadError::Mat(ReadMatError::Truncated),
            ..
        }
    ));
    assert_eq!(summary.converted.len(), 1);
    assert!(npz(dir.path(), "good").exists());
}
