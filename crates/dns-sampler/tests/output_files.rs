mod common;

use std::fs;

use common::{quick_options, Gaussian};
use dns_core::DnsError;
use dns_sampler::manifest::config_hash;
use dns_sampler::output::{read_levels, read_sample_info};
use dns_sampler::posterior::analyse_run_directory;
use dns_sampler::{EngineState, RunManifest, Sampler};
use tempfile::tempdir;

#[test]
fn run_directory_holds_levels_samples_and_manifest() {
    let dir = tempdir().unwrap();
    let mut options = quick_options(4, 2);
    options.save_to_disk = true;
    options.output.run_directory = dir.path().join("run");
    options.seed_policy.label = Some("gaussian-smoke".into());

    let mut sampler = Sampler::new(options.clone(), Gaussian { x: 0.0 }).unwrap();
    sampler.initialise(5).unwrap();
    let summary = sampler.run().unwrap();
    let files = sampler.output_files().clone();

    let levels = read_levels(&files.levels).unwrap();
    assert_eq!(levels.len(), sampler.levels().len());
    for (written, live) in levels.iter().zip(sampler.levels()) {
        assert_eq!(written.visits, live.visits);
        assert_eq!(written.exceeds, live.exceeds);
        assert!((written.log_x - live.log_x).abs() < 1e-9);
    }
    assert_eq!(levels[0].threshold().log_l(), f64::NEG_INFINITY);

    let rows = read_sample_info(&files.sample_info).unwrap();
    assert_eq!(rows.len(), summary.count_saves);
    for (row, saved) in rows.iter().zip(sampler.samples()) {
        assert_eq!(row.save, saved.info.save);
        assert_eq!(row.particle, saved.info.particle);
        assert_eq!(row.level, saved.info.level);
    }

    let lines: Vec<String> = fs::read_to_string(&files.sample)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();
    assert_eq!(lines.len(), summary.count_saves);
    let first: Gaussian = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(first, sampler.samples()[0].model);

    let manifest = RunManifest::load(summary.manifest_path.as_deref().unwrap()).unwrap();
    assert_eq!(manifest.config, options);
    assert_eq!(manifest.config_hash, config_hash(&options).unwrap());
    assert_eq!(manifest.master_seed, 5);
    assert_eq!(manifest.seed_label.as_deref(), Some("gaussian-smoke"));
    assert_eq!(manifest.count_saves, summary.count_saves);
    assert!(manifest.files.iter().all(|file| file.is_relative()));
}

#[test]
fn posterior_from_files_agrees_with_memory() {
    let dir = tempdir().unwrap();
    let mut options = quick_options(4, 1);
    options.save_to_disk = true;
    options.output.run_directory = dir.path().to_path_buf();

    let mut sampler = Sampler::new(options.clone(), Gaussian { x: 0.0 }).unwrap();
    sampler.initialise(11).unwrap();
    sampler.run().unwrap();

    let from_memory = sampler.posterior().unwrap();
    let from_files = analyse_run_directory(&options.output).unwrap();
    assert!((from_memory.log_z - from_files.log_z).abs() < 1e-6);
    assert_eq!(from_memory.log_weights.len(), from_files.log_weights.len());
}

#[test]
fn initialise_truncates_previous_samples() {
    let dir = tempdir().unwrap();
    let mut options = quick_options(2, 1);
    options.save_to_disk = true;
    options.max_num_saves = 10;
    options.output.run_directory = dir.path().to_path_buf();

    for _ in 0..2 {
        let mut sampler = Sampler::new(options.clone(), Gaussian { x: 0.0 }).unwrap();
        sampler.initialise(1).unwrap();
        sampler.run().unwrap();
    }
    let rows = read_sample_info(&dir.path().join("sample_info.csv")).unwrap();
    assert_eq!(rows.len(), 10);
}

#[test]
fn manifest_hash_tracks_option_changes() {
    let options = quick_options(4, 2);
    let mut changed = options.clone();
    changed.lambda = 3.0;
    assert_ne!(config_hash(&options).unwrap(), config_hash(&changed).unwrap());
    assert_eq!(config_hash(&options).unwrap().len(), 64);
}

#[test]
fn persistence_failures_surface_from_run() {
    let dir = tempdir().unwrap();
    let run_directory = dir.path().join("run");
    let mut options = quick_options(4, 2);
    options.save_to_disk = true;
    options.output.run_directory = run_directory.clone();

    let mut sampler = Sampler::new(options, Gaussian { x: 0.0 }).unwrap();
    sampler.initialise(6).unwrap();
    fs::remove_dir_all(&run_directory).unwrap();
    fs::write(&run_directory, b"not a directory").unwrap();

    let err = sampler.run().unwrap_err();
    assert!(matches!(err, DnsError::Io(_)));
    assert_eq!(sampler.state(), EngineState::Finished);
    assert_eq!(sampler.count_saves(), 0);
}
