use std::fs;
use std::path::{Path, PathBuf};

use dns_core::{DnsError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// YAML-configurable parameters governing a sampler run.
///
/// Every field has a default, so a configuration file only needs to name the
/// options it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Total number of particles, split into contiguous per-thread ranges.
    #[serde(default = "default_num_particles")]
    pub num_particles: usize,
    /// Number of worker threads.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Factor by which each new level shrinks the enclosed prior mass.
    #[serde(default = "default_compression")]
    pub compression: f64,
    /// Maximum number of levels. `None` stops creating levels automatically
    /// once the likelihood gain per level becomes negligible.
    #[serde(default = "default_max_num_levels")]
    pub max_num_levels: Option<usize>,
    /// Thresholds used when `max_num_levels` is `None`.
    #[serde(default)]
    pub auto: AutoLevelConfig,
    /// MCMC steps each thread performs between synchronisations.
    #[serde(default = "default_thread_steps")]
    pub thread_steps: usize,
    /// Total MCMC steps between saved particles.
    #[serde(default = "default_save_interval")]
    pub save_interval: usize,
    /// Number of pooled likelihoods needed before a level is created. Also
    /// the regularisation strength of the prior-mass estimates.
    #[serde(default = "default_new_level_interval")]
    pub new_level_interval: usize,
    /// Particles trailing the top populated level by more than this many
    /// levels are replaced while levels are still being created.
    #[serde(default = "default_lag_margin")]
    pub lag_margin: usize,
    /// Decay length (in levels) of the push towards the top of the stack.
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Strength of the drive towards uniform level occupancy once all levels
    /// exist.
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Number of levels below the top that feel no push at all.
    #[serde(default)]
    pub push_flat_levels: usize,
    /// Number of saved particles after which `run` returns.
    #[serde(default = "default_max_num_saves")]
    pub max_num_saves: usize,
    /// Whether levels, samples and checkpoints are written to disk.
    #[serde(default = "default_save_to_disk")]
    pub save_to_disk: bool,
    /// Checkpointing behaviour.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Master seed and label.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Output file layout.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_num_particles() -> usize {
    5
}

fn default_num_threads() -> usize {
    1
}

fn default_compression() -> f64 {
    std::f64::consts::E
}

fn default_max_num_levels() -> Option<usize> {
    Some(100)
}

fn default_thread_steps() -> usize {
    100
}

fn default_save_interval() -> usize {
    10_000
}

fn default_new_level_interval() -> usize {
    10_000
}

fn default_lag_margin() -> usize {
    40
}

fn default_lambda() -> f64 {
    10.0
}

fn default_beta() -> f64 {
    100.0
}

fn default_max_num_saves() -> usize {
    10_000
}

fn default_save_to_disk() -> bool {
    true
}

impl Default for Options {
    fn default() -> Self {
        Self {
            num_particles: default_num_particles(),
            num_threads: default_num_threads(),
            compression: default_compression(),
            max_num_levels: default_max_num_levels(),
            auto: AutoLevelConfig::default(),
            thread_steps: default_thread_steps(),
            save_interval: default_save_interval(),
            new_level_interval: default_new_level_interval(),
            lag_margin: default_lag_margin(),
            lambda: default_lambda(),
            beta: default_beta(),
            push_flat_levels: 0,
            max_num_saves: default_max_num_saves(),
            save_to_disk: default_save_to_disk(),
            checkpoint: CheckpointConfig::default(),
            seed_policy: SeedPolicy::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Options {
    /// Parses options from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DnsError> {
        serde_yaml::from_str(yaml)
            .map_err(|err| DnsError::Serde(ErrorInfo::new("options-parse", err.to_string())))
    }

    /// Loads options from a YAML file.
    pub fn load(path: &Path) -> Result<Self, DnsError> {
        let contents =
            fs::read_to_string(path).map_err(|err| DnsError::io("options-read", path, err))?;
        Self::from_yaml_str(&contents).map_err(|err| match err {
            DnsError::Serde(info) => {
                DnsError::Serde(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Rejects option combinations that would make a run meaningless or hang.
    pub fn validate(&self) -> Result<(), DnsError> {
        if self.num_threads == 0 {
            return Err(DnsError::config(
                "zero-threads",
                "num_threads",
                "at least one worker thread is required",
            ));
        }
        if self.num_particles == 0 {
            return Err(DnsError::config(
                "zero-particles",
                "num_particles",
                "the particle population is empty",
            ));
        }
        if self.num_particles < self.num_threads {
            return Err(DnsError::Config(
                ErrorInfo::new("idle-threads", "every thread needs at least one particle")
                    .with_context("num_particles", self.num_particles.to_string())
                    .with_context("num_threads", self.num_threads.to_string())
                    .with_hint("raise num_particles or lower num_threads"),
            ));
        }
        if !(self.compression > 1.0) || !self.compression.is_finite() {
            return Err(DnsError::config(
                "bad-compression",
                "compression",
                format!("compression must be finite and > 1, got {}", self.compression),
            ));
        }
        if self.max_num_levels == Some(0) {
            return Err(DnsError::config(
                "zero-levels",
                "max_num_levels",
                "at least the bottom level must be allowed",
            ));
        }
        for (name, value) in [
            ("thread_steps", self.thread_steps),
            ("save_interval", self.save_interval),
            ("new_level_interval", self.new_level_interval),
            ("max_num_saves", self.max_num_saves),
        ] {
            if value == 0 {
                return Err(DnsError::config(
                    "zero-interval",
                    name,
                    format!("{name} must be positive"),
                ));
            }
        }
        if !(self.lambda > 0.0) {
            return Err(DnsError::config(
                "bad-lambda",
                "lambda",
                format!("lambda must be positive, got {}", self.lambda),
            ));
        }
        if !(self.beta >= 0.0) {
            return Err(DnsError::config(
                "bad-beta",
                "beta",
                format!("beta must be non-negative, got {}", self.beta),
            ));
        }
        if self.auto.min_levels < 2 || self.auto.window == 0 {
            return Err(DnsError::config(
                "bad-auto-levels",
                "auto",
                "automatic level detection needs min_levels >= 2 and a positive window",
            ));
        }
        Ok(())
    }
}

/// Stopping rule for level creation when no maximum is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoLevelConfig {
    /// Minimum number of levels before the rule is consulted.
    #[serde(default = "default_auto_min_levels")]
    pub min_levels: usize,
    /// Number of trailing level increments inspected.
    #[serde(default = "default_auto_window")]
    pub window: usize,
    /// Log-likelihood gain per level regarded as negligible.
    #[serde(default = "default_auto_log_l_gain")]
    pub log_l_gain: f64,
}

fn default_auto_min_levels() -> usize {
    10
}

fn default_auto_window() -> usize {
    20
}

fn default_auto_log_l_gain() -> f64 {
    0.8
}

impl Default for AutoLevelConfig {
    fn default() -> Self {
        Self {
            min_levels: default_auto_min_levels(),
            window: default_auto_window(),
            log_l_gain: default_auto_log_l_gain(),
        }
    }
}

/// Checkpointing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Saved particles between checkpoint writes (0 writes only at the end of
    /// a run).
    #[serde(default = "default_checkpoint_interval")]
    pub interval: usize,
}

fn default_checkpoint_interval() -> usize {
    100
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: default_checkpoint_interval(),
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used when the caller does not pass one explicitly.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded in the manifest.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

/// Output directory layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run output. Created if it does not exist.
    #[serde(default = "default_run_directory")]
    pub run_directory: PathBuf,
    /// Level table, rewritten whenever levels change.
    #[serde(default = "default_levels_file")]
    pub levels_file: PathBuf,
    /// One JSON document per saved particle.
    #[serde(default = "default_sample_file")]
    pub sample_file: PathBuf,
    /// Level, likelihood and tiebreaker of each saved particle.
    #[serde(default = "default_sample_info_file")]
    pub sample_info_file: PathBuf,
    /// Binary engine checkpoint.
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: PathBuf,
    /// Run manifest written when `run` returns.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,
}

fn default_run_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_levels_file() -> PathBuf {
    PathBuf::from("levels.csv")
}

fn default_sample_file() -> PathBuf {
    PathBuf::from("sample.jsonl")
}

fn default_sample_info_file() -> PathBuf {
    PathBuf::from("sample_info.csv")
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from("checkpoint.bin")
}

fn default_manifest_file() -> PathBuf {
    PathBuf::from("manifest.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: default_run_directory(),
            levels_file: default_levels_file(),
            sample_file: default_sample_file(),
            sample_info_file: default_sample_info_file(),
            checkpoint_file: default_checkpoint_file(),
            manifest_file: default_manifest_file(),
        }
    }
}

impl OutputConfig {
    /// Resolves a file name against the run directory.
    pub fn path_of(&self, file: &Path) -> PathBuf {
        self.run_directory.join(file)
    }
}
