use std::fs;
use std::path::{Path, PathBuf};

use dns_core::{DnsError, ErrorInfo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Options;
use crate::output::OutputFiles;

/// Structured manifest describing a finished (or paused) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Options used for the run.
    pub config: Options,
    /// SHA-256 of the canonical JSON encoding of `config`.
    pub config_hash: String,
    /// Seed the run was initialised with.
    pub master_seed: u64,
    /// Optional seed label captured from the options.
    pub seed_label: Option<String>,
    /// Number of levels at the time of writing.
    pub num_levels: usize,
    /// Number of saved particles.
    pub count_saves: usize,
    /// Number of MCMC steps.
    pub count_mcmc_steps: u64,
    /// Output files relative to the run directory.
    pub files: Vec<PathBuf>,
    /// RFC 3339 timestamp of when the manifest was written.
    pub created_at: String,
}

impl RunManifest {
    /// Builds a manifest for the given run state.
    pub fn new(
        config: &Options,
        master_seed: u64,
        num_levels: usize,
        count_saves: usize,
        count_mcmc_steps: u64,
        files: &OutputFiles,
    ) -> Result<Self, DnsError> {
        let relative = |path: &Path| {
            path.strip_prefix(&files.run_directory)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf())
        };
        Ok(Self {
            config: config.clone(),
            config_hash: config_hash(config)?,
            master_seed,
            seed_label: config.seed_policy.label.clone(),
            num_levels,
            count_saves,
            count_mcmc_steps,
            files: [
                &files.levels,
                &files.sample,
                &files.sample_info,
                &files.checkpoint,
            ]
            .into_iter()
            .map(|path| relative(path))
            .collect(),
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), DnsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| DnsError::io("manifest-mkdir", parent, err))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            DnsError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| DnsError::io("manifest-write", path, err))
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, DnsError> {
        let contents =
            fs::read_to_string(path).map_err(|err| DnsError::io("manifest-read", path, err))?;
        serde_json::from_str(&contents).map_err(|err| {
            DnsError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Hex SHA-256 of the JSON encoding of `config`.
pub fn config_hash(config: &Options) -> Result<String, DnsError> {
    let bytes = serde_json::to_vec(config)
        .map_err(|err| DnsError::Serde(ErrorInfo::new("config-serialize", err.to_string())))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
