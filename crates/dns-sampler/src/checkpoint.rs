use std::fs;
use std::path::Path;

use dns_core::{DnsError, ErrorInfo, LikelihoodValue, Model};
use serde::{Deserialize, Serialize};

use crate::config::Options;
use crate::level::Level;
use crate::sampler::{Ledger, Particle};

/// Version of the checkpoint layout. Bumped on incompatible changes.
pub const CHECKPOINT_SCHEMA: u32 = 1;

/// Everything needed to resume a run, except the random streams, which are
/// reseeded on restore.
///
/// Encoded with `bincode` so that floats (including the −∞ threshold of the
/// bottom level) survive bit for bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCheckpoint<M> {
    /// Layout version, see [`CHECKPOINT_SCHEMA`].
    pub schema: u32,
    /// Options the run was started with.
    pub options: Options,
    /// Seed the run was initialised with.
    pub master_seed: u64,
    /// Particle states in global index order.
    pub particles: Vec<M>,
    /// Likelihood of each particle.
    pub likelihoods: Vec<LikelihoodValue>,
    /// Level assignment of each particle.
    pub level_assignments: Vec<usize>,
    /// The full level stack with statistics.
    pub levels: Vec<Level>,
    /// Likelihoods pooled for the next level.
    pub pending: Vec<LikelihoodValue>,
    /// Number of particles saved so far.
    pub count_saves: usize,
    /// Number of MCMC steps performed so far.
    pub count_mcmc_steps: u64,
}

impl<M: Model> EngineCheckpoint<M> {
    pub(crate) fn capture<'p>(
        options: &Options,
        master_seed: u64,
        particles: impl Iterator<Item = &'p Particle<M>>,
        ledger: &Ledger<M>,
    ) -> Self
    where
        M: 'p,
    {
        let mut checkpoint = Self {
            schema: CHECKPOINT_SCHEMA,
            options: options.clone(),
            master_seed,
            particles: Vec::with_capacity(options.num_particles),
            likelihoods: Vec::with_capacity(options.num_particles),
            level_assignments: Vec::with_capacity(options.num_particles),
            levels: ledger.levels.clone(),
            pending: ledger.pending.clone(),
            count_saves: ledger.count_saves,
            count_mcmc_steps: ledger.count_mcmc_steps,
        };
        for particle in particles {
            checkpoint.particles.push(particle.model.clone());
            checkpoint.likelihoods.push(particle.likelihood);
            checkpoint.level_assignments.push(particle.level);
        }
        checkpoint
    }

    /// Encodes the checkpoint to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DnsError> {
        bincode::serialize(self)
            .map_err(|err| DnsError::Serde(ErrorInfo::new("checkpoint-serialize", err.to_string())))
    }

    /// Decodes a checkpoint and checks its internal consistency.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DnsError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|err| DnsError::Serde(ErrorInfo::new("checkpoint-parse", err.to_string())))?;
        checkpoint.check()?;
        Ok(checkpoint)
    }

    /// Writes the checkpoint to disk.
    pub fn store(&self, path: &Path) -> Result<(), DnsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| DnsError::io("checkpoint-mkdir", parent, err))?;
        }
        let bytes = self
            .to_bytes()
            .map_err(|err| err.with_context("path", path.display().to_string()))?;
        fs::write(path, bytes).map_err(|err| DnsError::io("checkpoint-write", path, err))
    }

    /// Restores a checkpoint from disk.
    pub fn load(path: &Path) -> Result<Self, DnsError> {
        let bytes = fs::read(path).map_err(|err| DnsError::io("checkpoint-read", path, err))?;
        Self::from_bytes(&bytes).map_err(|err| err.with_context("path", path.display().to_string()))
    }

    /// Verifies that the parallel vectors agree with each other and with the
    /// level stack.
    pub fn check(&self) -> Result<(), DnsError> {
        let invalid = |message: &str| {
            DnsError::Serde(ErrorInfo::new("checkpoint-invalid", message.to_string()))
        };
        if self.schema != CHECKPOINT_SCHEMA {
            return Err(DnsError::Serde(
                ErrorInfo::new("checkpoint-schema", "unsupported checkpoint schema")
                    .with_context("found", self.schema.to_string())
                    .with_context("expected", CHECKPOINT_SCHEMA.to_string()),
            ));
        }
        let n = self.particles.len();
        if self.likelihoods.len() != n || self.level_assignments.len() != n {
            return Err(invalid("particle, likelihood and level vectors differ in length"));
        }
        if n != self.options.num_particles {
            return Err(invalid("particle count does not match the stored options"));
        }
        if self.levels.is_empty() {
            return Err(invalid("checkpoint holds no levels"));
        }
        if self.level_assignments.iter().any(|&level| level >= self.levels.len()) {
            return Err(invalid("level assignment beyond the level stack"));
        }
        Ok(())
    }
}
