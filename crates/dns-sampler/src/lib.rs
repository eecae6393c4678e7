#![deny(missing_docs)]
#![doc = "Multi-threaded diffusive nested sampling engine with level creation, checkpoints and evidence estimation."]

/// Reusable thread rendezvous used between sampling and bookkeeping.
pub mod barrier;
/// Checkpoint encoding and consistency checks.
pub mod checkpoint;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation and particle partitioning.
pub mod determinism;
/// Level stack, level creation and the push weighting.
pub mod level;
/// Run manifest serialization helpers.
pub mod manifest;
/// Metropolis updates applied to a single particle.
pub mod moves;
/// Level tables and saved sample files.
pub mod output;
/// Evidence and posterior weights from saved samples.
pub mod posterior;
/// The sampling engine and its lifecycle.
pub mod sampler;

pub use checkpoint::{EngineCheckpoint, CHECKPOINT_SCHEMA};
pub use config::{AutoLevelConfig, CheckpointConfig, Options, OutputConfig, SeedPolicy};
pub use level::{Level, LevelPolicy, LevelStats};
pub use manifest::RunManifest;
pub use output::{OutputFiles, SampleInfo};
pub use posterior::{analyse, PosteriorSummary};
pub use sampler::{EngineState, Particle, RunSummary, Sampler, SavedSample};
