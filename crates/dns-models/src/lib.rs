#![deny(missing_docs)]
#![doc = "Conditional priors and reference models for the diffusive nested sampler."]

/// Hierarchical priors over the components of a model.
pub mod conditional_prior;
/// One-dimensional Gaussian likelihood under a uniform prior.
pub mod gaussian;
/// Sum of Gaussian spikes fitted to a sampled signal.
pub mod spikes;

pub use conditional_prior::{ClassicMassInf1D, ConditionalPrior};
pub use gaussian::Gaussian1D;
pub use spikes::{SignalData, SpikeModel};
