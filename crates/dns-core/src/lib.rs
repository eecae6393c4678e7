#![deny(missing_docs)]
#![doc = "Core value types and the model contract for the diffusive nested sampler."]

use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod errors;
pub mod likelihood;
pub mod rng;

pub use errors::{DnsError, ErrorInfo};
pub use likelihood::LikelihoodValue;
pub use rng::{derive_substream_seed, wrap, RandomStream};

/// Capability interface every sampled model implements.
///
/// A model instance is one point in parameter space. The engine clones a
/// prototype once per particle and calls [`Model::from_prior`] on each clone,
/// so data shared by all particles can live in the prototype. Clones are also
/// used to restart lagging particles from healthier ones, and the serde bounds
/// back checkpoints and saved samples.
pub trait Model: Clone + Send + Serialize + DeserializeOwned {
    /// Overwrites the parameters with a draw from the prior.
    fn from_prior(&mut self, rng: &mut RandomStream) -> Result<(), DnsError>;

    /// Proposes a move in place and returns the log Hastings ratio of the
    /// proposal with respect to the prior.
    fn perturb(&mut self, rng: &mut RandomStream) -> Result<f64, DnsError>;

    /// Log-likelihood at the current parameters.
    fn log_likelihood(&self) -> Result<f64, DnsError>;

    /// Single-line human readable description of the parameters.
    fn describe(&self) -> String {
        String::new()
    }
}
