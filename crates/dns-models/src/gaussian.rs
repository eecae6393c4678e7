use std::f64::consts::PI;

use dns_core::{wrap, DnsError, Model, RandomStream};
use serde::{Deserialize, Serialize};

/// Unit-variance Gaussian likelihood centred on `centre`, with a uniform
/// prior on `[-half_width, half_width]`.
///
/// For a centre well inside the prior the evidence is `1 / (2 half_width)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gaussian1D {
    /// Current position.
    pub x: f64,
    centre: f64,
    half_width: f64,
}

impl Gaussian1D {
    /// A model with prior `U(-half_width, half_width)` and likelihood
    /// `N(x; centre, 1)`.
    pub fn new(centre: f64, half_width: f64) -> Self {
        Self {
            x: 0.0,
            centre,
            half_width,
        }
    }

    /// Analytic log evidence, ignoring the tail mass outside the prior.
    pub fn log_evidence(&self) -> f64 {
        -(2.0 * self.half_width).ln()
    }
}

impl Default for Gaussian1D {
    fn default() -> Self {
        Self::new(0.0, 10.0)
    }
}

impl Model for Gaussian1D {
    fn from_prior(&mut self, rng: &mut RandomStream) -> Result<(), DnsError> {
        self.x = self.half_width * (2.0 * rng.uniform() - 1.0);
        Ok(())
    }

    fn perturb(&mut self, rng: &mut RandomStream) -> Result<f64, DnsError> {
        let width = 2.0 * self.half_width;
        self.x = wrap(self.x + width * rng.randh(), -self.half_width, self.half_width);
        Ok(0.0)
    }

    fn log_likelihood(&self) -> Result<f64, DnsError> {
        let r = self.x - self.centre;
        Ok(-0.5 * r * r - 0.5 * (2.0 * PI).ln())
    }

    fn describe(&self) -> String {
        format!("{}", self.x)
    }
}
