use std::fmt;

use dns_core::{wrap, DnsError, RandomStream};
use serde::{Deserialize, Serialize};

/// Prior over model components whose shape depends on hyperparameters that
/// are themselves sampled.
///
/// Components are flat `f64` vectors. `from_uniform` and `to_uniform` map a
/// component to and from the unit hypercube under the current
/// hyperparameters, which lets a model keep its components fixed in uniform
/// space while the hyperparameters move.
pub trait ConditionalPrior: fmt::Display {
    /// Draws the hyperparameters from their prior.
    fn from_prior(&mut self, rng: &mut RandomStream);

    /// Proposes new hyperparameters in place and returns the log Hastings
    /// ratio.
    fn perturb_hyperparameters(&mut self, rng: &mut RandomStream) -> f64;

    /// Log density of one component given the hyperparameters.
    fn log_pdf(&self, component: &[f64]) -> f64;

    /// Maps a component from the unit hypercube to parameter space.
    fn from_uniform(&self, component: &mut [f64]) -> Result<(), DnsError>;

    /// Maps a component from parameter space to the unit hypercube.
    fn to_uniform(&self, component: &mut [f64]) -> Result<(), DnsError>;
}

/// Point masses on an interval: positions uniform on `[x_min, x_max]`,
/// masses exponential with mean `mu`, and `mu` log-uniform on
/// `[mu_min, mu_max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicMassInf1D {
    x_min: f64,
    x_max: f64,
    mu_min: f64,
    mu_max: f64,
    mu: f64,
}

impl ClassicMassInf1D {
    /// Builds the prior. Bounds must be ordered and `mu_min` positive.
    pub fn new(x_min: f64, x_max: f64, mu_min: f64, mu_max: f64) -> Result<Self, DnsError> {
        if !(x_min < x_max) {
            return Err(DnsError::config(
                "bad-position-range",
                "x_min",
                format!("x_min ({x_min}) must be below x_max ({x_max})"),
            ));
        }
        if !(mu_min > 0.0 && mu_min < mu_max) {
            return Err(DnsError::config(
                "bad-mass-range",
                "mu_min",
                format!("need 0 < mu_min < mu_max, got {mu_min} and {mu_max}"),
            ));
        }
        Ok(Self {
            x_min,
            x_max,
            mu_min,
            mu_max,
            mu: (mu_min * mu_max).sqrt(),
        })
    }

    /// Current mean of the mass distribution.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    fn check_len(component: &[f64]) -> Result<(), DnsError> {
        if component.len() == 2 {
            Ok(())
        } else {
            Err(DnsError::model(
                "component-shape",
                format!("expected (position, mass), got {} values", component.len()),
            ))
        }
    }
}

impl ConditionalPrior for ClassicMassInf1D {
    fn from_prior(&mut self, rng: &mut RandomStream) {
        self.mu = (self.mu_min.ln() + (self.mu_max / self.mu_min).ln() * rng.uniform()).exp();
    }

    fn perturb_hyperparameters(&mut self, rng: &mut RandomStream) -> f64 {
        let log_mu = self.mu.ln() + (self.mu_max / self.mu_min).ln() * rng.randh();
        self.mu = wrap(log_mu, self.mu_min.ln(), self.mu_max.ln()).exp();
        0.0
    }

    fn log_pdf(&self, component: &[f64]) -> f64 {
        let [x, mass] = component else {
            return f64::NEG_INFINITY;
        };
        if *x < self.x_min || *x > self.x_max || *mass < 0.0 {
            return f64::NEG_INFINITY;
        }
        -(self.x_max - self.x_min).ln() - self.mu.ln() - mass / self.mu
    }

    fn from_uniform(&self, component: &mut [f64]) -> Result<(), DnsError> {
        Self::check_len(component)?;
        component[0] = self.x_min + (self.x_max - self.x_min) * component[0];
        component[1] = -self.mu * (1.0 - component[1]).ln();
        Ok(())
    }

    fn to_uniform(&self, component: &mut [f64]) -> Result<(), DnsError> {
        Self::check_len(component)?;
        component[0] = (component[0] - self.x_min) / (self.x_max - self.x_min);
        component[1] = 1.0 - (-component[1] / self.mu).exp();
        Ok(())
    }
}

impl fmt::Display for ClassicMassInf1D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mu)
    }
}
