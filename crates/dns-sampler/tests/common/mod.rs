#![allow(dead_code)]

use std::f64::consts::PI;

use dns_core::{wrap, DnsError, Model, RandomStream};
use dns_sampler::Options;
use serde::{Deserialize, Serialize};

/// Unit Gaussian likelihood under a uniform prior on [-10, 10]. The evidence
/// is 1/20 to high accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    pub x: f64,
}

impl Model for Gaussian {
    fn from_prior(&mut self, rng: &mut RandomStream) -> Result<(), DnsError> {
        self.x = -10.0 + 20.0 * rng.uniform();
        Ok(())
    }

    fn perturb(&mut self, rng: &mut RandomStream) -> Result<f64, DnsError> {
        self.x = wrap(self.x + 20.0 * rng.randh(), -10.0, 10.0);
        Ok(0.0)
    }

    fn log_likelihood(&self) -> Result<f64, DnsError> {
        Ok(-0.5 * self.x * self.x - 0.5 * (2.0 * PI).ln())
    }
}

/// Likelihood that never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flat {
    pub x: f64,
}

impl Model for Flat {
    fn from_prior(&mut self, rng: &mut RandomStream) -> Result<(), DnsError> {
        self.x = rng.uniform();
        Ok(())
    }

    fn perturb(&mut self, rng: &mut RandomStream) -> Result<f64, DnsError> {
        self.x = wrap(self.x + rng.randh(), 0.0, 1.0);
        Ok(0.0)
    }

    fn log_likelihood(&self) -> Result<f64, DnsError> {
        Ok(0.0)
    }
}

/// Gaussian whose proposals fail outright on a fraction of calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flaky {
    pub inner: Gaussian,
    pub fail_prior: bool,
}

impl Model for Flaky {
    fn from_prior(&mut self, rng: &mut RandomStream) -> Result<(), DnsError> {
        if self.fail_prior {
            return Err(DnsError::model("prior-failed", "prior draw refused"));
        }
        self.inner.from_prior(rng)
    }

    fn perturb(&mut self, rng: &mut RandomStream) -> Result<f64, DnsError> {
        if rng.uniform() < 0.1 {
            return Err(DnsError::model("proposal-failed", "proposal refused"));
        }
        self.inner.perturb(rng)
    }

    fn log_likelihood(&self) -> Result<f64, DnsError> {
        self.inner.log_likelihood()
    }
}

/// Small in-memory run used by most engine tests.
pub fn quick_options(num_particles: usize, num_threads: usize) -> Options {
    let mut options = Options::default();
    options.num_particles = num_particles;
    options.num_threads = num_threads;
    options.max_num_levels = Some(6);
    options.thread_steps = 50;
    options.save_interval = 100;
    options.new_level_interval = 200;
    options.max_num_saves = 200;
    options.save_to_disk = false;
    options
}
