use std::f64::consts::PI;

use dns_core::{wrap, DnsError, Model, RandomStream};
use serde::{Deserialize, Serialize};

use crate::conditional_prior::{ClassicMassInf1D, ConditionalPrior};

/// Noisy observations of a one-dimensional signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalData {
    /// Sample locations.
    pub t: Vec<f64>,
    /// Observed values at `t`.
    pub y: Vec<f64>,
    /// Standard deviation of the observation noise.
    pub sigma: f64,
}

impl SignalData {
    /// Samples `points` evenly spaced observations of `spikes` (pairs of
    /// position and mass) on `[t_min, t_max]` with Gaussian noise.
    pub fn simulate(
        spikes: &[[f64; 2]],
        width: f64,
        (t_min, t_max): (f64, f64),
        points: usize,
        sigma: f64,
        rng: &mut RandomStream,
    ) -> Self {
        let step = (t_max - t_min) / points.saturating_sub(1).max(1) as f64;
        let t: Vec<f64> = (0..points).map(|i| t_min + step * i as f64).collect();
        let y = t
            .iter()
            .map(|&t| signal(spikes, width, t) + sigma * rng.normal())
            .collect();
        Self { t, y, sigma }
    }
}

fn signal(spikes: &[[f64; 2]], width: f64, t: f64) -> f64 {
    spikes
        .iter()
        .map(|[x, mass]| mass * (-0.5 * ((t - x) / width).powi(2)).exp())
        .sum()
}

/// A fixed number of Gaussian-shaped spikes whose positions and masses follow
/// a [`ClassicMassInf1D`] conditional prior.
///
/// Components are perturbed in the prior's uniform space, and stay fixed
/// there while the hyperparameter moves, so every proposal leaves the joint
/// prior invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeModel {
    prior: ClassicMassInf1D,
    spikes: Vec<[f64; 2]>,
    width: f64,
    data: SignalData,
}

impl SpikeModel {
    /// A model with `count` spikes of the given `width`.
    pub fn new(prior: ClassicMassInf1D, count: usize, width: f64, data: SignalData) -> Self {
        Self {
            prior,
            spikes: vec![[0.0, 0.0]; count],
            width,
            data,
        }
    }

    /// Current spikes as (position, mass) pairs.
    pub fn spikes(&self) -> &[[f64; 2]] {
        &self.spikes
    }

    /// Hyperparameters of the component prior.
    pub fn prior(&self) -> &ClassicMassInf1D {
        &self.prior
    }

    fn perturb_spike(&mut self, rng: &mut RandomStream) -> Result<(), DnsError> {
        let which = rng.int_below(self.spikes.len());
        let spike = &mut self.spikes[which];
        self.prior.to_uniform(spike)?;
        let coordinate = rng.int_below(2);
        spike[coordinate] = wrap(spike[coordinate] + rng.randh(), 0.0, 1.0);
        self.prior.from_uniform(spike)
    }

    fn perturb_prior(&mut self, rng: &mut RandomStream) -> Result<f64, DnsError> {
        for spike in &mut self.spikes {
            self.prior.to_uniform(spike)?;
        }
        let log_h = self.prior.perturb_hyperparameters(rng);
        for spike in &mut self.spikes {
            self.prior.from_uniform(spike)?;
        }
        Ok(log_h)
    }
}

impl Model for SpikeModel {
    fn from_prior(&mut self, rng: &mut RandomStream) -> Result<(), DnsError> {
        self.prior.from_prior(rng);
        for spike in &mut self.spikes {
            *spike = [rng.uniform(), rng.uniform()];
            self.prior.from_uniform(spike)?;
        }
        Ok(())
    }

    fn perturb(&mut self, rng: &mut RandomStream) -> Result<f64, DnsError> {
        if self.spikes.is_empty() || rng.uniform() < 0.2 {
            self.perturb_prior(rng)
        } else {
            self.perturb_spike(rng)?;
            Ok(0.0)
        }
    }

    fn log_likelihood(&self) -> Result<f64, DnsError> {
        let sigma = self.data.sigma;
        let norm = -sigma.ln() - 0.5 * (2.0 * PI).ln();
        Ok(self
            .data
            .t
            .iter()
            .zip(&self.data.y)
            .map(|(&t, &y)| {
                let r = (y - signal(&self.spikes, self.width, t)) / sigma;
                norm - 0.5 * r * r
            })
            .sum())
    }

    fn describe(&self) -> String {
        let spikes: Vec<String> = self
            .spikes
            .iter()
            .map(|[x, mass]| format!("{x:.4}:{mass:.4}"))
            .collect();
        format!("mu={} {}", self.prior, spikes.join(" "))
    }
}
