//! Totally ordered likelihood values.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::rng::{wrap, RandomStream};

/// A log-likelihood paired with a uniform tiebreaker.
///
/// Values compare on `log_l` first and fall back to `tiebreak` on exact ties,
/// which gives the strict order needed to pick level thresholds even when a
/// model has likelihood plateaus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LikelihoodValue {
    log_l: f64,
    tiebreak: f64,
}

impl LikelihoodValue {
    /// Threshold of the bottom level: below every finite likelihood.
    pub const MINUS_INFINITY: LikelihoodValue = LikelihoodValue {
        log_l: f64::NEG_INFINITY,
        tiebreak: 0.0,
    };

    /// Creates a value from its parts. `tiebreak` is expected in `[0, 1)`.
    pub fn new(log_l: f64, tiebreak: f64) -> Self {
        Self { log_l, tiebreak }
    }

    /// Creates a value with a fresh uniform tiebreaker.
    pub fn with_random_tiebreak(log_l: f64, rng: &mut RandomStream) -> Self {
        Self::new(log_l, rng.uniform())
    }

    /// Log-likelihood component.
    pub fn log_l(&self) -> f64 {
        self.log_l
    }

    /// Tiebreaker component.
    pub fn tiebreak(&self) -> f64 {
        self.tiebreak
    }

    /// Random-walks the tiebreaker, wrapping it back into `[0, 1)`.
    pub fn perturb_tiebreak(&mut self, rng: &mut RandomStream) {
        self.tiebreak = wrap(self.tiebreak + rng.randh(), 0.0, 1.0);
    }
}

impl PartialEq for LikelihoodValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LikelihoodValue {}

impl PartialOrd for LikelihoodValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LikelihoodValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.log_l
            .total_cmp(&other.log_l)
            .then_with(|| self.tiebreak.total_cmp(&other.tiebreak))
    }
}
