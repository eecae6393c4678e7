use std::path::Path;

use dns_core::{DnsError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::level::Level;
use crate::output::{self, OutputFiles, SampleInfo};

/// Evidence estimate and posterior weights for a set of saved particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    /// Natural log of the marginal likelihood.
    pub log_z: f64,
    /// Kullback-Leibler divergence from prior to posterior, in nats.
    pub information: f64,
    /// `exp` of the entropy of the normalised weights.
    pub effective_sample_size: f64,
    /// Normalised log posterior weight of each sample, in input order.
    pub log_weights: Vec<f64>,
}

/// Index of the highest level whose threshold `sample` exceeds.
pub fn containing_level(levels: &[Level], sample: &SampleInfo) -> usize {
    levels
        .partition_point(|level| level.threshold() < sample.likelihood)
        .saturating_sub(1)
}

/// Assigns each sample the prior mass of its level shell, shared equally with
/// the other samples in that shell, and integrates the likelihood.
///
/// The shell of level `j` spans `X[j] - X[j+1]`; the top level keeps all of
/// `X[top]`.
pub fn analyse(levels: &[Level], samples: &[SampleInfo]) -> Result<PosteriorSummary, DnsError> {
    if levels.is_empty() || samples.is_empty() {
        return Err(DnsError::Lifecycle(
            ErrorInfo::new("posterior-empty", "no levels or samples to analyse")
                .with_context("levels", levels.len().to_string())
                .with_context("samples", samples.len().to_string()),
        ));
    }

    let membership: Vec<usize> = samples.iter().map(|s| containing_level(levels, s)).collect();
    let mut counts = vec![0usize; levels.len()];
    for &level in &membership {
        counts[level] += 1;
    }
    let log_shell: Vec<f64> = (0..levels.len())
        .map(|j| match levels.get(j + 1) {
            Some(next) => log_diff_exp(levels[j].log_x, next.log_x),
            None => levels[j].log_x,
        })
        .collect();

    let log_terms: Vec<f64> = samples
        .iter()
        .zip(&membership)
        .map(|(sample, &level)| {
            log_shell[level] - (counts[level] as f64).ln() + sample.likelihood.log_l()
        })
        .collect();
    let log_z = log_sum_exp(&log_terms);
    if !log_z.is_finite() {
        return Err(DnsError::Lifecycle(
            ErrorInfo::new("posterior-degenerate", "no sample carries posterior weight")
                .with_hint("check that the saved likelihoods are finite"),
        ));
    }

    let log_weights: Vec<f64> = log_terms.iter().map(|term| term - log_z).collect();
    let mut information = 0.0;
    let mut entropy = 0.0;
    for (log_p, sample) in log_weights.iter().zip(samples) {
        let p = log_p.exp();
        if p > 0.0 {
            information += p * (sample.likelihood.log_l() - log_z);
            entropy -= p * log_p;
        }
    }

    Ok(PosteriorSummary {
        log_z,
        information,
        effective_sample_size: entropy.exp(),
        log_weights,
    })
}

/// Runs [`analyse`] on the level table and sample bookkeeping written to a
/// run directory.
pub fn analyse_run_directory(config: &OutputConfig) -> Result<PosteriorSummary, DnsError> {
    let files = OutputFiles::resolve(config);
    analyse_files(&files.levels, &files.sample_info)
}

/// Runs [`analyse`] on explicit level and sample-info files.
pub fn analyse_files(levels: &Path, sample_info: &Path) -> Result<PosteriorSummary, DnsError> {
    let levels = output::read_levels(levels)?;
    let samples = output::read_sample_info(sample_info)?;
    analyse(&levels, &samples)
}

/// `ln(e^a - e^b)` for `a >= b`.
fn log_diff_exp(a: f64, b: f64) -> f64 {
    if b == f64::NEG_INFINITY {
        return a;
    }
    a + (-(b - a).exp()).ln_1p()
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
