use dns_core::LikelihoodValue;
use serde::{Deserialize, Serialize};

use crate::config::{AutoLevelConfig, Options};

/// A likelihood stratum together with the statistics used to estimate how
/// much prior mass it encloses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    threshold: LikelihoodValue,
    /// Estimated log prior mass enclosed by the level.
    pub log_x: f64,
    /// Accepted particle moves made at this level.
    pub accepts: u64,
    /// Particle moves attempted at this level.
    pub tries: u64,
    /// Steps that a particle at or above this level spent here.
    pub visits: u64,
    /// Of those visits, how many also exceeded the next level's threshold.
    pub exceeds: u64,
}

impl Level {
    /// Creates a level with zeroed statistics.
    pub fn new(threshold: LikelihoodValue) -> Self {
        Self {
            threshold,
            log_x: 0.0,
            accepts: 0,
            tries: 0,
            visits: 0,
            exceeds: 0,
        }
    }

    /// The bottom level, which accepts every particle.
    pub fn bottom() -> Self {
        Self::new(LikelihoodValue::MINUS_INFINITY)
    }

    /// Minimum likelihood (exclusive) a particle needs to belong here.
    pub fn threshold(&self) -> LikelihoodValue {
        self.threshold
    }

    /// Fraction of attempted moves that were accepted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.tries == 0 {
            0.0
        } else {
            self.accepts as f64 / self.tries as f64
        }
    }

    /// Adds statistics gathered by one worker during a cycle.
    pub fn absorb(&mut self, delta: &LevelStats) {
        self.accepts += delta.accepts;
        self.tries += delta.tries;
        self.visits += delta.visits;
        self.exceeds += delta.exceeds;
    }
}

/// Statistics accumulated privately by a worker between synchronisations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelStats {
    /// Accepted particle moves.
    pub accepts: u64,
    /// Attempted particle moves.
    pub tries: u64,
    /// Visits.
    pub visits: u64,
    /// Visits exceeding the next threshold.
    pub exceeds: u64,
}

/// Level-creation and weighting rules derived from [`Options`].
#[derive(Debug, Clone, PartialEq)]
pub struct LevelPolicy {
    max_num_levels: Option<usize>,
    auto: AutoLevelConfig,
    lambda: f64,
    beta: f64,
    flat_levels: usize,
}

impl LevelPolicy {
    /// Extracts the policy from run options.
    pub fn from_options(options: &Options) -> Self {
        Self {
            max_num_levels: options.max_num_levels,
            auto: options.auto.clone(),
            lambda: options.lambda,
            beta: options.beta,
            flat_levels: options.push_flat_levels,
        }
    }

    /// Strength of the uniform-occupancy drive.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Whether level creation is over.
    ///
    /// With a configured maximum this is a plain count check. Otherwise the
    /// last few levels must each have raised the likelihood threshold by less
    /// than the negligible gain, which signals that the run has reached the
    /// bulk of the posterior.
    pub fn enough_levels(&self, levels: &[Level]) -> bool {
        if let Some(max) = self.max_num_levels {
            return levels.len() >= max;
        }
        if levels.len() < self.auto.min_levels {
            return false;
        }
        let window = if levels.len() > 80 {
            ((self.auto.window as f64) * 0.25 * levels.len() as f64).sqrt() as usize
        } else {
            self.auto.window
        };
        levels
            .windows(2)
            .rev()
            .take(window)
            .all(|pair| pair[1].threshold.log_l() - pair[0].threshold.log_l() < self.auto.log_l_gain)
    }

    /// Log weight of `level` in the level-assignment target.
    ///
    /// Zero within `flat_levels` of the top level and once level creation is
    /// over, decaying linearly with distance below that otherwise.
    pub fn log_push(&self, level: usize, levels: &[Level]) -> f64 {
        if self.enough_levels(levels) {
            return 0.0;
        }
        self.log_push_while_creating(level, levels.len())
    }

    /// [`LevelPolicy::log_push`] for a level stack known to be still growing.
    pub fn log_push_while_creating(&self, level: usize, num_levels: usize) -> f64 {
        let top = num_levels.saturating_sub(1);
        let gap = top.saturating_sub(level);
        if gap <= self.flat_levels {
            0.0
        } else {
            -((gap - self.flat_levels) as f64) / self.lambda
        }
    }
}

/// Creates a level from the pool of likelihoods observed above the current
/// top level.
///
/// The pool is sorted and the sample at quantile `1 - 1/compression` becomes
/// the new threshold, so the new level encloses roughly a `1/compression`
/// fraction of the prior mass above the previous top. Samples at or below the
/// new threshold are drained; the rest stay pooled for the next level.
pub fn create_level(pool: &mut Vec<LikelihoodValue>, compression: f64) -> Option<Level> {
    if pool.is_empty() {
        return None;
    }
    pool.sort_unstable();
    let index = (((1.0 - 1.0 / compression) * pool.len() as f64) as usize).min(pool.len() - 1);
    let threshold = pool[index];
    pool.drain(..=index);
    Some(Level::new(threshold))
}

/// Re-estimates every level's enclosed log prior mass.
///
/// Each ratio `X[i]/X[i-1]` is estimated by the fraction of visits to level
/// `i-1` that exceeded level `i`, regularised towards `1/compression` with
/// `regularisation` pseudo-visits.
pub fn recalculate_log_x(levels: &mut [Level], compression: f64, regularisation: usize) {
    let Some(first) = levels.first_mut() else {
        return;
    };
    first.log_x = 0.0;
    let reg = regularisation as f64;
    for i in 1..levels.len() {
        let below = &levels[i - 1];
        let ratio = (below.exceeds as f64 + reg / compression) / (below.visits as f64 + reg);
        let log_x = below.log_x + ratio.ln();
        levels[i].log_x = log_x;
    }
}

/// Caps the statistics of every level at `regularisation` counts while
/// keeping their ratios, so that the pushed phase does not dominate the
/// estimates gathered once all levels exist.
pub fn renormalise_visits(levels: &mut [Level], regularisation: usize) {
    let reg = regularisation as u64;
    for level in levels.iter_mut() {
        if level.tries >= reg {
            level.accepts = ((level.accepts + 1) as f64 / (level.tries + 1) as f64 * reg as f64) as u64;
            level.tries = reg;
        }
        if level.visits >= reg {
            level.exceeds = ((level.exceeds + 1) as f64 / (level.visits + 1) as f64 * reg as f64) as u64;
            level.visits = reg;
        }
    }
}

/// Whether thresholds never decrease with level index.
pub fn thresholds_non_decreasing(levels: &[Level]) -> bool {
    levels.windows(2).all(|pair| pair[0].threshold <= pair[1].threshold)
}
