use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use dns_core::{DnsError, LikelihoodValue, Model, RandomStream};

use crate::level::{Level, LevelPolicy, LevelStats};
use crate::sampler::Particle;

/// Result of a particle position update.
#[derive(Debug)]
pub enum PositionOutcome {
    /// The proposal replaced the particle.
    Accepted,
    /// The proposal was discarded.
    Rejected,
    /// The model failed; the proposal was discarded.
    Failed(DnsError),
}

/// Proposes a new position for `particle` and accepts it under the prior
/// constrained to the particle's level.
///
/// Models explore the prior, so the Metropolis ratio is the proposal's
/// Hastings term alone, combined with a hard rejection of candidates that do
/// not exceed the level threshold. The push weight depends only on the level
/// index, which this move never changes. The candidate's tiebreaker is a
/// random walk from the particle's current one.
///
/// A model that panics inside `perturb` or `log_likelihood` is reported as
/// [`PositionOutcome::Failed`] and leaves the particle untouched.
pub fn update_position<M: Model>(
    particle: &mut Particle<M>,
    levels: &[Level],
    stats: &mut [LevelStats],
    rng: &mut RandomStream,
) -> PositionOutcome {
    let level = particle.level;
    stats[level].tries += 1;

    let mut proposal = particle.model.clone();
    let log_h = match guarded(|| proposal.perturb(rng)) {
        Ok(log_h) if !log_h.is_nan() => log_h.min(0.0),
        Ok(_) => {
            return PositionOutcome::Failed(DnsError::model(
                "nan-hastings",
                "proposal returned a NaN Hastings ratio",
            ))
        }
        Err(err) => return PositionOutcome::Failed(err),
    };
    let log_l = match guarded(|| proposal.log_likelihood()) {
        Ok(log_l) if !log_l.is_nan() => log_l,
        Ok(_) => {
            return PositionOutcome::Failed(DnsError::model(
                "nan-likelihood",
                "log-likelihood evaluated to NaN",
            ))
        }
        Err(err) => return PositionOutcome::Failed(err),
    };
    let mut candidate = LikelihoodValue::new(log_l, particle.likelihood.tiebreak());
    candidate.perturb_tiebreak(rng);

    if rng.uniform().ln() < log_h && levels[level].threshold() < candidate {
        particle.model = proposal;
        particle.likelihood = candidate;
        stats[level].accepts += 1;
        PositionOutcome::Accepted
    } else {
        PositionOutcome::Rejected
    }
}

/// Runs a model call, turning a panic into a model error.
fn guarded<T>(call: impl FnOnce() -> Result<T, DnsError>) -> Result<T, DnsError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(DnsError::model("model-panic", panic_message(payload.as_ref())))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("model panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("model panicked: {message}")
    } else {
        "model panicked".to_owned()
    }
}

/// Proposes moving `current` one level up or down, clamped to the stack.
pub fn propose_level(current: usize, num_levels: usize, rng: &mut RandomStream) -> usize {
    if rng.uniform() < 0.5 {
        current.saturating_sub(1)
    } else {
        (current + 1).min(num_levels.saturating_sub(1))
    }
}

/// Log Metropolis ratio (before capping) of moving from level `current` to
/// level `proposal`.
///
/// The prior-mass term makes the walk spend equal effort per level, the push
/// term tilts it towards the top while levels are being created, and once
/// they all exist the `beta` term steers occupancy towards uniform using how
/// often each level has been tried (global counts plus `stats` gathered in the
/// current cycle).
pub fn level_log_acceptance(
    current: usize,
    proposal: usize,
    levels: &[Level],
    stats: &[LevelStats],
    policy: &LevelPolicy,
    creating: bool,
) -> f64 {
    let mut log_a = levels[current].log_x - levels[proposal].log_x;
    if creating {
        log_a += policy.log_push_while_creating(proposal, levels.len())
            - policy.log_push_while_creating(current, levels.len());
    } else if policy.beta() > 0.0 {
        let tries = |j: usize| (levels[j].tries + stats.get(j).map_or(0, |s| s.tries)) as f64 + 1.0;
        log_a += policy.beta() * (tries(current) / tries(proposal)).ln();
    }
    log_a
}

/// One Metropolis step of the particle's level assignment. Returns whether
/// the particle moved.
pub fn update_level_assignment<M>(
    particle: &mut Particle<M>,
    levels: &[Level],
    stats: &[LevelStats],
    policy: &LevelPolicy,
    creating: bool,
    rng: &mut RandomStream,
) -> bool {
    let current = particle.level;
    let proposal = propose_level(current, levels.len(), rng);
    if proposal == current {
        return false;
    }
    let log_a = level_log_acceptance(current, proposal, levels, stats, policy, creating).min(0.0);
    if rng.uniform() <= log_a.exp() && levels[proposal].threshold() < particle.likelihood {
        particle.level = proposal;
        true
    } else {
        false
    }
}

/// Records a visit of a particle with `likelihood` at `level`, walking up the
/// stack for as long as it also exceeds the next threshold.
pub fn accumulate_visits(
    likelihood: LikelihoodValue,
    level: usize,
    levels: &[Level],
    stats: &mut [LevelStats],
) {
    let mut j = level;
    while j + 1 < levels.len() {
        stats[j].visits += 1;
        if levels[j + 1].threshold() < likelihood {
            stats[j].exceeds += 1;
            j += 1;
        } else {
            break;
        }
    }
}

/// Replaces every particle trailing the highest assigned level by more than
/// `margin` levels with a clone of a uniformly chosen non-lagging particle.
/// Returns how many particles were replaced.
pub fn kill_lagging_particles<M: Clone>(
    mut particles: Vec<&mut Particle<M>>,
    margin: usize,
    rng: &mut RandomStream,
) -> usize {
    let Some(max_level) = particles.iter().map(|particle| particle.level).max() else {
        return 0;
    };
    let lagging = |level: usize| level + margin < max_level;
    let donors: Vec<usize> = particles
        .iter()
        .enumerate()
        .filter(|(_, particle)| !lagging(particle.level))
        .map(|(index, _)| index)
        .collect();

    let mut replaced = 0;
    for index in 0..particles.len() {
        if lagging(particles[index].level) {
            let donor = donors[rng.int_below(donors.len())];
            let copy = particles[donor].clone();
            *particles[index] = copy;
            replaced += 1;
        }
    }
    replaced
}
