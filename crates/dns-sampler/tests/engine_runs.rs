mod common;

use common::{quick_options, Flaky, Flat, Gaussian};
use dns_core::DnsError;
use dns_sampler::level::thresholds_non_decreasing;
use dns_sampler::{EngineState, Sampler};

#[test]
fn constant_likelihood_terminates_with_one_level() {
    let mut options = quick_options(1, 1);
    options.max_num_levels = Some(1);
    options.thread_steps = 10;
    options.save_interval = 10;
    options.new_level_interval = 10;
    options.max_num_saves = 5;

    let mut sampler = Sampler::new(options, Flat { x: 0.0 }).unwrap();
    sampler.initialise(1).unwrap();
    let summary = sampler.run().unwrap();

    assert_eq!(summary.count_saves, 5);
    assert_eq!(summary.num_levels, 1);
    assert!(summary.enough_levels);
    assert_eq!(sampler.levels().len(), 1);
    assert_eq!(sampler.samples().len(), 5);
    assert_eq!(sampler.state(), EngineState::Finished);
    assert!(summary.checkpoint_path.is_none());
}

#[test]
fn gaussian_run_builds_a_compressing_ladder() {
    let mut options = quick_options(4, 2);
    options.max_num_levels = Some(8);
    options.max_num_saves = 1_000;

    let mut sampler = Sampler::new(options, Gaussian { x: 0.0 }).unwrap();
    sampler.initialise(42).unwrap();
    let summary = sampler.run().unwrap();

    assert_eq!(summary.num_levels, 8);
    assert!(sampler.enough_levels());
    assert_eq!(summary.count_mcmc_steps, 100_000);
    let levels = sampler.levels();
    assert!(thresholds_non_decreasing(levels));
    assert_eq!(levels[0].log_x, 0.0);
    for pair in levels.windows(2) {
        assert!(pair[1].log_x < pair[0].log_x);
    }
    for particle in sampler.particles() {
        assert!(levels[particle.level].threshold() < particle.likelihood);
    }
    assert!(summary.acceptance_rate > 0.0 && summary.acceptance_rate <= 1.0);

    let posterior = sampler.posterior().unwrap();
    assert!(
        (posterior.log_z - (1.0f64 / 20.0).ln()).abs() < 1.0,
        "log_z = {}",
        posterior.log_z
    );
    assert!(posterior.information > 0.0);
    assert!(posterior.effective_sample_size > 1.0);
}

#[test]
fn automatic_level_rule_stops_creation_and_freezes_the_ladder() {
    let mut options = quick_options(4, 2);
    options.max_num_levels = None;
    options.max_num_saves = 5_000;

    let mut sampler = Sampler::new(options, Gaussian { x: 0.0 }).unwrap();
    sampler.initialise(42).unwrap();
    let summary = sampler.run().unwrap();

    assert!(summary.enough_levels);
    assert!(sampler.enough_levels());
    let num_levels = summary.num_levels;
    assert!(num_levels > 1);
    let levels = sampler.levels();
    assert_eq!(levels[0].log_x, 0.0);
    for pair in levels.windows(2) {
        assert!(pair[1].log_x < pair[0].log_x);
    }
    let thresholds: Vec<_> = levels.iter().map(|level| level.threshold()).collect();

    sampler.increase_max_num_saves(200);
    let resumed = sampler.run().unwrap();
    assert_eq!(resumed.num_levels, num_levels);
    assert!(resumed.enough_levels);
    let after: Vec<_> = sampler.levels().iter().map(|level| level.threshold()).collect();
    assert_eq!(after, thresholds);
}

#[test]
fn particles_stay_above_their_level_after_every_run() {
    let mut sampler = Sampler::new(quick_options(6, 3), Gaussian { x: 0.0 }).unwrap();
    sampler.initialise(9).unwrap();
    for round in 0..4 {
        if round > 0 {
            sampler.increase_max_num_saves(50);
        }
        sampler.run().unwrap();
        let levels = sampler.levels();
        assert!(thresholds_non_decreasing(levels));
        for particle in sampler.particles() {
            assert!(particle.level < levels.len());
            assert!(levels[particle.level].threshold() < particle.likelihood);
        }
    }
    assert_eq!(sampler.count_saves(), 350);
}

#[test]
fn same_seed_gives_identical_runs() {
    for threads in [1, 2] {
        let run = || {
            let mut sampler = Sampler::new(quick_options(4, threads), Gaussian { x: 0.0 }).unwrap();
            sampler.initialise(77).unwrap();
            sampler.run().unwrap();
            sampler
        };
        let first = run();
        let second = run();
        assert_eq!(first.levels(), second.levels());
        assert_eq!(first.particles(), second.particles());
        assert_eq!(first.samples(), second.samples());
        assert_eq!(first.count_mcmc_steps(), second.count_mcmc_steps());
    }
}

#[test]
fn different_seeds_diverge() {
    let run = |seed| {
        let mut sampler = Sampler::new(quick_options(4, 1), Gaussian { x: 0.0 }).unwrap();
        sampler.initialise(seed).unwrap();
        sampler.run().unwrap();
        sampler.log_likelihoods()
    };
    assert_ne!(run(1), run(2));
}

#[test]
fn run_requires_initialisation() {
    let mut sampler = Sampler::new(quick_options(2, 1), Gaussian { x: 0.0 }).unwrap();
    assert_eq!(sampler.state(), EngineState::Uninitialized);
    let err = sampler.run().unwrap_err();
    assert!(matches!(err, DnsError::Lifecycle(_)));
    assert_eq!(err.info().code, "invalid-transition");
}

#[test]
fn finished_engine_only_resumes_with_more_quota() {
    let mut sampler = Sampler::new(quick_options(2, 1), Gaussian { x: 0.0 }).unwrap();
    sampler.initialise(3).unwrap();
    sampler.run().unwrap();
    assert!(matches!(sampler.run(), Err(DnsError::Lifecycle(_))));
    assert!(matches!(sampler.initialise(3), Err(DnsError::Lifecycle(_))));

    let steps = sampler.count_mcmc_steps();
    sampler.increase_max_num_saves(10);
    let summary = sampler.run().unwrap();
    assert_eq!(summary.count_saves, 210);
    assert!(summary.count_mcmc_steps > steps);
}

#[test]
fn invalid_options_are_rejected_up_front() {
    let err = Sampler::new(quick_options(1, 2), Gaussian { x: 0.0 }).unwrap_err();
    assert!(matches!(err, DnsError::Config(_)));
    assert_eq!(err.info().code, "idle-threads");
}

#[test]
fn prior_failures_abort_initialisation() {
    let model = Flaky {
        inner: Gaussian { x: 0.0 },
        fail_prior: true,
    };
    let mut sampler = Sampler::new(quick_options(3, 1), model).unwrap();
    let err = sampler.initialise(5).unwrap_err();
    assert!(matches!(err, DnsError::Model(_)));
    assert_eq!(err.info().context.get("particle").map(String::as_str), Some("0"));
    assert_eq!(sampler.state(), EngineState::Uninitialized);
}

#[test]
fn proposal_failures_are_rejected_and_counted() {
    let model = Flaky {
        inner: Gaussian { x: 0.0 },
        fail_prior: false,
    };
    let mut sampler = Sampler::new(quick_options(4, 2), model).unwrap();
    sampler.initialise(8).unwrap();
    let summary = sampler.run().unwrap();
    assert_eq!(summary.count_saves, 200);
    assert!(summary.model_failures > 0);
    for particle in sampler.particles() {
        assert!(particle.likelihood.log_l().is_finite());
    }
}

#[test]
fn kill_lagging_is_idempotent_on_a_fresh_population() {
    let mut sampler = Sampler::new(quick_options(5, 1), Gaussian { x: 0.0 }).unwrap();
    sampler.initialise(12).unwrap();
    assert_eq!(sampler.kill_lagging_particles(), 0);
    assert_eq!(sampler.level_assignments(), vec![0; 5]);
}
