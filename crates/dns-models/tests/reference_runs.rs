use dns_core::{Model, RandomStream};
use dns_models::{ClassicMassInf1D, Gaussian1D, SignalData, SpikeModel};
use dns_sampler::{Options, Sampler};

fn small_options(num_particles: usize, num_threads: usize) -> Options {
    let mut options = Options::default();
    options.num_particles = num_particles;
    options.num_threads = num_threads;
    options.max_num_levels = Some(8);
    options.thread_steps = 50;
    options.save_interval = 100;
    options.new_level_interval = 200;
    options.max_num_saves = 1_000;
    options.save_to_disk = false;
    options
}

#[test]
fn gaussian_evidence_is_recovered() {
    let model = Gaussian1D::new(1.0, 10.0);
    let expected = model.log_evidence();
    let mut sampler = Sampler::new(small_options(4, 2), model).unwrap();
    sampler.initialise(2024).unwrap();
    sampler.run().unwrap();

    let posterior = sampler.posterior().unwrap();
    assert!(
        (posterior.log_z - expected).abs() < 1.0,
        "log_z = {}, expected {expected}",
        posterior.log_z
    );
}

#[test]
fn gaussian_proposals_stay_in_the_prior() {
    let mut model = Gaussian1D::default();
    let mut rng = RandomStream::from_seed(6);
    model.from_prior(&mut rng).unwrap();
    for _ in 0..10_000 {
        assert_eq!(model.perturb(&mut rng).unwrap(), 0.0);
        assert!(model.x >= -10.0 && model.x < 10.0);
    }
}

#[test]
fn spike_model_climbs_towards_the_data() {
    let mut rng = RandomStream::from_seed(31);
    let data = SignalData::simulate(&[[-1.0, 3.0], [2.0, 1.5]], 0.5, (-5.0, 5.0), 40, 0.3, &mut rng);
    let prior = ClassicMassInf1D::new(-5.0, 5.0, 0.1, 10.0).unwrap();
    let model = SpikeModel::new(prior, 2, 0.5, data);

    let mut options = small_options(4, 2);
    options.max_num_levels = Some(12);
    let mut sampler = Sampler::new(options, model).unwrap();
    sampler.initialise(5).unwrap();
    let summary = sampler.run().unwrap();

    assert_eq!(summary.num_levels, 12);
    let levels = sampler.levels();
    assert!(levels[11].threshold().log_l() > levels[1].threshold().log_l());
    for particle in sampler.particles() {
        assert_eq!(particle.model.spikes().len(), 2);
        assert!(particle
            .model
            .spikes()
            .iter()
            .all(|[x, mass]| (-5.0..=5.0).contains(x) && *mass >= 0.0));
        assert!(!particle.model.describe().is_empty());
    }
}
