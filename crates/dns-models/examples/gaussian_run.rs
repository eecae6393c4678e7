//! Samples a one-dimensional Gaussian and prints the evidence estimate.
//!
//! ```text
//! cargo run -p dns-models --example gaussian_run -- [options.yaml]
//! ```

use std::path::PathBuf;

use dns_core::DnsError;
use dns_models::Gaussian1D;
use dns_sampler::{Options, Sampler};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), DnsError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = match std::env::args().nth(1) {
        Some(path) => Options::load(&PathBuf::from(path))?,
        None => {
            let mut options = Options::default();
            options.num_particles = 8;
            options.num_threads = 2;
            options.max_num_levels = Some(12);
            options.new_level_interval = 2_000;
            options.save_interval = 1_000;
            options.max_num_saves = 2_000;
            options.output.run_directory = PathBuf::from("runs/gaussian");
            options
        }
    };
    let seed = options.seed_policy.master_seed;

    let model = Gaussian1D::default();
    let expected = model.log_evidence();
    let mut sampler = Sampler::new(options, model)?;
    sampler.initialise(seed)?;
    let summary = sampler.run()?;
    info!(
        levels = summary.num_levels,
        saves = summary.count_saves,
        acceptance = summary.acceptance_rate,
        "run finished"
    );

    let posterior = sampler.posterior()?;
    println!("log(Z) = {:.4} (analytic {:.4})", posterior.log_z, expected);
    println!("H      = {:.4} nats", posterior.information);
    println!("ESS    = {:.1}", posterior.effective_sample_size);
    Ok(())
}
