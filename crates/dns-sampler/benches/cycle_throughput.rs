use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dns_core::{wrap, DnsError, Model, RandomStream};
use dns_sampler::{Options, Sampler};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bowl {
    x: [f64; 4],
}

impl Model for Bowl {
    fn from_prior(&mut self, rng: &mut RandomStream) -> Result<(), DnsError> {
        for value in &mut self.x {
            *value = -5.0 + 10.0 * rng.uniform();
        }
        Ok(())
    }

    fn perturb(&mut self, rng: &mut RandomStream) -> Result<f64, DnsError> {
        let which = rng.int_below(self.x.len());
        self.x[which] = wrap(self.x[which] + 10.0 * rng.randh(), -5.0, 5.0);
        Ok(0.0)
    }

    fn log_likelihood(&self) -> Result<f64, DnsError> {
        Ok(-0.5 * self.x.iter().map(|v| v * v).sum::<f64>())
    }
}

fn bench_cycles(c: &mut Criterion) {
    let mut group = c.benchmark_group("dns_cycles");
    for threads in [1, 2, 4] {
        let mut options = Options::default();
        options.num_particles = 8;
        options.num_threads = threads;
        options.max_num_levels = Some(10);
        options.thread_steps = 100;
        options.save_interval = 100 * threads;
        options.new_level_interval = 500;
        options.max_num_saves = 50;
        options.save_to_disk = false;

        group.bench_with_input(BenchmarkId::from_parameter(threads), &options, |b, options| {
            b.iter(|| {
                let mut sampler = Sampler::new(options.clone(), Bowl { x: [0.0; 4] }).unwrap();
                sampler.initialise(42).unwrap();
                sampler.run().unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cycles);
criterion_main!(benches);
