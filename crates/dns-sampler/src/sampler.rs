use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use dns_core::{DnsError, ErrorInfo, LikelihoodValue, Model, RandomStream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::barrier::Barrier;
use crate::checkpoint::EngineCheckpoint;
use crate::config::Options;
use crate::determinism;
use crate::level::{self, Level, LevelPolicy, LevelStats};
use crate::manifest::RunManifest;
use crate::moves::{self, PositionOutcome};
use crate::output::{OutputFiles, SampleInfo};
use crate::posterior::{self, PosteriorSummary};

/// A model instance together with its likelihood and level assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle<M> {
    /// Position in parameter space.
    pub model: M,
    /// Likelihood at `model`.
    pub likelihood: LikelihoodValue,
    /// Index of the level the particle currently belongs to.
    pub level: usize,
}

/// A particle saved during the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedSample<M> {
    /// Bookkeeping record.
    pub info: SampleInfo,
    /// Copy of the particle state.
    pub model: M,
}

/// Lifecycle of a [`Sampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Options validated, no particles yet.
    Uninitialized,
    /// Particles drawn (or restored) and ready to run.
    Initialized,
    /// Worker threads are active.
    Running,
    /// The save quota was reached.
    Finished,
}

/// Summary returned to callers after a run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of levels at the end of the run.
    pub num_levels: usize,
    /// Whether level creation has finished.
    pub enough_levels: bool,
    /// Number of particles saved so far.
    pub count_saves: usize,
    /// Number of MCMC steps performed so far.
    pub count_mcmc_steps: u64,
    /// Fraction of particle moves accepted, over all levels.
    pub acceptance_rate: f64,
    /// Particle moves rejected because the model failed.
    pub model_failures: u64,
    /// Particles restarted by cloning.
    pub particles_replaced: u64,
    /// Checkpoint written at the end of the run.
    pub checkpoint_path: Option<PathBuf>,
    /// Manifest written at the end of the run.
    pub manifest_path: Option<PathBuf>,
}

/// Global state mutated only by bookkeeping.
#[derive(Debug)]
pub(crate) struct Ledger<M> {
    pub(crate) levels: Vec<Level>,
    pub(crate) pending: Vec<LikelihoodValue>,
    pub(crate) count_saves: usize,
    pub(crate) count_mcmc_steps: u64,
    samples: Vec<SavedSample<M>>,
    rng: RandomStream,
    model_failures: u64,
    particles_replaced: u64,
}

impl<M> Ledger<M> {
    fn new(master_seed: u64) -> Self {
        Self {
            levels: vec![Level::bottom()],
            pending: Vec::new(),
            count_saves: 0,
            count_mcmc_steps: 0,
            samples: Vec::new(),
            rng: RandomStream::from_seed(determinism::bookkeeping_seed(master_seed)),
            model_failures: 0,
            particles_replaced: 0,
        }
    }
}

/// Multi-threaded Diffusive Nested Sampling engine.
///
/// The particle population lives in one contiguous vector; worker `t` owns the
/// index range `ranges[t]` for the whole run. Between synchronisations each
/// worker reads an immutable snapshot of the level stack and writes only its
/// own particles, statistics and pooled likelihoods. Thread 0 then runs the
/// bookkeeping phase while the others wait at the barrier.
#[derive(Debug)]
pub struct Sampler<M: Model> {
    options: Options,
    policy: LevelPolicy,
    output: OutputFiles,
    state: EngineState,
    prototype: M,
    master_seed: u64,
    ranges: Vec<Range<usize>>,
    rngs: Vec<RandomStream>,
    particles: Vec<Particle<M>>,
    ledger: Ledger<M>,
}

impl<M: Model> Sampler<M> {
    /// Creates an engine after validating `options`. `prototype` is cloned
    /// once per particle before each clone is drawn from the prior.
    pub fn new(options: Options, prototype: M) -> Result<Self, DnsError> {
        options.validate()?;
        let master_seed = options.seed_policy.master_seed;
        Ok(Self {
            policy: LevelPolicy::from_options(&options),
            output: OutputFiles::resolve(&options.output),
            ranges: determinism::thread_ranges(options.num_particles, options.num_threads),
            state: EngineState::Uninitialized,
            prototype,
            master_seed,
            rngs: Vec::new(),
            particles: Vec::new(),
            ledger: Ledger::new(master_seed),
            options,
        })
    }

    /// Rebuilds an engine from a checkpoint. Random streams restart from
    /// `seed`; everything else resumes where the checkpoint left off.
    pub fn from_checkpoint(checkpoint: EngineCheckpoint<M>, seed: u64) -> Result<Self, DnsError> {
        checkpoint.check()?;
        let EngineCheckpoint {
            options,
            particles,
            likelihoods,
            level_assignments,
            levels,
            pending,
            count_saves,
            count_mcmc_steps,
            ..
        } = checkpoint;
        let prototype = particles.first().cloned().ok_or_else(|| {
            DnsError::Serde(ErrorInfo::new("checkpoint-empty", "checkpoint holds no particles"))
        })?;
        let mut sampler = Self::new(options, prototype)?;
        sampler.master_seed = seed;
        sampler.rngs = determinism::worker_streams(seed, sampler.options.num_threads);
        sampler.particles = particles
            .into_iter()
            .zip(likelihoods)
            .zip(level_assignments)
            .map(|((model, likelihood), level)| Particle {
                model,
                likelihood,
                level,
            })
            .collect();
        sampler.ledger = Ledger {
            levels,
            pending,
            count_saves,
            count_mcmc_steps,
            ..Ledger::new(seed)
        };
        sampler.state = if count_saves >= sampler.options.max_num_saves {
            EngineState::Finished
        } else {
            EngineState::Initialized
        };
        Ok(sampler)
    }

    /// Loads a checkpoint file and rebuilds the engine from it.
    pub fn load_checkpoint(path: &Path, seed: u64) -> Result<Self, DnsError> {
        Self::from_checkpoint(EngineCheckpoint::load(path)?, seed)
    }

    /// Seeds every worker stream from `seed`, draws all particles from the
    /// prior and assigns them to the bottom level. Any model failure here is
    /// fatal.
    pub fn initialise(&mut self, seed: u64) -> Result<(), DnsError> {
        if !matches!(
            self.state,
            EngineState::Uninitialized | EngineState::Initialized
        ) {
            return Err(self.transition_error("initialise"));
        }
        self.master_seed = seed;
        self.rngs = determinism::worker_streams(seed, self.options.num_threads);
        self.ledger = Ledger::new(seed);

        let mut particles = Vec::with_capacity(self.options.num_particles);
        for (range, rng) in self.ranges.iter().zip(self.rngs.iter_mut()) {
            for index in range.clone() {
                let annotate = |err: DnsError| err.with_context("particle", index.to_string());
                let mut model = self.prototype.clone();
                model.from_prior(rng).map_err(annotate)?;
                let log_l = model.log_likelihood().map_err(annotate)?;
                if log_l.is_nan() {
                    return Err(annotate(DnsError::model(
                        "nan-likelihood",
                        "prior draw has a NaN log-likelihood",
                    )));
                }
                particles.push(Particle {
                    likelihood: LikelihoodValue::with_random_tiebreak(log_l, rng),
                    model,
                    level: 0,
                });
            }
        }
        self.particles = particles;

        if self.options.save_to_disk {
            self.output.initialise()?;
            self.output.write_levels(&self.ledger.levels)?;
        }
        self.state = EngineState::Initialized;
        info!(
            particles = self.options.num_particles,
            threads = self.options.num_threads,
            seed,
            "initialised sampler"
        );
        Ok(())
    }

    /// Runs worker threads until the save quota is reached.
    pub fn run(&mut self) -> Result<RunSummary, DnsError> {
        match self.state {
            EngineState::Initialized => {}
            EngineState::Finished if self.ledger.count_saves < self.options.max_num_saves => {}
            _ => return Err(self.transition_error("run")),
        }
        self.state = EngineState::Running;
        let outcome = if self.ledger.count_saves < self.options.max_num_saves {
            self.run_threads()
        } else {
            Ok(())
        };
        self.state = EngineState::Finished;
        outcome?;

        let (checkpoint_path, manifest_path) = if self.options.save_to_disk {
            self.write_checkpoint(&self.output.checkpoint)?;
            let manifest = RunManifest::new(
                &self.options,
                self.master_seed,
                self.ledger.levels.len(),
                self.ledger.count_saves,
                self.ledger.count_mcmc_steps,
                &self.output,
            )?;
            manifest.write(&self.output.manifest)?;
            (
                Some(self.output.checkpoint.clone()),
                Some(self.output.manifest.clone()),
            )
        } else {
            (None, None)
        };
        Ok(self.summary(checkpoint_path, manifest_path))
    }

    /// Extends the save quota so that a finished engine can run again.
    pub fn increase_max_num_saves(&mut self, increment: usize) {
        self.options.max_num_saves += increment;
    }

    /// Replaces lagging particles outside of a run. Returns how many were
    /// replaced.
    pub fn kill_lagging_particles(&mut self) -> usize {
        let replaced = moves::kill_lagging_particles(
            self.particles.iter_mut().collect(),
            self.options.lag_margin,
            &mut self.ledger.rng,
        );
        self.ledger.particles_replaced += replaced as u64;
        replaced
    }

    /// Whether level creation has finished.
    pub fn enough_levels(&self) -> bool {
        self.policy.enough_levels(&self.ledger.levels)
    }

    /// Current log push weight of `level`.
    pub fn log_push(&self, level: usize) -> f64 {
        self.policy.log_push(level, &self.ledger.levels)
    }

    /// Captures the engine state.
    pub fn to_checkpoint(&self) -> EngineCheckpoint<M> {
        EngineCheckpoint::capture(
            &self.options,
            self.master_seed,
            self.particles.iter(),
            &self.ledger,
        )
    }

    /// Writes the engine state to `path`.
    pub fn write_checkpoint(&self, path: &Path) -> Result<(), DnsError> {
        self.to_checkpoint().store(path)
    }

    /// Evidence and posterior weights from the particles saved in memory.
    pub fn posterior(&self) -> Result<PosteriorSummary, DnsError> {
        let infos: Vec<SampleInfo> = self.ledger.samples.iter().map(|sample| sample.info).collect();
        posterior::analyse(&self.ledger.levels, &infos)
    }

    /// Options in force.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Seed the engine was initialised (or restored) with.
    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Particle population in global index order.
    pub fn particles(&self) -> &[Particle<M>] {
        &self.particles
    }

    /// Likelihood of every particle.
    pub fn log_likelihoods(&self) -> Vec<LikelihoodValue> {
        self.particles.iter().map(|particle| particle.likelihood).collect()
    }

    /// Level assignment of every particle.
    pub fn level_assignments(&self) -> Vec<usize> {
        self.particles.iter().map(|particle| particle.level).collect()
    }

    /// The level stack.
    pub fn levels(&self) -> &[Level] {
        &self.ledger.levels
    }

    /// Particles saved in memory by this process.
    pub fn samples(&self) -> &[SavedSample<M>] {
        &self.ledger.samples
    }

    /// Number of particles saved so far, including before a restore.
    pub fn count_saves(&self) -> usize {
        self.ledger.count_saves
    }

    /// Number of MCMC steps performed so far.
    pub fn count_mcmc_steps(&self) -> u64 {
        self.ledger.count_mcmc_steps
    }

    /// Index ranges owned by each worker.
    pub fn thread_ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Resolved output file locations.
    pub fn output_files(&self) -> &OutputFiles {
        &self.output
    }

    fn summary(
        &self,
        checkpoint_path: Option<PathBuf>,
        manifest_path: Option<PathBuf>,
    ) -> RunSummary {
        let (accepts, tries) = self
            .ledger
            .levels
            .iter()
            .fold((0u64, 0u64), |(a, t), level| (a + level.accepts, t + level.tries));
        RunSummary {
            num_levels: self.ledger.levels.len(),
            enough_levels: self.enough_levels(),
            count_saves: self.ledger.count_saves,
            count_mcmc_steps: self.ledger.count_mcmc_steps,
            acceptance_rate: if tries == 0 {
                0.0
            } else {
                accepts as f64 / tries as f64
            },
            model_failures: self.ledger.model_failures,
            particles_replaced: self.ledger.particles_replaced,
            checkpoint_path,
            manifest_path,
        }
    }

    fn transition_error(&self, operation: &str) -> DnsError {
        DnsError::Lifecycle(
            ErrorInfo::new("invalid-transition", format!("cannot {operation} now"))
                .with_context("state", format!("{:?}", self.state)),
        )
    }

    fn run_threads(&mut self) -> Result<(), DnsError> {
        let num_threads = self.options.num_threads;
        let num_levels = self.ledger.levels.len();

        let mut workers = Vec::with_capacity(num_threads);
        let mut rest: &mut [Particle<M>] = &mut self.particles;
        for (range, rng) in self.ranges.iter().zip(self.rngs.iter_mut()) {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            rest = tail;
            workers.push(Mutex::new(Worker {
                offset: range.start,
                particles: chunk,
                rng,
                stats: vec![LevelStats::default(); num_levels],
                above: Vec::new(),
                failures: 0,
                last_failure: None,
            }));
        }

        let cycle = Cycle {
            snapshot: RwLock::new(Arc::new(self.ledger.levels.clone())),
            workers,
            ledger: Mutex::new(&mut self.ledger),
            barrier: Barrier::new(num_threads),
            finished: AtomicBool::new(false),
            failure: Mutex::new(None),
            options: &self.options,
            policy: &self.policy,
            output: &self.output,
            master_seed: self.master_seed,
        };

        std::thread::scope(|scope| {
            for thread in 0..num_threads {
                let cycle = &cycle;
                scope.spawn(move || cycle.run_worker(thread));
            }
        });

        let failure = cycle
            .failure
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Exclusive view of one worker's particles and scratch buffers.
struct Worker<'a, M> {
    offset: usize,
    particles: &'a mut [Particle<M>],
    rng: &'a mut RandomStream,
    stats: Vec<LevelStats>,
    above: Vec<LikelihoodValue>,
    failures: u64,
    last_failure: Option<DnsError>,
}

impl<M: Model> Worker<'_, M> {
    fn mcmc(&mut self, levels: &[Level], policy: &LevelPolicy, steps: usize) {
        let creating = !policy.enough_levels(levels);
        let top = levels.len() - 1;
        for _ in 0..steps {
            let which = self.rng.int_below(self.particles.len());
            if self.rng.uniform() <= 0.5 {
                self.update_position(which, levels);
                self.update_level(which, levels, policy, creating);
            } else {
                self.update_level(which, levels, policy, creating);
                self.update_position(which, levels);
            }

            let particle = &self.particles[which];
            moves::accumulate_visits(particle.likelihood, particle.level, levels, &mut self.stats);
            if creating && levels[top].threshold() < particle.likelihood {
                self.above.push(particle.likelihood);
            }
        }
    }

    fn update_position(&mut self, which: usize, levels: &[Level]) {
        let outcome =
            moves::update_position(&mut self.particles[which], levels, &mut self.stats, self.rng);
        if let PositionOutcome::Failed(err) = outcome {
            self.failures += 1;
            self.last_failure =
                Some(err.with_context("particle", (self.offset + which).to_string()));
        }
    }

    fn update_level(&mut self, which: usize, levels: &[Level], policy: &LevelPolicy, creating: bool) {
        moves::update_level_assignment(
            &mut self.particles[which],
            levels,
            &self.stats,
            policy,
            creating,
            self.rng,
        );
    }
}

/// State shared by the worker threads of one `run` call.
struct Cycle<'a, M: Model> {
    workers: Vec<Mutex<Worker<'a, M>>>,
    ledger: Mutex<&'a mut Ledger<M>>,
    snapshot: RwLock<Arc<Vec<Level>>>,
    barrier: Barrier,
    finished: AtomicBool,
    failure: Mutex<Option<DnsError>>,
    options: &'a Options,
    policy: &'a LevelPolicy,
    output: &'a OutputFiles,
    master_seed: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<'a, M: Model> Cycle<'a, M> {
    fn run_worker(&self, thread: usize) {
        loop {
            let levels = Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner));
            self.contain(thread, "mcmc", || {
                lock(&self.workers[thread]).mcmc(&levels, self.policy, self.options.thread_steps)
            });
            drop(levels);

            self.barrier.arrive_and_wait();
            if thread == 0 && !self.finished.load(Ordering::Acquire) {
                self.contain(thread, "bookkeeping", || self.bookkeeping());
            }
            self.barrier.arrive_and_wait();

            if self.finished.load(Ordering::Acquire) {
                break;
            }
        }
    }

    /// Runs `work`, and if it panics records the failure and ends the run so
    /// that no thread is left waiting at the barrier.
    fn contain(&self, thread: usize, stage: &str, work: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(work)).is_ok() {
            return;
        }
        let mut failure = lock(&self.failure);
        if failure.is_none() {
            *failure = Some(DnsError::Lifecycle(
                ErrorInfo::new("worker-panic", format!("thread panicked during {stage}"))
                    .with_context("thread", thread.to_string())
                    .with_context("stage", stage),
            ));
        }
        drop(failure);
        self.finished.store(true, Ordering::Release);
    }

    fn bookkeeping(&self) {
        let mut workers: Vec<MutexGuard<'_, Worker<'a, M>>> = self.workers.iter().map(lock).collect();
        let mut ledger = lock(&self.ledger);
        let done = match self.bookkeep(&mut workers, &mut ledger) {
            Ok(done) => done,
            Err(err) => {
                *lock(&self.failure) = Some(err);
                true
            }
        };
        for worker in workers.iter_mut() {
            worker.stats = vec![LevelStats::default(); ledger.levels.len()];
        }
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(ledger.levels.clone());
        if done {
            self.finished.store(true, Ordering::Release);
        }
    }

    /// Merges worker output into the ledger, grows the level stack, saves and
    /// checkpoints. Returns whether the save quota has been reached.
    fn bookkeep(
        &self,
        workers: &mut [MutexGuard<'_, Worker<'a, M>>],
        ledger: &mut Ledger<M>,
    ) -> Result<bool, DnsError> {
        let options = self.options;
        let creating = !self.policy.enough_levels(&ledger.levels);

        let mut failures = 0;
        let mut last_failure = None;
        for worker in workers.iter_mut() {
            for (level, delta) in ledger.levels.iter_mut().zip(worker.stats.iter()) {
                level.absorb(delta);
            }
            if creating {
                ledger.pending.append(&mut worker.above);
            } else {
                worker.above.clear();
            }
            failures += worker.failures;
            worker.failures = 0;
            if let Some(err) = worker.last_failure.take() {
                last_failure = Some(err);
            }
        }
        if let Some(err) = last_failure {
            ledger.model_failures += failures;
            warn!(failures, error = %err, "rejected moves after model failures");
        }
        ledger.count_mcmc_steps += (options.thread_steps * options.num_threads) as u64;

        let mut created = false;
        if creating && ledger.pending.len() >= options.new_level_interval {
            if let Some(new_level) = level::create_level(&mut ledger.pending, options.compression) {
                info!(
                    level = ledger.levels.len(),
                    log_likelihood = new_level.threshold().log_l(),
                    "creating level"
                );
                ledger.levels.push(new_level);
                created = true;
            }
            if self.policy.enough_levels(&ledger.levels) {
                level::renormalise_visits(&mut ledger.levels, options.new_level_interval);
                ledger.pending.clear();
                info!(levels = ledger.levels.len(), "done creating levels");
            }
        }
        if !self.policy.enough_levels(&ledger.levels) {
            let particles = workers
                .iter_mut()
                .flat_map(|worker| worker.particles.iter_mut())
                .collect();
            let replaced =
                moves::kill_lagging_particles(particles, options.lag_margin, &mut ledger.rng);
            if replaced > 0 {
                debug!(replaced, "replaced lagging particles");
                ledger.particles_replaced += replaced as u64;
            }
        }
        level::recalculate_log_x(
            &mut ledger.levels,
            options.compression,
            options.new_level_interval,
        );
        if created && options.save_to_disk {
            self.output.write_levels(&ledger.levels)?;
        }

        if ledger.count_mcmc_steps >= ((ledger.count_saves + 1) * options.save_interval) as u64 {
            self.save_particle(workers, ledger)?;
            if options.save_to_disk {
                if !created {
                    self.output.write_levels(&ledger.levels)?;
                }
                let interval = options.checkpoint.interval;
                if interval > 0 && ledger.count_saves % interval == 0 {
                    let particles = workers.iter().flat_map(|worker| worker.particles.iter());
                    EngineCheckpoint::capture(options, self.master_seed, particles, ledger)
                        .store(&self.output.checkpoint)?;
                }
            }
        }

        Ok(ledger.count_saves >= options.max_num_saves)
    }

    fn save_particle(
        &self,
        workers: &[MutexGuard<'_, Worker<'a, M>>],
        ledger: &mut Ledger<M>,
    ) -> Result<(), DnsError> {
        let which = ledger.rng.int_below(self.options.num_particles);
        let Some(particle) = workers
            .iter()
            .flat_map(|worker| worker.particles.iter())
            .nth(which)
        else {
            return Ok(());
        };
        let info = SampleInfo {
            save: ledger.count_saves,
            particle: which,
            level: particle.level,
            likelihood: particle.likelihood,
        };
        if self.options.save_to_disk {
            self.output.append_sample(&info, &particle.model)?;
        }
        ledger.samples.push(SavedSample {
            info,
            model: particle.model.clone(),
        });
        ledger.count_saves += 1;
        debug!(
            saves = ledger.count_saves,
            level = info.level,
            log_likelihood = info.likelihood.log_l(),
            "saved particle"
        );
        Ok(())
    }
}
