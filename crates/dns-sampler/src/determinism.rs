use dns_core::{derive_substream_seed, RandomStream};

/// Substream reserved for the bookkeeping thread (particle saves, cloning).
pub const BOOKKEEPING_SUBSTREAM: u64 = u64::MAX;

/// Derives the deterministic seed used by worker `thread`.
pub fn worker_seed(master_seed: u64, thread: usize) -> u64 {
    derive_substream_seed(master_seed, thread as u64)
}

/// Derives the deterministic seed used by the bookkeeping phase.
pub fn bookkeeping_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed, BOOKKEEPING_SUBSTREAM)
}

/// Builds one stream per worker.
pub fn worker_streams(master_seed: u64, num_threads: usize) -> Vec<RandomStream> {
    (0..num_threads)
        .map(|thread| RandomStream::from_seed(worker_seed(master_seed, thread)))
        .collect()
}

/// Splits `num_particles` into `num_threads` contiguous ranges whose sizes
/// differ by at most one.
pub fn thread_ranges(num_particles: usize, num_threads: usize) -> Vec<std::ops::Range<usize>> {
    let base = num_particles / num_threads;
    let extra = num_particles % num_threads;
    let mut start = 0;
    (0..num_threads)
        .map(|thread| {
            let len = base + usize::from(thread < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}
