use std::sync::{Condvar, Mutex, PoisonError};

/// Reusable rendezvous point for a fixed number of threads.
///
/// Every call to [`Barrier::arrive_and_wait`] blocks until `parties` threads
/// have arrived, then releases all of them at once and starts a new
/// generation. The mutex hand-off gives the release a full happens-before
/// edge, so writes made by any thread before arriving are visible to every
/// thread after it is released.
///
/// Exactly `parties` threads must call it per generation. Fewer callers block
/// forever.
#[derive(Debug)]
pub struct Barrier {
    parties: usize,
    state: Mutex<Generation>,
    released: Condvar,
}

#[derive(Debug)]
struct Generation {
    arrived: usize,
    id: u64,
}

impl Barrier {
    /// Creates a barrier for `parties` threads. `parties` must be positive.
    pub fn new(parties: usize) -> Self {
        debug_assert!(parties > 0, "a barrier needs at least one party");
        Self {
            parties,
            state: Mutex::new(Generation { arrived: 0, id: 0 }),
            released: Condvar::new(),
        }
    }

    /// Number of threads that must arrive before the barrier opens.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Blocks until all parties have arrived. Returns `true` for the thread
    /// whose arrival opened the barrier.
    pub fn arrive_and_wait(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = state.id;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.id = state.id.wrapping_add(1);
            self.released.notify_all();
            return true;
        }
        while state.id == generation {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        false
    }
}
