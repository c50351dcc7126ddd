use std::sync::{Condvar, Mutex};

/// Reusable (cyclic) barrier: every party calls [`Barrier::wait`], none
/// return until all have arrived. Used for PAL-base swaps, global TLB
/// flush, and system-wide reset (spec §4.9).
pub struct Barrier {
    parties: usize,
    state: Mutex<State>,
    condvar: Condvar,
}

struct State {
    arrived: usize,
    generation: u64,
}

impl Barrier {
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(State {
                arrived: 0,
                generation: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    pub fn wait(&self) {
        if self.parties <= 1 {
            return;
        }
        let mut state = self.state.lock().unwrap();
        let my_generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.condvar.notify_all();
        } else {
            state = self
                .condvar
                .wait_while(state, |s| s.generation == my_generation)
                .unwrap();
            drop(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn all_parties_release_together() {
        let barrier = Arc::new(Barrier::new(4));
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    barrier.wait();
                    // By the time wait() returns, all 4 must have arrived.
                    assert_eq!(counter.load(Ordering::SeqCst), 4);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn single_party_never_blocks() {
        let barrier = Barrier::new(1);
        barrier.wait();
        barrier.wait();
    }
}
