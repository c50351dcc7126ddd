use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axp_interrupts::InterruptController;

use crate::barrier::Barrier;
use crate::driver::{CoreDriver, ShootdownScope, StepOutcome};
use crate::lifecycle::CoreStatus;

/// How long [`SmpManager::stop`] waits for a core's thread to notice and
/// exit before giving up on it (spec §4.9's "bounded" stop).
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

struct CoreSlot<D> {
    driver: Arc<Mutex<D>>,
    status: Arc<Mutex<CoreStatus>>,
    /// Signalled on resume, on stop, and on every IPI, so a parked
    /// thread re-checks its status/pending-interrupt state promptly.
    wake: Arc<Condvar>,
    stop_requested: Arc<AtomicBool>,
    /// Set by [`SmpManager::shootdown_tlb`] for every core but the
    /// initiator; consumed at the top of this core's own fetch loop
    /// (spec §4.7's "broadcast ... to all other cores").
    pending_shootdown: Arc<Mutex<Option<ShootdownScope>>>,
    done: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

/// Owns the core-context vector and one OS thread per core (spec §4.9).
/// Generic over the caller's `CoreDriver` so `axp-smp` itself never needs
/// to know about registers, TLBs, or caches.
pub struct SmpManager<D: CoreDriver + 'static> {
    slots: Vec<CoreSlot<D>>,
    interrupts: Arc<InterruptController>,
    barrier: Arc<Barrier>,
}

impl<D: CoreDriver + 'static> SmpManager<D> {
    /// Creates the core contexts (one per driver) in `Idle` state. No
    /// threads are spawned until [`SmpManager::start`].
    pub fn new(interrupts: Arc<InterruptController>, drivers: Vec<D>) -> Self {
        let core_count = drivers.len();
        let slots = drivers
            .into_iter()
            .map(|driver| CoreSlot {
                driver: Arc::new(Mutex::new(driver)),
                status: Arc::new(Mutex::new(CoreStatus::Idle)),
                wake: Arc::new(Condvar::new()),
                stop_requested: Arc::new(AtomicBool::new(false)),
                pending_shootdown: Arc::new(Mutex::new(None)),
                done: Arc::new((Mutex::new(false), Condvar::new())),
                handle: None,
            })
            .collect();
        Self {
            slots,
            interrupts,
            barrier: Arc::new(Barrier::new(core_count)),
        }
    }

    pub fn core_count(&self) -> usize {
        self.slots.len()
    }

    pub fn status(&self, core: usize) -> CoreStatus {
        *self.slots[core].status.lock().unwrap()
    }

    /// Shared handle to one core's driver, for callers that need to
    /// inspect or mutate architectural state directly (register dumps,
    /// snapshot save/restore). Locking it while the core's thread is
    /// `Running` races with that thread's own `step()`; callers that need
    /// a consistent view should `pause()` first.
    pub fn driver_handle(&self, core: usize) -> Arc<Mutex<D>> {
        self.slots[core].driver.clone()
    }

    /// Spawns every core's thread, transitioning `Idle` -> `Running`.
    pub fn start(&mut self) {
        for slot in &mut self.slots {
            {
                let mut status = slot.status.lock().unwrap();
                if *status != CoreStatus::Idle {
                    continue;
                }
                *status = CoreStatus::Running;
            }
            let driver = slot.driver.clone();
            let status = slot.status.clone();
            let wake = slot.wake.clone();
            let stop_requested = slot.stop_requested.clone();
            let pending_shootdown = slot.pending_shootdown.clone();
            let barrier = self.barrier.clone();
            let done = slot.done.clone();

            slot.handle = Some(thread::spawn(move || {
                core_loop(driver, status, wake, stop_requested, pending_shootdown, barrier, done);
            }));
        }
    }

    /// Requests every running core pause at its next instruction
    /// boundary. Does not wait for acknowledgement; poll [`Self::status`]
    /// if a synchronous pause is required.
    pub fn pause(&self) {
        for slot in &self.slots {
            let mut status = slot.status.lock().unwrap();
            if *status == CoreStatus::Running {
                *status = CoreStatus::Paused;
            }
        }
    }

    pub fn resume(&self) {
        for slot in &self.slots {
            let mut status = slot.status.lock().unwrap();
            if *status == CoreStatus::Paused {
                *status = CoreStatus::Running;
                slot.wake.notify_all();
            }
        }
    }

    /// Signals every core to stop and joins its thread, bounded by
    /// [`STOP_JOIN_TIMEOUT`] per core. A thread that doesn't exit in time
    /// is left detached rather than blocking shutdown indefinitely.
    pub fn stop(&mut self) {
        for slot in &self.slots {
            slot.stop_requested.store(true, Ordering::SeqCst);
            slot.wake.notify_all();
        }
        for slot in &mut self.slots {
            let (lock, condvar) = &*slot.done;
            let finished = lock.lock().unwrap();
            let (finished, timed_out) = condvar
                .wait_timeout_while(finished, STOP_JOIN_TIMEOUT, |done| !*done)
                .unwrap();
            drop(finished);
            if !timed_out.timed_out() {
                if let Some(handle) = slot.handle.take() {
                    let _ = handle.join();
                }
            } else {
                log::warn!("core thread did not stop within {:?}; detaching", STOP_JOIN_TIMEOUT);
            }
        }
    }

    /// Global reset (spec §4.9): pauses every core at the barrier, resets
    /// each driver's architectural state, then resumes all together.
    pub fn reset(&mut self) {
        self.pause();
        for slot in &self.slots {
            slot.driver.lock().unwrap().reset();
        }
        self.resume();
    }

    /// Cross-core TLB shootdown (spec §4.7): invalidates `initiator`'s
    /// TLB directly -- the calling thread stands in for it at the
    /// barrier -- then posts `scope` to every other core's mailbox and
    /// wakes it, and finally blocks until all of them have invalidated
    /// and rendezvoused. Only meaningful while every other core is
    /// actually `Running`; one that's paused or halted never reaches the
    /// barrier and this call blocks forever, same as any other use of
    /// the shared barrier with fewer than `core_count` live parties.
    pub fn shootdown_tlb(&self, initiator: usize, scope: ShootdownScope) {
        self.slots[initiator].driver.lock().unwrap().invalidate_tlb(scope);
        for (idx, slot) in self.slots.iter().enumerate() {
            if idx == initiator {
                continue;
            }
            *slot.pending_shootdown.lock().unwrap() = Some(scope);
            slot.wake.notify_all();
        }
        self.barrier.wait();
    }

    pub fn send_ipi(&self, _source: usize, target: usize, vector: u8) {
        self.interrupts.signal_irq(target, vector);
        self.slots[target].wake.notify_all();
    }

    pub fn barrier(&self) -> Arc<Barrier> {
        self.barrier.clone()
    }

    pub fn interrupts(&self) -> Arc<InterruptController> {
        self.interrupts.clone()
    }
}

fn core_loop<D: CoreDriver>(
    driver: Arc<Mutex<D>>,
    status: Arc<Mutex<CoreStatus>>,
    wake: Arc<Condvar>,
    stop_requested: Arc<AtomicBool>,
    pending_shootdown: Arc<Mutex<Option<ShootdownScope>>>,
    barrier: Arc<Barrier>,
    done: Arc<(Mutex<bool>, Condvar)>,
) {
    loop {
        if stop_requested.load(Ordering::SeqCst) {
            break;
        }

        {
            let mut guard = status.lock().unwrap();
            while *guard == CoreStatus::Paused && !stop_requested.load(Ordering::SeqCst) {
                guard = wake.wait(guard).unwrap();
            }
            if *guard != CoreStatus::Running {
                break;
            }
        }

        // A shootdown initiated elsewhere is serviced here, at the top
        // of the fetch loop, never mid-instruction (spec §4.7/§5): pick
        // up the broadcast scope, invalidate locally, then rendezvous at
        // the shared barrier so the initiator knows every core is done.
        let shootdown = pending_shootdown.lock().unwrap().take();
        if let Some(scope) = shootdown {
            driver.lock().unwrap().invalidate_tlb(scope);
            barrier.wait();
        }

        let outcome = driver.lock().unwrap().step();
        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Halt => {
                *status.lock().unwrap() = CoreStatus::Halted;
                break;
            }
            StepOutcome::HaltForced => {
                *status.lock().unwrap() = CoreStatus::HaltedForced;
                break;
            }
            StepOutcome::Fault => {
                *status.lock().unwrap() = CoreStatus::HaltedFaulted;
                break;
            }
        }
    }

    let (lock, condvar) = &*done;
    *lock.lock().unwrap() = true;
    condvar.notify_all();
}
