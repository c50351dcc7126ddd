//! Per-core pending-interrupt bitmaps and IPL masking (spec §4.9/§3:
//! "pending-interrupt bitmap"). Each core has its own bitmap behind its
//! own mutex — signalling one core's vector never contends with another
//! core's poll, matching the per-core-mutex discipline the teacher uses
//! for its interrupt controller.
//!
//! Actually waking a parked core thread is `axp-smp`'s job (it owns the
//! per-core condvar); this crate only answers "what, if anything, is
//! eligible to be taken right now".

use std::sync::Mutex;

/// Alpha defines 64 PALcode-visible interrupt vectors (device IRQs plus
/// the fixed set: interval clock, inter-processor interrupt, console).
pub const NUM_VECTORS: usize = 64;

/// Interprocessor-interrupt vector, reserved by convention (spec §4.9:
/// `send_ipi` "sets a pending-vector bit").
pub const IPI_VECTOR: u8 = 63;

#[derive(Clone, Copy)]
struct CoreBitmap {
    pending: u64,
    /// IPL each vector interrupts at; a pending vector is only eligible
    /// for delivery once the core's current IPL is strictly below it.
    vector_ipl: [u8; NUM_VECTORS],
}

impl Default for CoreBitmap {
    fn default() -> Self {
        Self {
            pending: 0,
            vector_ipl: [0; NUM_VECTORS],
        }
    }
}

/// Owns one bitmap per core. `axp-smp` creates one of these at
/// `initialize` sized to the configured core count.
pub struct InterruptController {
    cores: Vec<Mutex<CoreBitmap>>,
}

impl InterruptController {
    pub fn new(core_count: usize) -> Self {
        Self {
            cores: (0..core_count).map(|_| Mutex::new(CoreBitmap::default())).collect(),
        }
    }

    /// Assigns the IPL a vector interrupts at. Device registration calls
    /// this once per core before the vector can ever be signalled
    /// meaningfully (an unconfigured vector defaults to IPL 0, so it is
    /// never eligible for delivery unless the core is at a negative IPL,
    /// which cannot happen).
    pub fn configure_vector(&self, core: usize, vector: u8, ipl: u8) {
        let mut bitmap = self.cores[core].lock().unwrap();
        bitmap.vector_ipl[vector as usize] = ipl;
    }

    pub fn signal_irq(&self, core: usize, vector: u8) {
        let mut bitmap = self.cores[core].lock().unwrap();
        bitmap.pending |= 1u64 << vector;
    }

    pub fn clear_irq(&self, core: usize, vector: u8) {
        let mut bitmap = self.cores[core].lock().unwrap();
        bitmap.pending &= !(1u64 << vector);
    }

    pub fn is_pending(&self, core: usize, vector: u8) -> bool {
        let bitmap = self.cores[core].lock().unwrap();
        bitmap.pending & (1u64 << vector) != 0
    }

    pub fn any_pending(&self, core: usize) -> bool {
        self.cores[core].lock().unwrap().pending != 0
    }

    /// Returns the highest-IPL pending vector that clears `current_ipl`,
    /// or `None` if nothing is eligible. Ties broken by lowest vector
    /// number (arbitrary but deterministic).
    pub fn highest_eligible(&self, core: usize, current_ipl: u8) -> Option<(u8, u8)> {
        let bitmap = self.cores[core].lock().unwrap();
        (0..NUM_VECTORS)
            .filter(|&v| bitmap.pending & (1u64 << v) != 0)
            .map(|v| (v as u8, bitmap.vector_ipl[v]))
            .filter(|&(_, ipl)| ipl > current_ipl)
            .max_by_key(|&(_, ipl)| ipl)
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }
}
