//! Cross-core reservation bookkeeping: the memory subsystem's view of
//! every core's outstanding LL/SC reservation, so a store on one core can
//! invalidate a reservation held by another (spec §3: "cleared by any
//! observed write overlapping the range, local or remote").
//!
//! Each core additionally keeps its own fast-path copy next to its
//! register file (`axp-cpu-core::state::Reservation`) for the
//! uncontended single-core check; this tracker is what a store's
//! coherency broadcast consults to invalidate *other* cores' copies.

use std::sync::Mutex;

#[derive(Clone, Copy, Default, Debug)]
struct Entry {
    address: u64,
    size: u8,
    valid: bool,
}

pub struct ReservationTracker {
    cores: Mutex<Vec<Entry>>,
}

impl ReservationTracker {
    pub fn new(core_count: usize) -> Self {
        Self {
            cores: Mutex::new(vec![Entry::default(); core_count]),
        }
    }

    pub fn set(&self, core: usize, address: u64, size: u8) {
        let mut cores = self.cores.lock().unwrap();
        cores[core] = Entry {
            address,
            size,
            valid: true,
        };
    }

    pub fn clear(&self, core: usize) {
        let mut cores = self.cores.lock().unwrap();
        cores[core].valid = false;
    }

    pub fn is_valid(&self, core: usize) -> bool {
        self.cores.lock().unwrap()[core].valid
    }

    /// A write at `[address, address+size)` from any source invalidates
    /// every reservation it overlaps, returning which cores were hit so
    /// callers can wake/notify them if needed.
    pub fn observe_write(&self, address: u64, size: u8) -> Vec<usize> {
        let mut cores = self.cores.lock().unwrap();
        let write_end = address + size as u64;
        let mut hit = Vec::new();
        for (idx, entry) in cores.iter_mut().enumerate() {
            if !entry.valid {
                continue;
            }
            let entry_end = entry.address + entry.size as u64;
            if address < entry_end && write_end > entry.address {
                entry.valid = false;
                hit.push(idx);
            }
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_overlapping_write_invalidates_other_cores_reservation() {
        let tracker = ReservationTracker::new(2);
        tracker.set(0, 0x1000, 8);
        assert!(tracker.is_valid(0));

        let hit = tracker.observe_write(0x1004, 4);
        assert_eq!(hit, vec![0]);
        assert!(!tracker.is_valid(0));
    }

    #[test]
    fn disjoint_write_does_not_invalidate() {
        let tracker = ReservationTracker::new(1);
        tracker.set(0, 0x1000, 8);
        let hit = tracker.observe_write(0x2000, 8);
        assert!(hit.is_empty());
        assert!(tracker.is_valid(0));
    }
}
