use std::sync::{Arc, Mutex};

use axp_mmu::MemoryBus;

use crate::directory::Directory;
use crate::line::{CacheLine, LineState, LINE_SIZE};
use crate::private::PrivateCaches;
use crate::set::SetAssociativeStore;

pub const L3_SETS: usize = 2048;
pub const L3_WAYS: usize = 16;

fn read_line_from_bus<M: MemoryBus>(bus: &mut M, line_addr: u64) -> [u8; LINE_SIZE] {
    let mut data = [0u8; LINE_SIZE];
    for word in 0..(LINE_SIZE / 8) {
        let bytes = bus.read_u64(line_addr + (word * 8) as u64).to_le_bytes();
        data[word * 8..word * 8 + 8].copy_from_slice(&bytes);
    }
    data
}

fn write_line_to_bus<M: MemoryBus>(bus: &mut M, line_addr: u64, data: &[u8; LINE_SIZE]) {
    for word in 0..(LINE_SIZE / 8) {
        let bytes: [u8; 8] = data[word * 8..word * 8 + 8].try_into().unwrap();
        bus.write_u64(line_addr + (word * 8) as u64, u64::from_le_bytes(bytes));
    }
}

/// The shared L3, the coherency ordering point (spec §4.8): it owns the
/// directory recording every line's MESI state and sharer set, serializes
/// RFOs behind that directory's lock, and is the only thing with reach
/// into every core's private hierarchy (needed to invalidate or downgrade
/// a remote copy during a coherence transaction). Outlives every core,
/// same as the physical RAM it fronts.
pub struct SharedL3<M: MemoryBus + Send> {
    store: Mutex<SetAssociativeStore>,
    directory: Mutex<Directory>,
    privates: Mutex<Vec<Arc<Mutex<PrivateCaches>>>>,
    backing: Mutex<M>,
}

impl<M: MemoryBus + Send> SharedL3<M> {
    pub fn new(backing: M) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(SetAssociativeStore::new(L3_SETS, L3_WAYS)),
            directory: Mutex::new(Directory::new()),
            privates: Mutex::new(Vec::new()),
            backing: Mutex::new(backing),
        })
    }

    /// Allocates a new core slot and its private hierarchy. Called once
    /// per core at `axp-smp` startup; core ids are assigned in
    /// registration order and reused as the directory's sharer-bitmap
    /// index.
    pub fn register_core(&self) -> (usize, Arc<Mutex<PrivateCaches>>) {
        let mut privates = self.privates.lock().unwrap();
        let core_id = privates.len();
        let private = Arc::new(Mutex::new(PrivateCaches::new()));
        privates.push(private.clone());
        (core_id, private)
    }

    fn fetch_or_load(&self, tag: u64) -> [u8; LINE_SIZE] {
        if let Some(line) = self.store.lock().unwrap().lookup(tag) {
            return line.data;
        }
        let data = read_line_from_bus(&mut *self.backing.lock().unwrap(), tag);
        self.store.lock().unwrap().insert(CacheLine::new(tag, LineState::Shared, data));
        data
    }

    /// Writes `data` into the L3 store and through to backing RAM without
    /// touching the directory. Used both for ordinary coherence
    /// writebacks and for silent capacity evictions from a private cache
    /// (the directory still believes that core holds the line; the next
    /// real coherence event will find fresh data waiting in L3).
    pub fn writeback_silent(&self, tag: u64, data: [u8; LINE_SIZE]) {
        self.store.lock().unwrap().insert(CacheLine::new(tag, LineState::Shared, data));
        write_line_to_bus(&mut *self.backing.lock().unwrap(), tag, &data);
    }

    fn writeback_and_downgrade(&self, owner: usize, tag: u64) -> [u8; LINE_SIZE] {
        let privates = self.privates.lock().unwrap();
        let mut owner_private = privates[owner].lock().unwrap();
        let data = owner_private.read_data(tag).unwrap_or([0xFF; LINE_SIZE]);
        owner_private.downgrade_to_shared(tag);
        drop(owner_private);
        drop(privates);
        self.writeback_silent(tag, data);
        data
    }

    fn writeback_and_invalidate(&self, owner: usize, tag: u64) -> [u8; LINE_SIZE] {
        let privates = self.privates.lock().unwrap();
        let mut owner_private = privates[owner].lock().unwrap();
        let data = owner_private.read_data(tag).unwrap_or([0xFF; LINE_SIZE]);
        owner_private.invalidate_line(tag);
        drop(owner_private);
        drop(privates);
        self.writeback_silent(tag, data);
        data
    }

    fn invalidate_other(&self, core: usize, tag: u64) {
        let privates = self.privates.lock().unwrap();
        privates[core].lock().unwrap().invalidate_line(tag);
    }

    /// Services a read miss from `core_id`: if the line is Modified
    /// elsewhere, downgrades that copy to Shared and writes its data back;
    /// otherwise fills from L3/backing RAM. The requester becomes
    /// Exclusive if it ends up the sole sharer, Shared otherwise.
    pub fn service_read_miss(&self, core_id: usize, tag: u64) -> ([u8; LINE_SIZE], LineState) {
        let mut directory = self.directory.lock().unwrap();
        let entry = directory.entries.entry(tag).or_default();
        let was_modified = entry.state == LineState::Modified;
        let modified_owner = entry.sharers.trailing_zeros() as usize;

        let data = if was_modified {
            self.writeback_and_downgrade(modified_owner, tag)
        } else {
            self.fetch_or_load(tag)
        };

        entry.sharers |= 1u64 << core_id;
        entry.state = if entry.sharers.count_ones() > 1 {
            LineState::Shared
        } else {
            LineState::Exclusive
        };
        (data, entry.state)
    }

    /// Services a write miss or a write-hit-on-Shared upgrade: invalidates
    /// every other sharer (writing back the Modified owner's data first,
    /// if any), then grants `core_id` sole Modified ownership.
    pub fn service_write_miss(&self, core_id: usize, tag: u64) -> [u8; LINE_SIZE] {
        let mut directory = self.directory.lock().unwrap();
        let entry = directory.entries.entry(tag).or_default();
        let modified_owner = if entry.state == LineState::Modified {
            Some(entry.sharers.trailing_zeros() as usize)
        } else {
            None
        };

        let data = match modified_owner {
            Some(owner) if owner != core_id => self.writeback_and_invalidate(owner, tag),
            _ => self.fetch_or_load(tag),
        };

        let mut remaining = entry.sharers & !(1u64 << core_id);
        while remaining != 0 {
            let bit = remaining.trailing_zeros() as usize;
            remaining &= remaining - 1;
            self.invalidate_other(bit, tag);
        }

        entry.sharers = 1u64 << core_id;
        entry.state = LineState::Modified;
        data
    }

    /// Writes every Modified private line back to backing RAM, leaving
    /// the directory's bookkeeping untouched. A raw read of `backing`
    /// (a firmware dump, a RAM snapshot) is only correct once this has
    /// run, since a dirty line's freshest copy can otherwise live only
    /// in a core's private L1D/L2.
    pub fn flush_all_to_backing(&self) {
        let privates = self.privates.lock().unwrap();
        for private in privates.iter() {
            let modified = {
                let mut p = private.lock().unwrap();
                let mut lines = p.l2.modified_lines();
                lines.extend(p.l1d.modified_lines());
                lines
            };
            for line in modified {
                self.writeback_silent(line.tag, line.data);
            }
        }
    }

    /// Drops every cached line and coherence record, across every
    /// registered core and the L3 itself, without touching `backing`.
    /// Used after a bulk write to backing RAM (snapshot restore, firmware
    /// reload) so the next access re-fills from the bytes that now live
    /// there instead of serving a stale cached copy.
    pub fn reset_caches(&self) {
        *self.store.lock().unwrap() = SetAssociativeStore::new(L3_SETS, L3_WAYS);
        self.directory.lock().unwrap().entries.clear();
        for private in self.privates.lock().unwrap().iter() {
            *private.lock().unwrap() = PrivateCaches::new();
        }
    }

    /// Runs `f` against the backing store directly, bypassing the cache
    /// hierarchy entirely. Callers are responsible for flushing first
    /// (reads) or resetting caches after (writes) as needed -- this is
    /// the same direct-backing seam a firmware loader or snapshot RAM
    /// section needs and the per-instruction `MemoryBus` path doesn't
    /// provide.
    pub fn with_backing<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.backing.lock().unwrap())
    }
}
