//! The system memory map: whole-entry insert/remove of
//! `axp_types::MemoryMapEntry`, mutated under a writer lock (spec's
//! "requires all cores paused" discipline is enforced by the caller —
//! `axp-smp` — before taking the lock; this type only provides the lock
//! itself).

use std::sync::RwLock;

use axp_types::{MemoryMapEntry, PhysAddr, VirtAddr};

#[derive(Default)]
pub struct MemoryMap {
    entries: RwLock<Vec<MemoryMapEntry>>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: MemoryMapEntry) {
        self.entries.write().unwrap().push(entry);
    }

    /// Removes the first entry whose `virtual_base` matches; whole
    /// entries only, never partial resizing (spec §3).
    pub fn remove(&self, virtual_base: VirtAddr) -> Option<MemoryMapEntry> {
        let mut entries = self.entries.write().unwrap();
        let pos = entries.iter().position(|e| e.virtual_base.raw() == virtual_base.raw())?;
        Some(entries.remove(pos))
    }

    pub fn lookup_virtual(&self, va: VirtAddr) -> Option<MemoryMapEntry> {
        self.entries.read().unwrap().iter().find(|e| e.contains_virtual(va)).copied()
    }

    pub fn lookup_physical(&self, pa: PhysAddr) -> Option<MemoryMapEntry> {
        self.entries.read().unwrap().iter().find(|e| e.contains_physical(pa)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axp_types::{MemoryKind, Protection};

    fn entry(va: u64, pa: u64, len: u64) -> MemoryMapEntry {
        MemoryMapEntry {
            virtual_base: VirtAddr::new(va),
            physical_base: PhysAddr::new(pa),
            length: len,
            protection: Protection::all_rwx(),
            kind: MemoryKind::Ram,
        }
    }

    #[test]
    fn insert_then_lookup_then_remove() {
        let map = MemoryMap::new();
        map.insert(entry(0x1000, 0, 0x1000));
        assert!(map.lookup_virtual(VirtAddr::new(0x1500)).is_some());
        assert!(map.remove(VirtAddr::new(0x1000)).is_some());
        assert!(map.lookup_virtual(VirtAddr::new(0x1500)).is_none());
    }
}
