use std::collections::VecDeque;

use axp_types::Protection;

/// Kind of access a translation request is for; needed to pick the right
/// protection bit and to route fetches to the ITLB partition.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessKind {
    Fetch,
    Read,
    Write,
}

/// A single TLB entry: `{VPN, PPN, ASN, protection mask, valid, global,
/// dirty, accessed}` (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TlbEntry {
    pub vpn: u64,
    pub ppn: u64,
    pub asn: u32,
    pub protection: Protection,
    pub valid: bool,
    pub global: bool,
    pub dirty: bool,
    pub accessed: bool,
}

impl TlbEntry {
    fn matches(&self, vpn: u64, asn: u32) -> bool {
        self.valid && self.vpn == vpn && (self.global || self.asn == asn)
    }
}

/// Four shootdown scopes named in spec §4.7.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShootdownScope {
    SingleVa(u64),
    Asn(u32),
    All,
    /// Instruction-side (ITLB) only; leaves the DTLB partition untouched.
    InstructionSideOnly,
}

const VICTIM_CAPACITY: usize = 8;

/// One logical TLB partition (ITLB or DTLB). Set-associative lookup backed
/// by a plain `Vec` (the associativity degree is not architecturally
/// visible at this level of fidelity) plus a victim-cache tier that keeps
/// the most-recently-evicted entries and is probed before a full walk.
#[derive(Default)]
pub struct TlbPartition {
    entries: Vec<TlbEntry>,
    victims: VecDeque<TlbEntry>,
    capacity: usize,
}

impl TlbPartition {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            victims: VecDeque::with_capacity(VICTIM_CAPACITY),
            capacity,
        }
    }

    /// Direct main-array lookup only (no victim-cache promotion). Used by
    /// `lookup` after a victim hit has already promoted the entry.
    fn find_main(&self, vpn: u64, asn: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(vpn, asn))
    }

    /// Look up `(vpn, asn)`, consulting the victim cache on a main-array
    /// miss and promoting a victim hit back into the main array (spec
    /// §4.7: "consulted on miss before a full walk").
    pub fn lookup(&mut self, vpn: u64, asn: u32) -> Option<TlbEntry> {
        if let Some(idx) = self.find_main(vpn, asn) {
            return Some(self.entries[idx]);
        }
        if let Some(pos) = self.victims.iter().position(|e| e.matches(vpn, asn)) {
            let entry = self.victims.remove(pos).unwrap();
            self.insert(entry);
            return Some(entry);
        }
        None
    }

    /// Insert a freshly-walked translation, enforcing the invariant that
    /// no two entries on this core share `(VPN, ASN)` unless global (spec
    /// §3). Evicted entries move to the victim cache.
    pub fn insert(&mut self, entry: TlbEntry) {
        self.entries.retain(|e| !(e.vpn == entry.vpn && e.asn == entry.asn));
        if self.entries.len() >= self.capacity.max(1) {
            let victim = self.entries.remove(0);
            if self.victims.len() == VICTIM_CAPACITY {
                self.victims.pop_front();
            }
            self.victims.push_back(victim);
        }
        self.entries.push(entry);
    }

    /// Copies every valid entry out of the main array, for snapshotting
    /// (`axp-snapshot`). The victim-cache tier is not architectural
    /// state and is deliberately left out.
    pub fn snapshot_entries(&self) -> Vec<TlbEntry> {
        self.entries.clone()
    }

    /// Replaces the main array with `entries` and drops the victim
    /// cache, used when restoring from a snapshot; the victim tier
    /// simply starts cold, as it would after a real context switch.
    pub fn restore_entries(&mut self, entries: Vec<TlbEntry>) {
        self.entries = entries;
        self.victims.clear();
    }

    pub fn invalidate(&mut self, scope: ShootdownScope) {
        match scope {
            ShootdownScope::SingleVa(vpn) => {
                self.entries.retain(|e| e.vpn != vpn);
                self.victims.retain(|e| e.vpn != vpn);
            }
            ShootdownScope::Asn(asn) => {
                self.entries.retain(|e| e.global || e.asn != asn);
                self.victims.retain(|e| e.global || e.asn != asn);
            }
            ShootdownScope::All | ShootdownScope::InstructionSideOnly => {
                self.entries.clear();
                self.victims.clear();
            }
        }
    }
}

/// Per-core TLB with separate ITLB/DTLB partitions (spec §4.7).
pub struct Tlb {
    pub itlb: TlbPartition,
    pub dtlb: TlbPartition,
}

impl Tlb {
    pub fn new(capacity: usize) -> Self {
        Self {
            itlb: TlbPartition::new(capacity),
            dtlb: TlbPartition::new(capacity),
        }
    }

    pub fn lookup(&mut self, access: AccessKind, vpn: u64, asn: u32) -> Option<TlbEntry> {
        match access {
            AccessKind::Fetch => self.itlb.lookup(vpn, asn),
            AccessKind::Read | AccessKind::Write => self.dtlb.lookup(vpn, asn),
        }
    }

    pub fn insert(&mut self, access: AccessKind, entry: TlbEntry) {
        match access {
            AccessKind::Fetch => self.itlb.insert(entry),
            AccessKind::Read | AccessKind::Write => self.dtlb.insert(entry),
        }
    }

    /// Also install fetched data translations into the ITLB and vice
    /// versa is NOT done automatically (the real two-partition split
    /// is intentional); callers that want a translation visible to both
    /// streams insert into each explicitly.
    pub fn invalidate(&mut self, scope: ShootdownScope) {
        match scope {
            ShootdownScope::InstructionSideOnly => self.itlb.invalidate(scope),
            other => {
                self.itlb.invalidate(other);
                self.dtlb.invalidate(other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vpn: u64, ppn: u64, asn: u32, global: bool) -> TlbEntry {
        TlbEntry {
            vpn,
            ppn,
            asn,
            protection: Protection::all_rwx(),
            valid: true,
            global,
            dirty: false,
            accessed: false,
        }
    }

    #[test]
    fn insert_then_lookup_returns_ppn_until_invalidated() {
        let mut tlb = Tlb::new(4);
        tlb.insert(AccessKind::Read, entry(1, 100, 7, false));
        assert_eq!(tlb.lookup(AccessKind::Read, 1, 7).unwrap().ppn, 100);

        tlb.invalidate(ShootdownScope::SingleVa(1));
        assert!(tlb.lookup(AccessKind::Read, 1, 7).is_none());
    }

    #[test]
    fn global_entry_matches_any_asn() {
        let mut tlb = Tlb::new(4);
        tlb.insert(AccessKind::Read, entry(2, 200, 0, true));
        assert_eq!(tlb.lookup(AccessKind::Read, 2, 99).unwrap().ppn, 200);
    }

    #[test]
    fn eviction_goes_to_victim_cache_and_is_reusable() {
        let mut tlb = Tlb::new(2);
        tlb.insert(AccessKind::Read, entry(1, 10, 0, false));
        tlb.insert(AccessKind::Read, entry(2, 20, 0, false));
        // This insert evicts vpn=1 into the victim cache.
        tlb.insert(AccessKind::Read, entry(3, 30, 0, false));
        assert!(tlb.dtlb.find_main(1, 0).is_none());
        // But it's still reachable via the victim cache.
        assert_eq!(tlb.lookup(AccessKind::Read, 1, 0).unwrap().ppn, 10);
    }

    #[test]
    fn asn_scoped_invalidate_spares_global_entries() {
        let mut tlb = Tlb::new(4);
        tlb.insert(AccessKind::Read, entry(1, 10, 5, false));
        tlb.insert(AccessKind::Read, entry(2, 20, 0, true));
        tlb.invalidate(ShootdownScope::Asn(5));
        assert!(tlb.lookup(AccessKind::Read, 1, 5).is_none());
        assert!(tlb.lookup(AccessKind::Read, 2, 5).is_some());
    }
}
