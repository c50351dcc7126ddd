use crate::line::{CacheLine, LineState, LINE_SIZE};

/// Plain set-associative storage shared by every cache level (L1I, L1D,
/// L2's private copy, and L3's backing store). LRU replacement per set,
/// tracked as a most-recently-used-first stack of way indices.
pub struct SetAssociativeStore {
    num_sets: usize,
    sets: Vec<Vec<CacheLine>>,
    recency: Vec<Vec<usize>>,
}

impl SetAssociativeStore {
    pub fn new(num_sets: usize, ways: usize) -> Self {
        Self {
            num_sets,
            sets: vec![vec![CacheLine::invalid(); ways]; num_sets],
            recency: vec![Vec::with_capacity(ways); num_sets],
        }
    }

    fn set_index(&self, line_addr: u64) -> usize {
        ((line_addr / LINE_SIZE as u64) as usize) % self.num_sets
    }

    fn touch(&mut self, set_idx: usize, way: usize) {
        let recency = &mut self.recency[set_idx];
        recency.retain(|&w| w != way);
        recency.insert(0, way);
    }

    pub fn contains(&self, line_addr: u64) -> bool {
        let idx = self.set_index(line_addr);
        self.sets[idx].iter().any(|l| l.valid && l.tag == line_addr)
    }

    pub fn lookup(&mut self, line_addr: u64) -> Option<&mut CacheLine> {
        let idx = self.set_index(line_addr);
        let way = self.sets[idx].iter().position(|l| l.valid && l.tag == line_addr)?;
        self.touch(idx, way);
        Some(&mut self.sets[idx][way])
    }

    /// Installs `line`, evicting the LRU way if the set has no free slot.
    /// Returns the evicted line when it held valid data, so the caller can
    /// write back a Modified victim before its bytes are lost.
    pub fn insert(&mut self, line: CacheLine) -> Option<CacheLine> {
        let idx = self.set_index(line.tag);
        let ways = self.sets[idx].len();

        if let Some(way) = self.sets[idx].iter().position(|l| !l.valid) {
            self.sets[idx][way] = line;
            self.touch(idx, way);
            return None;
        }

        let recency = &mut self.recency[idx];
        let victim_way = if recency.len() == ways {
            recency.pop().unwrap()
        } else {
            ways - 1
        };
        let victim = self.sets[idx][victim_way];
        self.sets[idx][victim_way] = line;
        self.touch(idx, victim_way);
        if victim.valid {
            Some(victim)
        } else {
            None
        }
    }

    /// Every line currently held Modified, for flushing before a raw
    /// backing-store read (e.g. a RAM snapshot) observes stale data.
    pub fn modified_lines(&self) -> Vec<CacheLine> {
        self.sets
            .iter()
            .flatten()
            .filter(|l| l.valid && l.state == LineState::Modified)
            .copied()
            .collect()
    }

    /// Removes the line for `line_addr`, if present, returning it.
    pub fn invalidate(&mut self, line_addr: u64) -> Option<CacheLine> {
        let idx = self.set_index(line_addr);
        let way = self.sets[idx].iter().position(|l| l.valid && l.tag == line_addr)?;
        let line = self.sets[idx][way];
        self.sets[idx][way] = CacheLine::invalid();
        self.recency[idx].retain(|&w| w != way);
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut store = SetAssociativeStore::new(4, 2);
        store.insert(CacheLine::new(0x4000, LineState::Shared, [7; LINE_SIZE]));
        let line = store.lookup(0x4000).unwrap();
        assert_eq!(line.data[0], 7);
        assert_eq!(line.state, LineState::Shared);
    }

    #[test]
    fn capacity_eviction_returns_lru_victim() {
        let mut store = SetAssociativeStore::new(1, 2);
        store.insert(CacheLine::new(0x0, LineState::Modified, [1; LINE_SIZE]));
        store.insert(CacheLine::new(LINE_SIZE as u64, LineState::Modified, [2; LINE_SIZE]));
        // Touch the first line so the second becomes LRU.
        store.lookup(0x0);
        let evicted = store.insert(CacheLine::new(2 * LINE_SIZE as u64, LineState::Shared, [3; LINE_SIZE]));
        assert_eq!(evicted.unwrap().tag, LINE_SIZE as u64);
    }

    #[test]
    fn invalidate_removes_line() {
        let mut store = SetAssociativeStore::new(2, 2);
        store.insert(CacheLine::new(0x1000, LineState::Exclusive, [9; LINE_SIZE]));
        assert!(store.invalidate(0x1000).is_some());
        assert!(store.lookup(0x1000).is_none());
    }
}
