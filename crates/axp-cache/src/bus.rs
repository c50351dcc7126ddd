use std::sync::{Arc, Mutex};

use axp_mmu::MemoryBus;

use crate::line::{CacheLine, LineState, LINE_SIZE};
use crate::prefetch::StridePrefetcher;
use crate::private::PrivateCaches;
use crate::shared::SharedL3;

/// One core's view of the cache hierarchy: its own private L1I/L1D/L2
/// plus a handle to the shared, coherent L3. Implements `MemoryBus` for
/// the data path (consumed by `axp-cpu-core::PagingBus` the same way
/// `axp-memory::PhysicalMemory` is in tests); instruction fetch goes
/// through [`CacheBus::fetch_u32`] instead, so it can hit in L1I.
pub struct CacheBus<M: MemoryBus + Send> {
    core_id: usize,
    private: Arc<Mutex<PrivateCaches>>,
    l3: Arc<SharedL3<M>>,
    prefetcher: StridePrefetcher,
}

impl<M: MemoryBus + Send> CacheBus<M> {
    pub fn new(l3: Arc<SharedL3<M>>) -> Self {
        let (core_id, private) = l3.register_core();
        Self {
            core_id,
            private,
            l3,
            prefetcher: StridePrefetcher::new(false),
        }
    }

    pub fn set_prefetch_enabled(&mut self, enabled: bool) {
        self.prefetcher.set_enabled(enabled);
    }

    fn install(&self, private: &mut PrivateCaches, line_addr: u64, state: LineState, data: [u8; LINE_SIZE]) {
        if let Some(victim) = private.l2.insert(CacheLine::new(line_addr, state, data)) {
            if victim.state == LineState::Modified {
                self.l3.writeback_silent(victim.tag, victim.data);
            }
        }
        if let Some(victim) = private.l1d.insert(CacheLine::new(line_addr, state, data)) {
            if victim.state == LineState::Modified {
                self.l3.writeback_silent(victim.tag, victim.data);
            }
        }
    }

    fn maybe_prefetch(&mut self, line_addr: u64) {
        let Some(next) = self.prefetcher.observe(line_addr) else {
            return;
        };
        if self.private.lock().unwrap().l1d.contains(next) {
            return;
        }
        let (data, state) = self.l3.service_read_miss(self.core_id, next);
        let mut private = self.private.lock().unwrap();
        self.install(&mut private, next, state, data);
    }

    fn read_line(&mut self, line_addr: u64) -> [u8; LINE_SIZE] {
        {
            let mut private = self.private.lock().unwrap();
            if let Some(line) = private.l1d.lookup(line_addr) {
                return line.data;
            }
            if let Some(line) = private.l2.lookup(line_addr) {
                let data = line.data;
                let state = line.state;
                drop(private);
                let mut private = self.private.lock().unwrap();
                self.install(&mut private, line_addr, state, data);
                return data;
            }
        }
        let (data, state) = self.l3.service_read_miss(self.core_id, line_addr);
        let mut private = self.private.lock().unwrap();
        self.install(&mut private, line_addr, state, data);
        drop(private);
        self.maybe_prefetch(line_addr);
        data
    }

    /// Ensures this core holds `line_addr` Modified, fetching or
    /// upgrading through L3 if needed, then returns the current bytes.
    fn ensure_modified(&mut self, line_addr: u64) -> [u8; LINE_SIZE] {
        {
            let mut private = self.private.lock().unwrap();
            if let Some(line) = private.l1d.lookup(line_addr) {
                if line.state == LineState::Modified {
                    return line.data;
                }
            }
        }
        let data = self.l3.service_write_miss(self.core_id, line_addr);
        let mut private = self.private.lock().unwrap();
        self.install(&mut private, line_addr, LineState::Modified, data);
        data
    }

    fn read_bytes(&mut self, paddr: u64, width: usize) -> [u8; 8] {
        let mut out = [0u8; 8];
        let mut addr = paddr;
        let mut pos = 0;
        let mut remaining = width;
        while remaining > 0 {
            let line_addr = addr & !(LINE_SIZE as u64 - 1);
            let offset = (addr - line_addr) as usize;
            let data = self.read_line(line_addr);
            let take = remaining.min(LINE_SIZE - offset);
            out[pos..pos + take].copy_from_slice(&data[offset..offset + take]);
            addr += take as u64;
            pos += take;
            remaining -= take;
        }
        out
    }

    fn write_bytes(&mut self, paddr: u64, bytes: &[u8]) {
        let mut addr = paddr;
        let mut pos = 0;
        let mut remaining = bytes.len();
        while remaining > 0 {
            let line_addr = addr & !(LINE_SIZE as u64 - 1);
            let offset = (addr - line_addr) as usize;
            self.ensure_modified(line_addr);
            let take = remaining.min(LINE_SIZE - offset);
            {
                let mut private = self.private.lock().unwrap();
                if let Some(line) = private.l1d.lookup(line_addr) {
                    line.data[offset..offset + take].copy_from_slice(&bytes[pos..pos + take]);
                    line.state = LineState::Modified;
                }
                if let Some(line) = private.l2.lookup(line_addr) {
                    line.data[offset..offset + take].copy_from_slice(&bytes[pos..pos + take]);
                    line.state = LineState::Modified;
                }
            }
            addr += take as u64;
            pos += take;
            remaining -= take;
        }
    }

    /// Instruction fetch through L1I, kept separate from the data
    /// `MemoryBus` path so code and data don't thrash the same line in
    /// two different cache arrays.
    pub fn fetch_u32(&mut self, paddr: u64) -> u32 {
        let line_addr = paddr & !(LINE_SIZE as u64 - 1);
        let offset = (paddr - line_addr) as usize;
        {
            let mut private = self.private.lock().unwrap();
            if let Some(line) = private.l1i.lookup(line_addr) {
                return u32::from_le_bytes(line.data[offset..offset + 4].try_into().unwrap());
            }
        }
        let (data, state) = self.l3.service_read_miss(self.core_id, line_addr);
        let mut private = self.private.lock().unwrap();
        private.l1i.insert(CacheLine::new(line_addr, state, data));
        u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }
}

impl<M: MemoryBus + Send> MemoryBus for CacheBus<M> {
    fn read_u8(&mut self, paddr: u64) -> u8 {
        self.read_bytes(paddr, 1)[0]
    }

    fn read_u16(&mut self, paddr: u64) -> u16 {
        u16::from_le_bytes(self.read_bytes(paddr, 2)[0..2].try_into().unwrap())
    }

    fn read_u32(&mut self, paddr: u64) -> u32 {
        u32::from_le_bytes(self.read_bytes(paddr, 4)[0..4].try_into().unwrap())
    }

    fn read_u64(&mut self, paddr: u64) -> u64 {
        u64::from_le_bytes(self.read_bytes(paddr, 8))
    }

    fn write_u8(&mut self, paddr: u64, value: u8) {
        self.write_bytes(paddr, &value.to_le_bytes());
    }

    fn write_u16(&mut self, paddr: u64, value: u16) {
        self.write_bytes(paddr, &value.to_le_bytes());
    }

    fn write_u32(&mut self, paddr: u64, value: u32) {
        self.write_bytes(paddr, &value.to_le_bytes());
    }

    fn write_u64(&mut self, paddr: u64, value: u64) {
        self.write_bytes(paddr, &value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatRam(Vec<u8>);
    impl MemoryBus for FlatRam {
        fn read_u8(&mut self, a: u64) -> u8 {
            self.0[a as usize]
        }
        fn read_u16(&mut self, a: u64) -> u16 {
            u16::from_le_bytes(self.0[a as usize..a as usize + 2].try_into().unwrap())
        }
        fn read_u32(&mut self, a: u64) -> u32 {
            u32::from_le_bytes(self.0[a as usize..a as usize + 4].try_into().unwrap())
        }
        fn read_u64(&mut self, a: u64) -> u64 {
            u64::from_le_bytes(self.0[a as usize..a as usize + 8].try_into().unwrap())
        }
        fn write_u8(&mut self, a: u64, v: u8) {
            self.0[a as usize] = v;
        }
        fn write_u16(&mut self, a: u64, v: u16) {
            self.0[a as usize..a as usize + 2].copy_from_slice(&v.to_le_bytes());
        }
        fn write_u32(&mut self, a: u64, v: u32) {
            self.0[a as usize..a as usize + 4].copy_from_slice(&v.to_le_bytes());
        }
        fn write_u64(&mut self, a: u64, v: u64) {
            self.0[a as usize..a as usize + 8].copy_from_slice(&v.to_le_bytes());
        }
    }

    #[test]
    fn store_then_load_round_trips_through_cache() {
        let l3 = SharedL3::new(FlatRam(vec![0; 0x10000]));
        let mut bus = CacheBus::new(l3);
        bus.write_u64(0x100, 0xDEAD_BEEF_CAFE_F00D);
        assert_eq!(bus.read_u64(0x100), 0xDEAD_BEEF_CAFE_F00D);
    }

    #[test]
    fn store_on_one_core_is_visible_to_another_after_reading_through_l3() {
        let l3 = SharedL3::new(FlatRam(vec![0; 0x10000]));
        let mut bus0 = CacheBus::new(l3.clone());
        let mut bus1 = CacheBus::new(l3);

        bus0.write_u32(0x40, 0x1234_5678);
        assert_eq!(bus1.read_u32(0x40), 0x1234_5678);
    }

    #[test]
    fn unaligned_access_spanning_two_lines_round_trips() {
        let l3 = SharedL3::new(FlatRam(vec![0; 0x10000]));
        let mut bus = CacheBus::new(l3);
        let addr = crate::line::LINE_SIZE as u64 - 4;
        bus.write_u64(addr, 0x0102_0304_0506_0708);
        assert_eq!(bus.read_u64(addr), 0x0102_0304_0506_0708);
    }

    #[test]
    fn fetch_u32_reads_through_l1i() {
        let l3 = SharedL3::new(FlatRam(vec![0xAB; 0x10000]));
        let mut bus = CacheBus::new(l3);
        // All-0xAB backing memory: any aligned word reads as 0xABABABAB.
        assert_eq!(bus.fetch_u32(0x200), 0xABAB_ABAB);
    }
}
