//! Per-core system bus: the thing `axp-cpu-core::mem::PagingBus` actually
//! talks to once a virtual address has been translated to physical. Routes
//! each physical access to either the cached RAM path or the device bus,
//! using `MemoryMap`'s `kind` field the way `axp-memory`'s module doc says
//! `axp-devices` should (spec §4.11).

use std::sync::{Arc, Mutex};

use axp_cache::CacheBus;
use axp_devices::Bus as DeviceBus;
use axp_memory::{MemoryMap, PhysicalMemory, ReservationTracker};
use axp_mmu::{BusFault, MemoryBus};
use axp_types::{MemoryKind, PhysAddr};

/// Routes every store through the machine-wide [`ReservationTracker`] so a
/// write from one core invalidates an overlapping LL/SC reservation held
/// by another (spec §3). `core_id` identifies which core's reservation
/// this particular bus instance's own loads register -- each core gets
/// its own `SystemBus` but all of them share the same `reservations`
/// handle.
pub struct SystemBus {
    cache: CacheBus<PhysicalMemory>,
    mmio: Arc<Mutex<DeviceBus>>,
    map: Arc<MemoryMap>,
    reservations: Arc<ReservationTracker>,
    core_id: usize,
    last_fault: Option<BusFault>,
}

impl SystemBus {
    pub fn new(
        cache: CacheBus<PhysicalMemory>,
        mmio: Arc<Mutex<DeviceBus>>,
        map: Arc<MemoryMap>,
        reservations: Arc<ReservationTracker>,
        core_id: usize,
    ) -> Self {
        Self {
            cache,
            mmio,
            map,
            reservations,
            core_id,
            last_fault: None,
        }
    }

    pub fn reservations(&self) -> &Arc<ReservationTracker> {
        &self.reservations
    }

    pub fn core_id(&self) -> usize {
        self.core_id
    }

    fn is_mmio(&self, addr: u64) -> bool {
        matches!(
            self.map.lookup_physical(PhysAddr::new(addr)),
            Some(entry) if entry.kind == MemoryKind::Mmio
        )
    }

    /// Broadcasts a store's address range to every core's reservation so
    /// an overlapping one elsewhere is invalidated, regardless of whether
    /// the access went to RAM or a device's MMIO window.
    fn broadcast_write(&self, addr: u64, width: u8) {
        self.reservations.observe_write(addr, width);
    }
}

impl SystemBus {
    /// Services an MMIO read, recording any device-layer fault instead of
    /// propagating it through `MemoryBus`'s infallible signature -- the
    /// caller picks the fault back up via `take_bus_fault` once it's back
    /// in `PagingBus`, which is the one that knows how to turn it into a
    /// `Trap`. The value returned on a fault is never used by a caller
    /// that checks `take_bus_fault` first.
    fn mmio_read(&mut self, paddr: u64, width: u8) -> u64 {
        match self.mmio.lock().unwrap().read(paddr, width) {
            Ok(value) => value,
            Err(fault) => {
                self.last_fault = Some(fault);
                0
            }
        }
    }

    fn mmio_write(&mut self, paddr: u64, value: u64, width: u8) {
        if let Err(fault) = self.mmio.lock().unwrap().write(paddr, value, width) {
            self.last_fault = Some(fault);
        }
    }
}

impl MemoryBus for SystemBus {
    fn read_u8(&mut self, paddr: u64) -> u8 {
        if self.is_mmio(paddr) {
            self.mmio_read(paddr, 1) as u8
        } else {
            self.cache.read_u8(paddr)
        }
    }

    fn read_u16(&mut self, paddr: u64) -> u16 {
        if self.is_mmio(paddr) {
            self.mmio_read(paddr, 2) as u16
        } else {
            self.cache.read_u16(paddr)
        }
    }

    fn read_u32(&mut self, paddr: u64) -> u32 {
        if self.is_mmio(paddr) {
            self.mmio_read(paddr, 4) as u32
        } else {
            self.cache.read_u32(paddr)
        }
    }

    fn read_u64(&mut self, paddr: u64) -> u64 {
        if self.is_mmio(paddr) {
            self.mmio_read(paddr, 8)
        } else {
            self.cache.read_u64(paddr)
        }
    }

    fn write_u8(&mut self, paddr: u64, value: u8) {
        if self.is_mmio(paddr) {
            self.mmio_write(paddr, value as u64, 1);
        } else {
            self.cache.write_u8(paddr, value);
        }
        self.broadcast_write(paddr, 1);
    }

    fn write_u16(&mut self, paddr: u64, value: u16) {
        if self.is_mmio(paddr) {
            self.mmio_write(paddr, value as u64, 2);
        } else {
            self.cache.write_u16(paddr, value);
        }
        self.broadcast_write(paddr, 2);
    }

    fn write_u32(&mut self, paddr: u64, value: u32) {
        if self.is_mmio(paddr) {
            self.mmio_write(paddr, value as u64, 4);
        } else {
            self.cache.write_u32(paddr, value);
        }
        self.broadcast_write(paddr, 4);
    }

    fn write_u64(&mut self, paddr: u64, value: u64) {
        if self.is_mmio(paddr) {
            self.mmio_write(paddr, value, 8);
        } else {
            self.cache.write_u64(paddr, value);
        }
        self.broadcast_write(paddr, 8);
    }

    fn take_bus_fault(&mut self) -> Option<BusFault> {
        self.last_fault.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axp_cache::SharedL3;
    use axp_devices::Uart16550;
    use axp_types::{MemoryMapEntry, Protection, VirtAddr};

    fn ram_map(ram_bytes: u64, mmio_base: u64, mmio_size: u64) -> Arc<MemoryMap> {
        let map = MemoryMap::new();
        map.insert(MemoryMapEntry {
            virtual_base: VirtAddr::new(0),
            physical_base: PhysAddr::new(0),
            length: ram_bytes,
            protection: Protection::all_rwx(),
            kind: MemoryKind::Ram,
        });
        map.insert(MemoryMapEntry {
            virtual_base: VirtAddr::new(mmio_base),
            physical_base: PhysAddr::new(mmio_base),
            length: mmio_size,
            protection: Protection::all_rwx(),
            kind: MemoryKind::Mmio,
        });
        Arc::new(map)
    }

    #[test]
    fn ram_addresses_round_trip_through_cache() {
        let l3 = SharedL3::new(PhysicalMemory::new(0x1000));
        let cache = CacheBus::new(l3);
        let devices = Arc::new(Mutex::new(DeviceBus::new()));
        let map = ram_map(0x1000, 0x8000, 0x100);
        let reservations = Arc::new(ReservationTracker::new(1));
        let mut bus = SystemBus::new(cache, devices, map, reservations, 0);

        bus.write_u32(0x10, 0xDEAD_BEEF);
        assert_eq!(bus.read_u32(0x10), 0xDEAD_BEEF);
    }

    #[test]
    fn mmio_addresses_route_to_the_device_bus() {
        let l3 = SharedL3::new(PhysicalMemory::new(0x1000));
        let cache = CacheBus::new(l3);
        let mut devices = DeviceBus::new();
        devices.register(0x8000, 0x8, Box::new(Uart16550::new(None)));
        let devices = Arc::new(Mutex::new(devices));
        let map = ram_map(0x1000, 0x8000, 0x100);
        let reservations = Arc::new(ReservationTracker::new(1));
        let mut bus = SystemBus::new(cache, devices, map, reservations, 0);

        bus.write_u8(0x8000, b'h');
        bus.write_u8(0x8000, b'i');
        assert_eq!(bus.read_u8(0x8005) & 0b0110_0000, 0b0110_0000); // LSR THR/TSR empty bits
    }

    #[test]
    fn unmapped_mmio_access_surfaces_as_a_bus_fault() {
        let l3 = SharedL3::new(PhysicalMemory::new(0x1000));
        let cache = CacheBus::new(l3);
        let devices = Arc::new(Mutex::new(DeviceBus::new()));
        let map = ram_map(0x1000, 0x8000, 0x100);
        let reservations = Arc::new(ReservationTracker::new(1));
        let mut bus = SystemBus::new(cache, devices, map, reservations, 0);

        assert_eq!(bus.take_bus_fault(), None);
        bus.read_u8(0x8000); // mapped as Mmio, but no device registered there
        assert_eq!(bus.take_bus_fault(), Some(BusFault::Unmapped));
        // Taking the fault clears it.
        assert_eq!(bus.take_bus_fault(), None);
    }

    #[test]
    fn store_on_one_core_invalidates_another_cores_reservation() {
        let l3 = SharedL3::new(PhysicalMemory::new(0x1000));
        let devices = Arc::new(Mutex::new(DeviceBus::new()));
        let map = ram_map(0x1000, 0x8000, 0x100);
        let reservations = Arc::new(ReservationTracker::new(2));
        reservations.set(1, 0x10, 4);

        let mut core0_bus = SystemBus::new(CacheBus::new(l3.clone()), devices, map, reservations.clone(), 0);
        core0_bus.write_u32(0x10, 0x1);

        assert!(!reservations.is_valid(1));
    }
}
