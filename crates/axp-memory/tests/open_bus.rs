use axp_memory::{MemoryMap, PhysicalMemory};
use axp_mmu::MemoryBus;
use axp_types::{MemoryKind, MemoryMapEntry, PhysAddr, Protection, VirtAddr};

/// spec §3: memory map entries are immutable after creation and only
/// whole-entry insert/remove is supported; physical RAM outside any
/// mapped range reads as all-ones regardless of the map's contents.
#[test]
fn ram_window_reads_zero_initialized_while_outside_window_is_open_bus() {
    let mut ram = PhysicalMemory::new(0x2000);
    let map = MemoryMap::new();
    map.insert(MemoryMapEntry {
        virtual_base: VirtAddr::new(0x1_0000_0000),
        physical_base: PhysAddr::new(0),
        length: 0x2000,
        protection: Protection::kernel_rwx(),
        kind: MemoryKind::Ram,
    });

    assert!(map.lookup_virtual(VirtAddr::new(0x1_0000_0100)).is_some());
    assert_eq!(ram.read_u64(0x100), 0);
    assert_eq!(ram.read_u64(0x5000), 0xFFFF_FFFF_FFFF_FFFF);
}
