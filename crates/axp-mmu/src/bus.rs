/// A device-layer fault observed during the most recent access (spec
/// §4.11/§7): the MMIO range touched wasn't backed by any registered
/// device, or the access width the device saw wasn't one it understood.
/// Plain-RAM `MemoryBus` implementors can't produce one, so the trait
/// method that surfaces this defaults to reporting none.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusFault {
    Unmapped,
    BadWidth,
}

/// The physical-bus contract consumed by the TLB's page-table walker and
/// by `axp-cpu-core`'s `PagingBus` adapter. Implemented by `axp-cache`
/// (coherent, multi-core) and directly by `axp-memory::PhysicalMemory`
/// (single backing store, used in tests and by the walker itself).
pub trait MemoryBus {
    fn read_u8(&mut self, paddr: u64) -> u8;
    fn read_u16(&mut self, paddr: u64) -> u16;
    fn read_u32(&mut self, paddr: u64) -> u32;
    fn read_u64(&mut self, paddr: u64) -> u64;

    fn write_u8(&mut self, paddr: u64, value: u8);
    fn write_u16(&mut self, paddr: u64, value: u16);
    fn write_u32(&mut self, paddr: u64, value: u32);
    fn write_u64(&mut self, paddr: u64, value: u64);

    /// Takes (and clears) whatever device-layer fault the access just
    /// performed triggered, if any. Implementors backed by plain RAM
    /// never set one.
    fn take_bus_fault(&mut self) -> Option<BusFault> {
        None
    }
}
