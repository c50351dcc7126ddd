//! Physical RAM, the system memory map, and cross-core reservation
//! bookkeeping (spec §3/§4.5). MMIO routing itself lives in
//! `axp-devices`, which layers on top of `MemoryMap`'s `kind` field to
//! decide whether an access goes to RAM or a device handler.

pub mod map;
pub mod physical;
pub mod reservation;

pub use map::MemoryMap;
pub use physical::PhysicalMemory;
pub use reservation::ReservationTracker;
