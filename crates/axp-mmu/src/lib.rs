//! TLB and page-table walking for a single Alpha core: the pieces
//! `axp-cpu-core`'s `PagingBus` composes into full VA→PA translation.

pub mod bus;
pub mod tlb;
pub mod walker;

pub use bus::{BusFault, MemoryBus};
pub use tlb::{AccessKind, ShootdownScope, Tlb, TlbEntry, TlbPartition};
pub use walker::{walk, Fault, PageTableEntry, PAGE_SHIFT, PAGE_SIZE};
