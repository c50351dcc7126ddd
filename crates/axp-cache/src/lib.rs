//! Per-core L1I/L1D/L2 plus a shared, coherent L3 (spec §4.8). The L3 is
//! the system's single ordering point: it owns the MESI directory and is
//! the only component with reach into every core's private hierarchy, so
//! it can downgrade or invalidate a remote copy during a coherence
//! transaction. `CacheBus` is what `axp-cpu-core` actually talks to,
//! implementing `axp_mmu::MemoryBus` over this whole stack.

mod bus;
mod directory;
mod line;
mod prefetch;
mod private;
mod set;
mod shared;

pub use bus::CacheBus;
pub use line::{CacheLine, LineState, LINE_SIZE};
pub use prefetch::StridePrefetcher;
pub use private::PrivateCaches;
pub use shared::SharedL3;
