//! PAL interpreter (spec §4.10): exception/interrupt entry sequence, the
//! inverse already lives as `axp-cpu-core::handlers::branch::rei`, and
//! the boot PAL function table (`HALT`, `WRKGP`, `WRUSP`, `RDUSP`,
//! `SYSTEM_CALL`). `MACHINE_CHECK` and `BUS_ERROR` are represented as
//! dedicated entries in the exception-entry table ([`entry_offset`])
//! rather than `CALL_PAL`-invoked functions, since guest code never
//! calls them directly — the host raises the corresponding `Trap` and
//! [`enter_exception`] routes control to their entry point.

mod entry;
mod functions;

pub use entry::{entry_offset, enter_exception};
pub use functions::{function, invoke, PalOutcome, PalState};
