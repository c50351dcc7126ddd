//! The per-core interpreter: register file, dispatcher, instruction
//! handlers, and the tier-0 execution loop. Dependency-free on the hot
//! path — no logging here, matching the teacher's own `aero-cpu-core`.

pub mod dispatch;
pub mod fp;
pub mod handlers;
pub mod interp;
pub mod mem;
pub mod state;
pub mod trap;

pub use dispatch::dispatch;
pub use mem::{CpuBus, PagingBus};
pub use state::{CoreState, Fpcr, FpRegisters, IntRegisters, IprBank, Ps, Reservation};
pub use trap::{InternalError, Trap};
