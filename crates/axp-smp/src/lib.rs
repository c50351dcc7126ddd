//! Core lifecycle, barrier synchronization, and IPI routing (spec §4.9).
//! Agnostic of CPU internals: callers provide a [`CoreDriver`] per core
//! and this crate handles threading, pause/resume/stop, and the
//! barrier used for system-wide synchronization points.

mod barrier;
mod driver;
mod lifecycle;
mod manager;

pub use barrier::Barrier;
pub use driver::{CoreDriver, ShootdownScope, StepOutcome};
pub use lifecycle::CoreStatus;
pub use manager::SmpManager;
