//! The top-level assembled machine (spec §6): configuration, the shared
//! cache/memory/interrupt/device fabric, and the [`axp_smp::SmpManager`]
//! that runs every core, wired up behind one embeddable [`Machine`] type.
//! Generic over disk/net backend types so an embedder can supply real
//! I/O without this crate depending on it (spec §1 non-goals).

mod backend;
mod bus;
mod config;
mod devices;
mod driver;
mod error;
mod events;
mod firmware;
mod machine;

pub use backend::{NullDiskBackend, NullNetBackend};
pub use config::{Config, ConfigError, DeviceConfig};
pub use error::MachineError;
pub use events::{
    CpuTrapEvent, DeviceAccessed, EventSink, InstructionExecuted, MemoryAccessKind, MemoryAccessed, NoopEventSink, StatusChanged,
};
pub use machine::Machine;
