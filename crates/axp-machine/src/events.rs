//! Observation hooks a host can attach to a running [`crate::Machine`]
//! (spec §6 `EventSink`). Every hook has a no-op default so an embedder
//! only pays for the events it actually wants to watch.

use axp_cpu_core::trap::Trap;
use axp_smp::CoreStatus;

/// One core's status transition, reported whenever [`crate::Machine`]
/// observes a [`axp_smp::CoreDriver::step`] outcome change it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChanged {
    pub core: usize,
    pub status: CoreStatus,
}

/// Fired once per retired instruction when the embedder has asked for
/// per-instruction tracing (`Config::trace_level >= 2`); left off by
/// default since it dominates hot-loop cost otherwise.
#[derive(Clone, Copy, Debug)]
pub struct InstructionExecuted {
    pub core: usize,
    pub pc: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryAccessKind {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug)]
pub struct MemoryAccessed {
    pub core: usize,
    pub address: u64,
    pub width: u8,
    pub kind: MemoryAccessKind,
}

#[derive(Clone, Copy, Debug)]
pub struct CpuTrapEvent {
    pub core: usize,
    pub pc: u64,
    pub trap: Trap,
}

#[derive(Clone, Copy, Debug)]
pub struct DeviceAccessed {
    pub device_base: u64,
    pub offset: u64,
    pub width: u8,
    pub is_write: bool,
}

/// The full set of hooks a [`crate::Machine`] calls out to. `axp-machine`
/// itself never branches on trace_level beyond deciding *whether* to call
/// these at all -- what to do with an event is entirely up to the sink.
pub trait EventSink: Send {
    fn status_changed(&mut self, _event: StatusChanged) {}
    fn instruction_executed(&mut self, _event: InstructionExecuted) {}
    fn memory_accessed(&mut self, _event: MemoryAccessed) {}
    fn cpu_trap(&mut self, _event: CpuTrapEvent) {}
    fn device_accessed(&mut self, _event: DeviceAccessed) {}
}

/// The default sink: observes nothing, costs nothing.
#[derive(Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {}
