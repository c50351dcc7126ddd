/// What happened executing one step (one interpreter iteration, spec
/// §4.2's tier-0 loop) of a core.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StepOutcome {
    Continue,
    Halt,
    HaltForced,
    Fault,
}

/// The four TLB shootdown scopes (spec §4.7), mirrored here rather than
/// imported so this crate stays agnostic of what a TLB actually is --
/// `axp-machine`'s driver maps these onto `axp_mmu::tlb::ShootdownScope`
/// when it actually invalidates anything.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShootdownScope {
    SingleVa(u64),
    Asn(u32),
    All,
    InstructionSideOnly,
}

/// The actual CPU: fetch/decode/dispatch for one instruction, drained by
/// `axp-smp`'s per-core thread. `axp-machine` supplies the concrete
/// implementation wiring `axp-cpu-core::interp::tier0`, the core's
/// `PagingBus`/`CacheBus`, and `axp-pal`'s trap entry together; `axp-smp`
/// only needs this narrow trait to run the thread loop.
pub trait CoreDriver: Send {
    fn step(&mut self) -> StepOutcome;

    /// Restores architectural reset state. Called only while the core's
    /// thread is parked at a barrier (system reset, spec §4.9).
    fn reset(&mut self) {}

    /// Invalidates this core's own TLB per `scope` (spec §4.7's
    /// shootdown). Default no-op for drivers that don't model one.
    fn invalidate_tlb(&mut self, _scope: ShootdownScope) {}
}
