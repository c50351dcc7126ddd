use std::ops::Range;

use axp_cpu_core::mem::CpuBus;
use axp_cpu_core::state::CoreState;
use axp_cpu_core::trap::Trap;

/// The contract a compiled-code tier must satisfy (spec.md §9 DESIGN
/// NOTES). `axp-jit` specifies this contract and ships one backend that
/// satisfies it trivially; a native-codegen backend is out of scope for
/// this core but can be dropped in behind the same trait.
pub trait JitBackend {
    /// Opaque compiled representation of one basic block, produced by
    /// `compile` and handed back to `invoke` unchanged.
    type CompiledBlock;

    /// Compiles the basic block starting at `start_pc` whose raw
    /// instruction words are `raw_bytes` (a whole number of 4-byte
    /// instructions, fetched by the caller before the hit-count
    /// threshold was crossed).
    fn compile(&self, start_pc: u64, raw_bytes: &[u8]) -> Self::CompiledBlock;

    /// Runs a previously compiled block to completion (or until it
    /// traps). Must reproduce the same architectural state transition
    /// as interpreting the same instructions one at a time (spec §8:
    /// bit-identical semantics across execution tiers).
    fn invoke(&self, block: &Self::CompiledBlock, core: &mut CoreState, bus: &mut dyn CpuBus) -> Option<Trap>;

    /// Discards any compiled blocks overlapping `address_range`, e.g.
    /// after a guest self-modifying-code write or a TLB/ASN event that
    /// invalidates cached translations. The shipped shim has nothing to
    /// release; a native backend would free executable pages here.
    fn invalidate(&self, address_range: Range<u64>);
}
