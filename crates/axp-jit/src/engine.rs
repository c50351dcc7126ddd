use std::collections::HashMap;
use std::ops::Range;

use axp_cpu_core::mem::CpuBus;
use axp_cpu_core::state::CoreState;
use axp_cpu_core::trap::Trap;

use crate::backend::JitBackend;

/// Default hit count (spec.md §9) a basic block must reach before it is
/// handed to `compile`. Chosen the way the teacher's own tier-up
/// thresholds are: a small constant, overridable per `axp-machine`
/// config rather than hardcoded into the engine.
pub const DEFAULT_JIT_THRESHOLD: u32 = 50;

/// What happened when a basic block was entered.
pub enum JitStep {
    /// The block was already compiled (or just crossed the threshold
    /// and was compiled on the spot); it ran to completion or trapped.
    Ran(Option<Trap>),
    /// Still below `jit_threshold`; the caller should fall back to
    /// stepping the interpreter itself, one instruction at a time.
    NotCompiled,
}

/// Per-block hit counting and compiled-block cache, generic over
/// whichever [`JitBackend`] is wired in. `axp-machine` owns one of
/// these per core.
pub struct JitEngine<B: JitBackend> {
    backend: B,
    threshold: u32,
    hits: HashMap<u64, u32>,
    compiled: HashMap<u64, B::CompiledBlock>,
}

impl<B: JitBackend> JitEngine<B> {
    pub fn new(backend: B, threshold: u32) -> Self {
        Self {
            backend,
            threshold: threshold.max(1),
            hits: HashMap::new(),
            compiled: HashMap::new(),
        }
    }

    /// Number of distinct compiled blocks currently cached.
    pub fn compiled_block_count(&self) -> usize {
        self.compiled.len()
    }

    /// Called once per basic-block entry at `start_pc`, with its raw
    /// instruction bytes in case compilation is triggered. If the block
    /// is already compiled (or just crossed `jit_threshold`), it is run
    /// immediately and [`JitStep::Ran`] is returned; otherwise the hit
    /// counter is bumped and [`JitStep::NotCompiled`] tells the caller
    /// to keep interpreting this block itself.
    pub fn on_block_entry(
        &mut self,
        start_pc: u64,
        raw_bytes: &[u8],
        core: &mut CoreState,
        bus: &mut dyn CpuBus,
    ) -> JitStep {
        if let Some(block) = self.compiled.get(&start_pc) {
            return JitStep::Ran(self.backend.invoke(block, core, bus));
        }

        let hits = self.hits.entry(start_pc).or_insert(0);
        *hits += 1;
        if *hits < self.threshold {
            return JitStep::NotCompiled;
        }

        let block = self.backend.compile(start_pc, raw_bytes);
        let trap = self.backend.invoke(&block, core, bus);
        self.compiled.insert(start_pc, block);
        self.hits.remove(&start_pc);
        JitStep::Ran(trap)
    }

    /// Drops every compiled block and hit counter overlapping
    /// `address_range`, forwarding to the backend so it can release any
    /// native resources it holds for those blocks.
    pub fn invalidate(&mut self, address_range: Range<u64>) {
        self.hits.retain(|pc, _| !address_range.contains(pc));
        self.compiled.retain(|pc, _| !address_range.contains(pc));
        self.backend.invalidate(address_range);
    }
}
