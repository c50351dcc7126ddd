//! The concrete [`axp_smp::CoreDriver`] that actually runs a core: wires
//! together the interpreter, the per-core TLB/paging path, the optional
//! JIT tier, and the PAL dispatch bridge (spec §4.10) that lets CALL_PAL
//! reach `axp-pal`'s boot function table without PALcode text ever being
//! fetched from memory.

use std::sync::{Arc, Mutex};

use axp_cpu_core::handlers::branch;
use axp_cpu_core::interp::tier0;
use axp_cpu_core::mem::PagingBus;
use axp_cpu_core::state::CoreState;
use axp_cpu_core::trap::Trap;
use axp_interrupts::InterruptController;
use axp_jit::{InterpreterBackend, JitEngine, JitStep};
use axp_mmu::tlb::{ShootdownScope as TlbShootdownScope, Tlb};
use axp_pal::{entry, function, invoke, PalOutcome, PalState};
use axp_smp::{CoreDriver, ShootdownScope, StepOutcome};

use crate::bus::SystemBus;
use crate::events::{CpuTrapEvent, EventSink, InstructionExecuted};

/// The five boot PAL functions' entry addresses, relative to `pal_base`.
/// CALL_PAL's target address space and the fixed exception-entry table
/// both fall on multiples of 0x40, so recognizing "this PC is a PAL
/// function we know how to run" has to be exact-address matching against
/// this list rather than a generic alignment test (see `axp-pal`'s own
/// module doc for why `enter_exception` and `call_pal` target disjoint
/// but overlapping-looking address spaces).
const KNOWN_PAL_FUNCTIONS: &[u32] = &[
    function::HALT,
    function::WRKGP,
    function::WRUSP,
    function::RDUSP,
    function::SYSTEM_CALL,
];

fn known_pal_function_at(pal_base: u64, pc: u64) -> Option<u32> {
    KNOWN_PAL_FUNCTIONS
        .iter()
        .copied()
        .find(|&f| pal_base.wrapping_add((f as u64) * 0x40) == pc)
}

/// One core's execution engine. Owned by `axp-smp::SmpManager`, one
/// instance per core, each with its own TLB and JIT engine but sharing
/// the machine-wide cache/device/interrupt state through `SystemBus`.
pub struct MachineCoreDriver {
    core_id: usize,
    pub(crate) state: CoreState,
    tlb: Tlb,
    bus: SystemBus,
    interrupts: Arc<InterruptController>,
    pal_state: PalState,
    jit: Option<JitEngine<InterpreterBackend>>,
    events: Arc<Mutex<dyn EventSink>>,
    trace_level: u8,
}

impl MachineCoreDriver {
    pub fn new(
        core_id: usize,
        state: CoreState,
        tlb: Tlb,
        bus: SystemBus,
        interrupts: Arc<InterruptController>,
        jit_threshold: Option<u32>,
        events: Arc<Mutex<dyn EventSink>>,
        trace_level: u8,
    ) -> Self {
        Self {
            core_id,
            state,
            tlb,
            bus,
            interrupts,
            pal_state: PalState::default(),
            jit: jit_threshold.map(|threshold| JitEngine::new(InterpreterBackend, threshold)),
            events,
            trace_level,
        }
    }

    pub fn core_state(&self) -> &CoreState {
        &self.state
    }

    pub fn core_state_mut(&mut self) -> &mut CoreState {
        &mut self.state
    }

    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    pub fn tlb_mut(&mut self) -> &mut Tlb {
        &mut self.tlb
    }

    pub fn pal_state(&self) -> &PalState {
        &self.pal_state
    }

    /// Services a pending interrupt if one is eligible at the core's
    /// current IPL and interrupts are currently enabled (spec §4.9). Runs
    /// before every instruction fetch, never mid-instruction.
    fn maybe_take_interrupt(&mut self) {
        if self.state.ps.pal_mode || !self.state.ps.interrupts_enabled {
            return;
        }
        if self
            .interrupts
            .highest_eligible(self.core_id, self.state.ps.ipl)
            .is_some()
        {
            entry::enter_exception(&mut self.state, Trap::Interrupt);
            self.bus.reservations().clear(self.core_id);
        }
    }

    /// Recognizes and runs a known boot PAL function if `state.pc` is
    /// currently sitting at its entry address (reached by the prior
    /// step's CALL_PAL dispatch inside `axp-cpu-core`, which only performs
    /// the control transfer -- actually running the function's effect and
    /// returning control to the caller is this driver's job). Returns
    /// `None` if the PC isn't one of the functions this core implements,
    /// in which case the caller treats it as an unrecognized PAL-mode
    /// fault.
    fn try_run_pal_function(&mut self) -> Option<StepOutcome> {
        let pal_base = self.state.iprs.pal_base;
        let function_code = known_pal_function_at(pal_base, self.state.pc)?;

        match invoke(function_code, &mut self.state, &mut self.pal_state) {
            Ok(PalOutcome::Halt) => Some(StepOutcome::Halt),
            Ok(PalOutcome::Continue) => {
                branch::rei(&mut self.state).expect("rei is infallible");
                self.bus.reservations().clear(self.core_id);
                Some(StepOutcome::Continue)
            }
            Ok(PalOutcome::SystemCall(number)) => {
                log::debug!(
                    "core {} issued CALLSYS {number}, returning without servicing it",
                    self.core_id
                );
                branch::rei(&mut self.state).expect("rei is infallible");
                self.bus.reservations().clear(self.core_id);
                Some(StepOutcome::Continue)
            }
            Err(trap) => {
                self.report_trap(trap);
                Some(StepOutcome::Fault)
            }
        }
    }

    fn report_trap(&self, trap: Trap) {
        self.events.lock().unwrap().cpu_trap(CpuTrapEvent {
            core: self.core_id,
            pc: self.state.pc,
            trap,
        });
    }

    /// Pulls in any cross-core invalidation observed since this core's
    /// last instruction: a remote store overlapping our reservation
    /// clears the tracker entry, and that has to reach the fast-path
    /// local copy too (spec §3: LL/SC reservations are globally
    /// coherent even though each core keeps its own local copy).
    fn sync_reservation_before(&mut self) {
        if self.state.reservation.valid && !self.bus.reservations().is_valid(self.core_id) {
            self.state.reservation.clear();
        }
    }

    /// Pushes a local reservation change (set by `LDx_L`, cleared by
    /// `STx_C`/an overlapping local store) out to the shared tracker so
    /// other cores' `sync_reservation_before` sees it.
    fn sync_reservation_after(&mut self, was_valid: bool) {
        let reservation = self.state.reservation;
        if reservation.valid && !was_valid {
            self.bus.reservations().set(self.core_id, reservation.address, reservation.size);
        } else if !reservation.valid && was_valid {
            self.bus.reservations().clear(self.core_id);
        }
    }

    /// Runs one instruction. `iprs` is copied out of `self.state` for the
    /// duration of the call and copied back afterward (rather than
    /// borrowed in place) because `PagingBus` needs `&mut IprBank` while
    /// `tier0::exec`/the JIT engine separately need `&mut CoreState` as a
    /// whole -- the same split the crate's own paging tests use.
    fn run_one_instruction(&mut self) -> Result<(), Trap> {
        self.sync_reservation_before();
        let was_valid = self.state.reservation.valid;
        let mut iprs = self.state.iprs;
        let result = {
            let mut paging = PagingBus::new(&mut self.bus, &mut self.tlb, &mut iprs);
            if let Some(jit) = &mut self.jit {
                let pc = self.state.pc;
                match paging.fetch_u32(pc) {
                    Ok(word) => match jit.on_block_entry(pc, &word.to_le_bytes(), &mut self.state, &mut paging) {
                        JitStep::Ran(trap) => match trap {
                            Some(trap) => Err(trap),
                            None => Ok(()),
                        },
                        JitStep::NotCompiled => tier0::exec(&mut self.state, &mut paging),
                    },
                    Err(trap) => Err(trap),
                }
            } else {
                tier0::exec(&mut self.state, &mut paging)
            }
        };
        self.state.iprs = iprs;
        self.sync_reservation_after(was_valid);
        result
    }
}

impl CoreDriver for MachineCoreDriver {
    fn step(&mut self) -> StepOutcome {
        self.maybe_take_interrupt();

        if self.state.ps.pal_mode {
            if let Some(outcome) = self.try_run_pal_function() {
                return outcome;
            }
            // PAL mode but not one of the functions this core implements
            // (an unimplemented exception entry, or CALL_PAL to a
            // function code outside the boot table): there is no real
            // PALcode text to fetch here, so this core cannot make
            // progress.
            self.report_trap(Trap::IllegalInstruction);
            return StepOutcome::Fault;
        }

        let pc_before = self.state.pc;
        match self.run_one_instruction() {
            Ok(()) => {
                if self.trace_level >= 2 {
                    self.events.lock().unwrap().instruction_executed(InstructionExecuted {
                        core: self.core_id,
                        pc: pc_before,
                    });
                }
                StepOutcome::Continue
            }
            Err(trap) => {
                self.report_trap(trap);
                entry::enter_exception(&mut self.state, trap);
                StepOutcome::Continue
            }
        }
    }

    fn reset(&mut self) {
        let start_pc = self.state.pc;
        let pal_base = self.state.iprs.pal_base;
        self.state = CoreState::new(start_pc);
        self.state.iprs.pal_base = pal_base;
        self.pal_state = PalState::default();
        self.bus.reservations().clear(self.core_id);
    }

    fn invalidate_tlb(&mut self, scope: ShootdownScope) {
        let scope = match scope {
            ShootdownScope::SingleVa(va) => TlbShootdownScope::SingleVa(va),
            ShootdownScope::Asn(asn) => TlbShootdownScope::Asn(asn),
            ShootdownScope::All => TlbShootdownScope::All,
            ShootdownScope::InstructionSideOnly => TlbShootdownScope::InstructionSideOnly,
        };
        self.tlb.invalidate(scope);
    }
}
