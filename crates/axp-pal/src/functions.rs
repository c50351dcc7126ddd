use axp_cpu_core::{CoreState, Trap};

/// Conventional argument/return register for PALcode functions below,
/// matching how guest code would pass a single word in/out of a
/// privileged call (this core's own convention; spec.md leaves PAL
/// function calling conventions to PALcode).
const ARG_REG: u8 = 16;
const RET_REG: u8 = 0;

/// CALL_PAL function codes implemented for boot (spec §4.10). Anything
/// else reaches [`invoke`]'s fallback and raises the reserved-PAL trap.
pub mod function {
    pub const HALT: u32 = 0x0000;
    pub const WRKGP: u32 = 0x0001;
    pub const WRUSP: u32 = 0x0002;
    pub const RDUSP: u32 = 0x0003;
    /// Matches real Alpha OSF/1 PALcode's `CALLSYS` function code.
    pub const SYSTEM_CALL: u32 = 0x0083;
}

/// What a PAL function asked the host to do, beyond mutating `CoreState`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PalOutcome {
    Continue,
    Halt,
    /// Guest issued CALLSYS; `v0` (R0) holds the syscall number by
    /// convention. The host driver decides what, if anything, happens.
    SystemCall(u64),
}

/// Kernel-global-pointer and user-stack-pointer: PALcode-private state,
/// distinct from the architectural IPR bank (spec §3 doesn't name these
/// as architectural registers; OSF/1 PALcode keeps them as its own
/// scratch storage).
#[derive(Clone, Copy, Default, Debug)]
pub struct PalState {
    pub kernel_global_pointer: u64,
    pub user_stack_pointer: u64,
}

/// Executes the PAL function named by `code`. Unrecognized codes raise
/// `Trap::IllegalInstruction` (the reserved-PAL trap — spec.md doesn't
/// define a distinct trap kind for it, so it shares illegal-instruction
/// handling, matching how an unmapped dispatcher entry is treated).
pub fn invoke(code: u32, core: &mut CoreState, pal_state: &mut PalState) -> Result<PalOutcome, Trap> {
    match code {
        function::HALT => Ok(PalOutcome::Halt),
        function::WRKGP => {
            pal_state.kernel_global_pointer = core.int_regs.read(ARG_REG);
            Ok(PalOutcome::Continue)
        }
        function::WRUSP => {
            pal_state.user_stack_pointer = core.int_regs.read(ARG_REG);
            Ok(PalOutcome::Continue)
        }
        function::RDUSP => {
            core.int_regs.write(RET_REG, pal_state.user_stack_pointer);
            Ok(PalOutcome::Continue)
        }
        function::SYSTEM_CALL => Ok(PalOutcome::SystemCall(core.int_regs.read(RET_REG))),
        _ => Err(Trap::IllegalInstruction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_requests_core_halt() {
        let mut core = CoreState::default();
        let mut pal = PalState::default();
        assert_eq!(invoke(function::HALT, &mut core, &mut pal).unwrap(), PalOutcome::Halt);
    }

    #[test]
    fn wrusp_then_rdusp_round_trips_through_pal_state() {
        let mut core = CoreState::default();
        let mut pal = PalState::default();
        core.int_regs.write(ARG_REG, 0xABCD_0000);
        invoke(function::WRUSP, &mut core, &mut pal).unwrap();
        assert_eq!(pal.user_stack_pointer, 0xABCD_0000);

        invoke(function::RDUSP, &mut core, &mut pal).unwrap();
        assert_eq!(core.int_regs.read(RET_REG), 0xABCD_0000);
    }

    #[test]
    fn wrkgp_stores_argument_register() {
        let mut core = CoreState::default();
        let mut pal = PalState::default();
        core.int_regs.write(ARG_REG, 0x7777);
        invoke(function::WRKGP, &mut core, &mut pal).unwrap();
        assert_eq!(pal.kernel_global_pointer, 0x7777);
    }

    #[test]
    fn system_call_reports_syscall_number_from_v0() {
        let mut core = CoreState::default();
        let mut pal = PalState::default();
        core.int_regs.write(RET_REG, 42);
        assert_eq!(
            invoke(function::SYSTEM_CALL, &mut core, &mut pal).unwrap(),
            PalOutcome::SystemCall(42)
        );
    }

    #[test]
    fn unknown_function_is_reserved_pal_trap() {
        let mut core = CoreState::default();
        let mut pal = PalState::default();
        assert_eq!(invoke(0xFFFF, &mut core, &mut pal), Err(Trap::IllegalInstruction));
    }
}
