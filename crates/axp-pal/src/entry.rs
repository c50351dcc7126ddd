use axp_cpu_core::{CoreState, Trap};

/// Entry offset from `PAL_BASE` for each trap kind. The architecture
/// doesn't constrain this layout (spec.md leaves it to PALcode); these
/// offsets are this core's own internally consistent table, spaced to
/// leave room for a handful of instructions per entry.
pub fn entry_offset(trap: Trap) -> u64 {
    match trap {
        Trap::ArithmeticOverflow | Trap::DivideByZero | Trap::Inexact | Trap::InvalidOperation => 0x0500,
        Trap::IllegalInstruction | Trap::PrivilegedInstruction => 0x0600,
        Trap::Alignment => 0x0700,
        Trap::AccessViolation
        | Trap::FaultOnRead
        | Trap::FaultOnWrite
        | Trap::FaultOnExecute
        | Trap::TranslationNotValid
        | Trap::PageFault => 0x0800,
        Trap::MachineCheck => 0x0900,
        Trap::BusError => 0x0A00,
        Trap::FpDisabled => 0x0B00,
        Trap::Breakpoint => 0x0C00,
        Trap::SystemCall => 0x0D00,
        Trap::Interrupt => 0x0E00,
    }
}

/// Exception entry (spec §4.10): save PC/PS to the exception IPRs, enter
/// PAL mode, disable interrupts, transfer to `PAL_BASE + entry_offset`.
/// The faulting PC is saved as-is, since handlers never advance PC before
/// returning an `Err(Trap)` (spec §4.2). `CALL_PAL` itself (the
/// `Trap::SystemCall` path's trigger) does its own entry sequence in
/// `axp-cpu-core::handlers::branch::call_pal` rather than going through
/// this function, since its target depends on the call's function code
/// rather than a fixed per-trap offset.
pub fn enter_exception(core: &mut CoreState, trap: Trap) {
    core.iprs.exc_addr = core.pc;
    core.iprs.exc_ps = core.ps.bits();
    core.ps.pal_mode = true;
    core.ps.interrupts_enabled = false;
    core.reservation.clear();
    core.pc = core.iprs.pal_base.wrapping_add(entry_offset(trap));
}
