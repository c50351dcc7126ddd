use axp_cpu_core::handlers::branch;
use axp_cpu_core::mem::CpuBus;
use axp_cpu_core::{CoreState, Trap};
use axp_pal::{function, invoke, PalOutcome, PalState};

struct NoopBus;
impl CpuBus for NoopBus {
    fn read_u8(&mut self, _va: u64, _mode: axp_types::Mode) -> Result<u8, Trap> {
        unreachable!()
    }
    fn read_u16(&mut self, _va: u64, _mode: axp_types::Mode) -> Result<u16, Trap> {
        unreachable!()
    }
    fn read_u32(&mut self, _va: u64, _mode: axp_types::Mode) -> Result<u32, Trap> {
        unreachable!()
    }
    fn read_u64(&mut self, _va: u64, _mode: axp_types::Mode) -> Result<u64, Trap> {
        unreachable!()
    }
    fn write_u8(&mut self, _va: u64, _value: u8, _mode: axp_types::Mode) -> Result<(), Trap> {
        unreachable!()
    }
    fn write_u16(&mut self, _va: u64, _value: u16, _mode: axp_types::Mode) -> Result<(), Trap> {
        unreachable!()
    }
    fn write_u32(&mut self, _va: u64, _value: u32, _mode: axp_types::Mode) -> Result<(), Trap> {
        unreachable!()
    }
    fn write_u64(&mut self, _va: u64, _value: u64, _mode: axp_types::Mode) -> Result<(), Trap> {
        unreachable!()
    }
    fn fetch_u32(&mut self, _va: u64) -> Result<u32, Trap> {
        unreachable!()
    }
    fn translate_physical(
        &mut self,
        _va: u64,
        _access: axp_cpu_core::mem::TranslateAccess,
        _mode: axp_types::Mode,
    ) -> Result<u64, Trap> {
        unreachable!()
    }
}

/// A minimal CALLSYS boot round trip: CALL_PAL enters PAL mode at the
/// function-specific entry, the PAL function table services it, REI
/// returns to guest mode at the saved PC.
#[test]
fn call_pal_callsys_then_rei_restores_guest_mode() {
    let mut core = CoreState::default();
    let mut pal_state = PalState::default();
    core.pc = 0x20_0000;
    core.iprs.pal_base = 0x1000_0000;
    core.int_regs.write(0, 7); // v0 = syscall number

    let mut bus = NoopBus;
    branch::call_pal(function::SYSTEM_CALL, &mut core, &mut bus).unwrap();
    assert!(core.ps.pal_mode);

    let outcome = invoke(function::SYSTEM_CALL, &mut core, &mut pal_state).unwrap();
    assert_eq!(outcome, PalOutcome::SystemCall(7));

    branch::rei(&mut core).unwrap();
    assert_eq!(core.pc, 0x20_0004);
    assert!(!core.ps.pal_mode);
}

#[test]
fn halt_function_requests_halt_outcome() {
    let mut core = CoreState::default();
    let mut pal_state = PalState::default();
    assert_eq!(invoke(function::HALT, &mut core, &mut pal_state).unwrap(), PalOutcome::Halt);
}
