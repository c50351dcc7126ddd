//! Branch and PAL-entry handlers (spec §4.6).

use crate::mem::CpuBus;
use crate::state::{CoreState, Ps};
use crate::trap::Trap;

const BR: u8 = 0x30;
const BSR: u8 = 0x34;
const BEQ: u8 = 0x39;
const BLT: u8 = 0x3A;
const BLE: u8 = 0x3B;
const BGT: u8 = 0x3F;
const BGE: u8 = 0x3E;
const BLBC: u8 = 0x38;
const BLBS: u8 = 0x3C;
const BNE: u8 = 0x3D;

/// Unconditional/conditional branches. Target = PC+4 +
/// (sign_extend_21(disp) << 2) with 64-bit wraparound; BR/BSR always
/// take the branch and store the return address (PC+4) into Ra.
pub fn branch(opcode: u8, ra: u8, disp: i64, core: &mut CoreState) -> Result<(), Trap> {
    let next_pc = core.pc.wrapping_add(4);
    let target = next_pc.wrapping_add((disp << 2) as u64);
    let ra_value = core.int_regs.read(ra);

    let taken = match opcode {
        BR | BSR => true,
        BEQ => ra_value == 0,
        BNE => ra_value != 0,
        BLT => (ra_value as i64) < 0,
        BLE => (ra_value as i64) <= 0,
        BGT => (ra_value as i64) > 0,
        BGE => (ra_value as i64) >= 0,
        BLBC => ra_value & 1 == 0,
        BLBS => ra_value & 1 == 1,
        _ => return Err(Trap::IllegalInstruction),
    };

    if matches!(opcode, BR | BSR) {
        core.int_regs.write(ra, next_pc);
    }

    core.pc = if taken { target } else { next_pc };
    Ok(())
}

const JMP: u16 = 0b00;
const JSR: u16 = 0b01;
const RET: u16 = 0b10;
const JSR_COROUTINE: u16 = 0b11;

/// JMP/JSR/RET/JSR_COROUTINE (opcode 0x1A): branch to Rb with the low two
/// bits cleared, storing the return address in Ra. The two-bit action
/// selector lives in bits 14-15 of the Memory-format raw16 field (this
/// core's own placement; the architecture reserves the rest of that
/// field). RET is hint-only: functionally identical to JMP here.
pub fn jump(ra: u8, rb: u8, raw16: u16, core: &mut CoreState) -> Result<(), Trap> {
    let action = (raw16 >> 14) & 0b11;
    let target = core.int_regs.read(rb) & !0b11;
    let next_pc = core.pc.wrapping_add(4);

    match action {
        JMP | JSR | RET | JSR_COROUTINE => {
            core.int_regs.write(ra, next_pc);
            core.pc = target;
            Ok(())
        }
        _ => Err(Trap::IllegalInstruction),
    }
}

/// CALL_PAL (opcode 0x00): save PC/PS to the exception IPRs, enter PAL
/// mode, disable interrupts, and transfer control to `PAL_BASE +
/// function * 0x40` (spec §4.6/§4.10; `axp-pal` owns the actual PAL
/// function table this entry point feeds into).
pub fn call_pal(function: u32, core: &mut CoreState, _bus: &mut dyn CpuBus) -> Result<(), Trap> {
    core.iprs.exc_addr = core.pc.wrapping_add(4);
    core.iprs.exc_ps = core.ps.bits();
    core.ps.pal_mode = true;
    core.ps.interrupts_enabled = false;
    core.reservation.clear();
    core.pc = core.iprs.pal_base.wrapping_add((function as u64) * 0x40);
    Ok(())
}

/// REI: inverse of CALL_PAL entry. Restores PC/PS from the exception
/// IPRs, leaves PAL mode, and invalidates the reservation (spec §4.6).
pub fn rei(core: &mut CoreState) -> Result<(), Trap> {
    core.pc = core.iprs.exc_addr;
    core.ps = Ps::from_bits(core.iprs.exc_ps);
    core.reservation.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_target_wraps_at_64_bit_boundary() {
        let mut core = CoreState::default();
        core.pc = 0xFFFF_FFFF_FFFF_FFFC;
        branch(BR, 31, 1, &mut core).unwrap();
        assert_eq!(core.pc, 4);
    }

    #[test]
    fn bsr_stores_return_address_and_always_branches() {
        let mut core = CoreState::default();
        core.pc = 0x1000;
        branch(BSR, 2, 4, &mut core).unwrap();
        assert_eq!(core.int_regs.read(2), 0x1004);
        assert_eq!(core.pc, 0x1004 + (4 << 2));
    }

    #[test]
    fn conditional_branch_not_taken_falls_through() {
        let mut core = CoreState::default();
        core.pc = 0x2000;
        core.int_regs.write(3, 1);
        branch(BEQ, 3, -1, &mut core).unwrap();
        assert_eq!(core.pc, 0x2004);
    }

    struct NoopBus;
    impl CpuBus for NoopBus {
        fn read_u8(&mut self, _va: u64, _mode: axp_types::Mode) -> Result<u8, Trap> {
            unreachable!("call_pal does not touch memory")
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
            _access: crate::mem::TranslateAccess,
            _mode: axp_types::Mode,
        ) -> Result<u64, Trap> {
            unreachable!()
        }
    }

    #[test]
    fn call_pal_then_rei_round_trips_pc_and_ps() {
        let mut core = CoreState::default();
        core.pc = 0x5000;
        core.iprs.pal_base = 0x8000_0000;
        let mut dummy = NoopBus;
        call_pal(0x10, &mut core, &mut dummy).unwrap();
        assert_eq!(core.pc, 0x8000_0000 + 0x10 * 0x40);
        assert!(core.ps.pal_mode);
        assert!(!core.ps.interrupts_enabled);

        rei(&mut core).unwrap();
        assert_eq!(core.pc, 0x5004);
        assert!(!core.ps.pal_mode);
    }
}
