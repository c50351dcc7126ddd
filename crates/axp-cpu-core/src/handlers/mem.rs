//! Memory handlers (spec §4.5). Effective address is Ra plus the
//! sign-extended 16-bit displacement; Rb carries the transferred value
//! (loaded into Rb, or the source of a store), matching the field
//! layout the decoder exposes for the Memory format.

use axp_types::Mode;

use crate::mem::{CpuBus, TranslateAccess};
use crate::state::CoreState;
use crate::trap::Trap;

const LDA: u8 = 0x08;
const LDAH: u8 = 0x09;
const LDBU: u8 = 0x0A;
const LDQ_U: u8 = 0x0B;
const LDWU: u8 = 0x0C;
const STW: u8 = 0x0D;
const STB: u8 = 0x0E;
const STQ_U: u8 = 0x0F;
const LDL: u8 = 0x28;
const LDQ: u8 = 0x29;
const LDL_L: u8 = 0x2A;
const LDQ_L: u8 = 0x2B;
const STL: u8 = 0x2C;
const STQ: u8 = 0x2D;
const STL_C: u8 = 0x2E;
const STQ_C: u8 = 0x2F;

const FENCE_MB: u16 = 0x4000;
const FENCE_WMB: u16 = 0x4400;
const FENCE_TRAPB: u16 = 0x0000;
const FENCE_EXCB: u16 = 0x0400;

pub fn memory(
    opcode: u8,
    ra: u8,
    rb: u8,
    disp: i64,
    core: &mut CoreState,
    bus: &mut dyn CpuBus,
) -> Result<(), Trap> {
    let ea = core.int_regs.read(ra).wrapping_add(disp as u64);
    let mode = core.ps.mode;

    match opcode {
        LDA => {
            core.int_regs.write(rb, ea);
        }
        LDAH => {
            core.int_regs.write(rb, core.int_regs.read(ra).wrapping_add((disp << 16) as u64));
        }
        LDBU => {
            let v = bus.read_u8(ea, mode)?;
            core.int_regs.write(rb, v as u64);
        }
        LDWU => {
            let v = bus.read_u16(ea, mode)?;
            core.int_regs.write(rb, v as u64);
        }
        LDQ_U => {
            let aligned = ea & !0x7;
            let v = bus.read_u64(aligned, mode)?;
            core.int_regs.write(rb, v);
        }
        STB => {
            let pa = bus.translate_physical(ea, TranslateAccess::Write, mode)?;
            bus.write_u8(ea, core.int_regs.read(rb) as u8, mode)?;
            core.reservation.observe_write(pa, 1);
        }
        STW => {
            let pa = bus.translate_physical(ea, TranslateAccess::Write, mode)?;
            bus.write_u16(ea, core.int_regs.read(rb) as u16, mode)?;
            core.reservation.observe_write(pa, 2);
        }
        STQ_U => {
            let aligned = ea & !0x7;
            let pa = bus.translate_physical(aligned, TranslateAccess::Write, mode)?;
            bus.write_u64(aligned, core.int_regs.read(rb), mode)?;
            core.reservation.observe_write(pa, 8);
        }
        LDL => {
            let v = bus.read_u32(ea, mode)?;
            core.int_regs.write(rb, v as i32 as i64 as u64);
        }
        LDQ => {
            let v = bus.read_u64(ea, mode)?;
            core.int_regs.write(rb, v);
        }
        LDL_L => {
            let pa = bus.translate_physical(ea, TranslateAccess::Read, mode)?;
            let v = bus.read_u32(ea, mode)?;
            core.int_regs.write(rb, v as i32 as i64 as u64);
            core.reservation.set(pa, 4);
        }
        LDQ_L => {
            let pa = bus.translate_physical(ea, TranslateAccess::Read, mode)?;
            let v = bus.read_u64(ea, mode)?;
            core.int_regs.write(rb, v);
            core.reservation.set(pa, 8);
        }
        STL => {
            let pa = bus.translate_physical(ea, TranslateAccess::Write, mode)?;
            bus.write_u32(ea, core.int_regs.read(rb) as u32, mode)?;
            core.reservation.observe_write(pa, 4);
        }
        STQ => {
            let pa = bus.translate_physical(ea, TranslateAccess::Write, mode)?;
            bus.write_u64(ea, core.int_regs.read(rb), mode)?;
            core.reservation.observe_write(pa, 8);
        }
        STL_C => {
            // The address has to be translated (and any fault on it
            // raised) before the reservation is even consulted --
            // `covers` is a physical-address comparison now, so there
            // is no way to check it without already knowing the PA.
            let pa = bus.translate_physical(ea, TranslateAccess::Write, mode)?;
            let success = core.reservation.covers(pa);
            if success {
                bus.write_u32(ea, core.int_regs.read(rb) as u32, mode)?;
            }
            core.reservation.clear();
            core.int_regs.write(rb, success as u64);
        }
        STQ_C => {
            let pa = bus.translate_physical(ea, TranslateAccess::Write, mode)?;
            let success = core.reservation.covers(pa);
            if success {
                bus.write_u64(ea, core.int_regs.read(rb), mode)?;
            }
            core.reservation.clear();
            core.int_regs.write(rb, success as u64);
        }
        _ => return Err(Trap::IllegalInstruction),
    }

    core.pc = core.pc.wrapping_add(4);
    Ok(())
}

/// MB/WMB/TRAPB/EXCB (opcode 0x18, MISC group). This core has no
/// reordering within a single instruction stream to drain, so these are
/// ordering points for the dispatcher/coherency layers above rather than
/// operations with local effect; the handler itself only validates the
/// function selector and advances PC.
pub fn fence(raw16: u16, core: &mut CoreState) -> Result<(), Trap> {
    match raw16 {
        FENCE_MB | FENCE_WMB | FENCE_TRAPB | FENCE_EXCB => {
            core.pc = core.pc.wrapping_add(4);
            Ok(())
        }
        _ => Err(Trap::IllegalInstruction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axp_mmu::MemoryBus as PhysBus;

    struct FlatRam(Vec<u8>);
    impl PhysBus for FlatRam {
        fn read_u8(&mut self, p: u64) -> u8 {
            self.0[p as usize]
        }
        fn read_u16(&mut self, p: u64) -> u16 {
            u16::from_le_bytes(self.0[p as usize..p as usize + 2].try_into().unwrap())
        }
        fn read_u32(&mut self, p: u64) -> u32 {
            u32::from_le_bytes(self.0[p as usize..p as usize + 4].try_into().unwrap())
        }
        fn read_u64(&mut self, p: u64) -> u64 {
            u64::from_le_bytes(self.0[p as usize..p as usize + 8].try_into().unwrap())
        }
        fn write_u8(&mut self, p: u64, v: u8) {
            self.0[p as usize] = v;
        }
        fn write_u16(&mut self, p: u64, v: u16) {
            self.0[p as usize..p as usize + 2].copy_from_slice(&v.to_le_bytes());
        }
        fn write_u32(&mut self, p: u64, v: u32) {
            self.0[p as usize..p as usize + 4].copy_from_slice(&v.to_le_bytes());
        }
        fn write_u64(&mut self, p: u64, v: u64) {
            self.0[p as usize..p as usize + 8].copy_from_slice(&v.to_le_bytes());
        }
    }

    /// An identity-mapped `CpuBus` for handler tests that don't need to
    /// exercise TLB/walker behavior (that's `axp-mmu`'s and `mem.rs`'s
    /// own test responsibility).
    struct IdentityBus(FlatRam);

    impl CpuBus for IdentityBus {
        fn read_u8(&mut self, va: u64, _mode: Mode) -> Result<u8, Trap> {
            Ok(self.0.read_u8(va))
        }
        fn read_u16(&mut self, va: u64, _mode: Mode) -> Result<u16, Trap> {
            Ok(self.0.read_u16(va))
        }
        fn read_u32(&mut self, va: u64, _mode: Mode) -> Result<u32, Trap> {
            Ok(self.0.read_u32(va))
        }
        fn read_u64(&mut self, va: u64, _mode: Mode) -> Result<u64, Trap> {
            Ok(self.0.read_u64(va))
        }
        fn write_u8(&mut self, va: u64, value: u8, _mode: Mode) -> Result<(), Trap> {
            self.0.write_u8(va, value);
            Ok(())
        }
        fn write_u16(&mut self, va: u64, value: u16, _mode: Mode) -> Result<(), Trap> {
            self.0.write_u16(va, value);
            Ok(())
        }
        fn write_u32(&mut self, va: u64, value: u32, _mode: Mode) -> Result<(), Trap> {
            self.0.write_u32(va, value);
            Ok(())
        }
        fn write_u64(&mut self, va: u64, value: u64, _mode: Mode) -> Result<(), Trap> {
            self.0.write_u64(va, value);
            Ok(())
        }
        fn fetch_u32(&mut self, va: u64) -> Result<u32, Trap> {
            Ok(self.0.read_u32(va))
        }
        fn translate_physical(&mut self, va: u64, _access: TranslateAccess, _mode: Mode) -> Result<u64, Trap> {
            Ok(va)
        }
    }

    #[test]
    fn ldq_u_masks_low_three_bits() {
        let mut bus = IdentityBus(FlatRam(vec![0; 0x1000]));
        bus.0.write_u64(0x100, 0x1122_3344_5566_7788);
        let mut core = CoreState::default();
        core.int_regs.write(1, 0x103); // ra = base, unaligned by 3
        memory(LDQ_U, 1, 2, 0, &mut core, &mut bus).unwrap();
        assert_eq!(core.int_regs.read(2), 0x1122_3344_5566_7788);
    }

    #[test]
    fn stq_c_succeeds_only_if_reservation_still_covers_address() {
        let mut bus = IdentityBus(FlatRam(vec![0; 0x1000]));
        let mut core = CoreState::default();
        core.int_regs.write(1, 0x200);
        memory(LDQ_L, 1, 2, 0, &mut core, &mut bus).unwrap();
        assert!(core.reservation.valid);

        core.int_regs.write(3, 0xABCD);
        memory(STQ_C, 1, 3, 0, &mut core, &mut bus).unwrap();
        assert_eq!(core.int_regs.read(3), 1);
        assert!(!core.reservation.valid);
        assert_eq!(bus.0.read_u64(0x200), 0xABCD);
    }

    #[test]
    fn stq_c_fails_and_leaves_memory_unchanged_after_invalidation() {
        let mut bus = IdentityBus(FlatRam(vec![0; 0x1000]));
        let mut core = CoreState::default();
        core.int_regs.write(1, 0x200);
        memory(LDQ_L, 1, 2, 0, &mut core, &mut bus).unwrap();
        core.reservation.observe_write(0x200, 8);

        core.int_regs.write(3, 0xABCD);
        memory(STQ_C, 1, 3, 0, &mut core, &mut bus).unwrap();
        assert_eq!(core.int_regs.read(3), 0);
        assert_eq!(bus.0.read_u64(0x200), 0);
    }
}
