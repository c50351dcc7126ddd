//! Floating-point handlers (spec §4.4). VAX and IEEE formats are carried
//! as opaque 64-bit bit patterns end to end; conversions are always
//! explicit, never via host-implicit float conversion (spec §9 DESIGN
//! NOTES).

use axp_decoder::{FpFunction, FpTrapMode, RoundingMode};

use crate::fp::{ExcSumBuilder, ExceptionClass};
use crate::state::CoreState;
use crate::trap::Trap;

/// The canonical "true" result for IEEE/VAX compares (spec §4.4): a
/// 64-bit pattern with only bit 62 set, chosen so it is neither a valid
/// IEEE NaN encoding's sign bit nor plain integer 1.
pub const COMPARE_TRUE: u64 = 0x4000_0000_0000_0000;
pub const COMPARE_FALSE: u64 = 0;

mod func {
    // IEEE S/T family (opcode 0x16, FLTI), base op selector (function
    // bits 0-5, after rounding/trap decomposition).
    pub const ADDS: u8 = 0x00;
    pub const SUBS: u8 = 0x01;
    pub const MULS: u8 = 0x02;
    pub const DIVS: u8 = 0x03;
    pub const ADDT: u8 = 0x20;
    pub const SUBT: u8 = 0x21;
    pub const MULT: u8 = 0x22;
    pub const DIVT: u8 = 0x23;
    pub const CMPTUN: u8 = 0x24;
    pub const CMPTEQ: u8 = 0x25;
    pub const CMPTLT: u8 = 0x26;
    pub const CMPTLE: u8 = 0x27;
    pub const CVTQS: u8 = 0x3C;
    pub const CVTQT: u8 = 0x3E;
    pub const CVTTQ: u8 = 0x2F;
    pub const CVTST: u8 = 0x30;

    // VAX F/G/D family (opcode 0x15, FLTV).
    pub const ADDF: u8 = 0x00;
    pub const SUBF: u8 = 0x01;
    pub const MULF: u8 = 0x02;
    pub const DIVF: u8 = 0x03;

    // FP-logical family (opcode 0x17, FLTL): raw-bit-pattern ops.
    pub const CPYS: u8 = 0x20;
    pub const CPYSN: u8 = 0x21;
    pub const CPYSE: u8 = 0x22;
    pub const FCMOVEQ: u8 = 0x2A;
    pub const FCMOVNE: u8 = 0x2B;
    pub const FCMOVLT: u8 = 0x2C;
    pub const FCMOVGE: u8 = 0x2D;
    pub const FCMOVLE: u8 = 0x2E;
    pub const FCMOVGT: u8 = 0x2F;
    pub const MT_FPCR: u8 = 0x24;
    pub const MF_FPCR: u8 = 0x25;
}

pub const OPCODE_FLTV: u8 = 0x15;
pub const OPCODE_FLTI: u8 = 0x16;
pub const OPCODE_FLTL: u8 = 0x17;

pub fn fp_operate(
    opcode: u8,
    fa: u8,
    fb: u8,
    function: FpFunction,
    fc: u8,
    core: &mut CoreState,
) -> Result<(), Trap> {
    let a = f64::from_bits(core.fp_regs.read(fa));
    let b = f64::from_bits(core.fp_regs.read(fb));

    let result = match opcode {
        OPCODE_FLTI => ieee(function, a, b, core, fc)?,
        OPCODE_FLTV => vax(function, a, b)?,
        OPCODE_FLTL => {
            fp_logical(function, fa, fb, fc, core)?;
            core.pc = core.pc.wrapping_add(4);
            return Ok(());
        }
        _ => return Err(Trap::IllegalInstruction),
    };

    core.fp_regs.write(fc, result);
    core.pc = core.pc.wrapping_add(4);
    Ok(())
}

fn round(value: f64, mode: RoundingMode, core: &CoreState) -> f64 {
    let effective = if matches!(mode, RoundingMode::PlusInfOrDynamic) {
        core.fpcr.dynamic_rounding()
    } else {
        mode
    };
    match effective {
        RoundingMode::Chopped => value.trunc(),
        RoundingMode::MinusInf => value.floor(),
        RoundingMode::Nearest => value.round_ties_even(),
        RoundingMode::PlusInfOrDynamic => value.ceil(),
    }
}

fn maybe_trap(
    core: &mut CoreState,
    trap_mode: FpTrapMode,
    classes: &[ExceptionClass],
    fc: u8,
    raw_function: u16,
) -> Result<(), Trap> {
    if classes.is_empty() {
        return Ok(());
    }
    let mut builder = ExcSumBuilder::new();
    for &class in classes {
        builder = builder.raise(class);
    }
    core.iprs.exc_sum = builder.with_operand_info(fc, raw_function).build();
    for &class in classes {
        core.fpcr.set_sticky(class as u32);
    }
    core.fpcr.set_summary(true);
    if trap_mode.software_completion() {
        return Err(Trap::InvalidOperation);
    }
    Ok(())
}

fn ieee(function: FpFunction, a: f64, b: f64, core: &mut CoreState, fc: u8) -> Result<u64, Trap> {
    use func::*;
    let raw = function.encode();
    let value = match function.base {
        ADDS | ADDT => round(a + b, function.rounding, core),
        SUBS | SUBT => round(a - b, function.rounding, core),
        MULS | MULT => round(a * b, function.rounding, core),
        DIVS | DIVT => {
            if b == 0.0 {
                maybe_trap(core, function.trap, &[ExceptionClass::DivideByZero], fc, raw as u16)?;
            }
            round(a / b, function.rounding, core)
        }
        CMPTUN => return Ok(if a.is_nan() || b.is_nan() { COMPARE_TRUE } else { COMPARE_FALSE }),
        CMPTEQ => return Ok(if a == b { COMPARE_TRUE } else { COMPARE_FALSE }),
        CMPTLT => return Ok(if a < b { COMPARE_TRUE } else { COMPARE_FALSE }),
        CMPTLE => return Ok(if a <= b { COMPARE_TRUE } else { COMPARE_FALSE }),
        // CVTQS/CVTQT read the integer bit pattern already parked in Fb by
        // the caller (the architecture routes the GPR through Fb for this
        // conversion); the host integer-to-float cast is explicit, not
        // implicit.
        CVTQS | CVTQT => (b.to_bits() as i64 as f64),
        CVTTQ => return Ok(round(a, function.rounding, core).trunc() as i64 as u64),
        CVTST => round(a, function.rounding, core),
        _ => return Err(Trap::IllegalInstruction),
    };
    Ok(value.to_bits())
}

fn vax(function: FpFunction, a: f64, b: f64) -> Result<u64, Trap> {
    use func::*;
    let value = match function.base {
        ADDF => a + b,
        SUBF => a - b,
        MULF => a * b,
        DIVF => {
            if b == 0.0 {
                return Err(Trap::DivideByZero);
            }
            a / b
        }
        _ => return Err(Trap::IllegalInstruction),
    };
    Ok(value.to_bits())
}

/// `fa`/`fb` are the two source operands, `fc` is always the destination
/// (CPYS writes Fc, FCMOV tests Fa and conditionally copies Fb into Fc,
/// MT_FPCR reads Fa, MF_FPCR writes Fc).
fn fp_logical(function: FpFunction, fa: u8, fb: u8, fc: u8, core: &mut CoreState) -> Result<(), Trap> {
    use func::*;
    let a_bits = core.fp_regs.read(fa);
    let b_bits = core.fp_regs.read(fb);
    let sign_a = a_bits & (1 << 63);

    match function.base {
        CPYS => core.fp_regs.write(fc, sign_a | (b_bits & !(1u64 << 63))),
        CPYSN => core.fp_regs.write(fc, (!sign_a & (1 << 63)) | (b_bits & !(1u64 << 63))),
        CPYSE => {
            let exp_mask = 0x7FF0_0000_0000_0000u64;
            core.fp_regs
                .write(fc, sign_a | (a_bits & exp_mask) | (b_bits & !exp_mask & !(1u64 << 63)))
        }
        FCMOVEQ => cmov_fp(core, fb, fc, a_bits == 0),
        FCMOVNE => cmov_fp(core, fb, fc, a_bits != 0),
        FCMOVLT => cmov_fp(core, fb, fc, sign_a != 0 && a_bits != 0),
        FCMOVGE => cmov_fp(core, fb, fc, sign_a == 0),
        FCMOVLE => cmov_fp(core, fb, fc, sign_a != 0 || a_bits == 0),
        FCMOVGT => cmov_fp(core, fb, fc, sign_a == 0 && a_bits != 0),
        MT_FPCR => core.fpcr = crate::state::Fpcr(a_bits),
        MF_FPCR => core.fp_regs.write(fc, core.fpcr.0),
        _ => return Err(Trap::IllegalInstruction),
    }
    Ok(())
}

fn cmov_fp(core: &mut CoreState, from: u8, to: u8, cond: bool) {
    if cond {
        let value = core.fp_regs.read(from);
        core.fp_regs.write(to, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axp_decoder::FpFunction;

    fn fp_func(base: u8) -> FpFunction {
        FpFunction::decode((base as u16) | ((RoundingMode::Nearest.bits() as u16) << 6))
    }

    #[test]
    fn addt_adds_ieee_doubles() {
        let mut core = CoreState::default();
        core.fp_regs.write(1, 2.0f64.to_bits());
        core.fp_regs.write(2, 3.0f64.to_bits());
        fp_operate(OPCODE_FLTI, 1, 2, fp_func(func::ADDT), 3, &mut core).unwrap();
        assert_eq!(f64::from_bits(core.fp_regs.read(3)), 5.0);
    }

    #[test]
    fn cmpteq_produces_canonical_marker() {
        let mut core = CoreState::default();
        core.fp_regs.write(1, 4.0f64.to_bits());
        core.fp_regs.write(2, 4.0f64.to_bits());
        fp_operate(OPCODE_FLTI, 1, 2, fp_func(func::CMPTEQ), 3, &mut core).unwrap();
        assert_eq!(core.fp_regs.read(3), COMPARE_TRUE);
    }

    #[test]
    fn cmptun_marks_nan_operands_unordered() {
        let mut core = CoreState::default();
        core.fp_regs.write(1, f64::NAN.to_bits());
        core.fp_regs.write(2, 4.0f64.to_bits());
        fp_operate(OPCODE_FLTI, 1, 2, fp_func(func::CMPTUN), 3, &mut core).unwrap();
        assert_eq!(core.fp_regs.read(3), COMPARE_TRUE);

        core.fp_regs.write(1, 4.0f64.to_bits());
        fp_operate(OPCODE_FLTI, 1, 2, fp_func(func::CMPTUN), 3, &mut core).unwrap();
        assert_eq!(core.fp_regs.read(3), COMPARE_FALSE);
    }

    #[test]
    fn cpysn_negates_sign_bit_of_fb_into_fc() {
        let mut core = CoreState::default();
        core.fp_regs.write(1, 1.0f64.to_bits()); // Fa sign bit 0
        core.fp_regs.write(2, 5.0f64.to_bits()); // Fb magnitude
        fp_operate(OPCODE_FLTL, 1, 2, fp_func(func::CPYSN), 3, &mut core).unwrap();
        assert!(f64::from_bits(core.fp_regs.read(3)).is_sign_negative());
    }

    #[test]
    fn mt_fpcr_and_mf_fpcr_transfer_full_64_bits() {
        let mut core = CoreState::default();
        core.fp_regs.write(1, 0xFFFF_FFFF_FFFF_FFFF);
        fp_operate(OPCODE_FLTL, 1, 31, fp_func(func::MT_FPCR), 0, &mut core).unwrap();
        assert_eq!(core.fpcr.0, 0xFFFF_FFFF_FFFF_FFFF);
        fp_operate(OPCODE_FLTL, 31, 0, fp_func(func::MF_FPCR), 2, &mut core).unwrap();
        assert_eq!(core.fp_regs.read(2), 0xFFFF_FFFF_FFFF_FFFF);
    }
}
