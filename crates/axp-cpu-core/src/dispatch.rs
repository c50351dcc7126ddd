//! Two-level instruction dispatcher (spec §4.2).
//!
//! The first level routes on the 6-bit primary opcode. Memory, Branch,
//! and PAL formats are fully determined by the opcode alone and go
//! straight to their handler. The four "group" opcodes (Operate:
//! 0x10/0x11/0x12/0x1C, FP-operate: 0x14-0x17) fan out to a second level
//! keyed by the function field, owned by each handler submodule. Rust's
//! `match` compiles these to jump tables, which is the idiomatic
//! rendition of the teacher's function-pointer table for a function-code
//! space this sparse.

use axp_decoder::Decoded;

use crate::handlers::{branch, fp, int, mem};
use crate::mem::CpuBus;
use crate::state::CoreState;
use crate::trap::Trap;

pub fn dispatch(decoded: Decoded, core: &mut CoreState, bus: &mut dyn CpuBus) -> Result<(), Trap> {
    match decoded {
        Decoded::Pal { function } => branch::call_pal(function, core, bus),
        Decoded::Branch { opcode, ra, disp } => branch::branch(opcode, ra, disp, core),
        Decoded::Memory {
            opcode,
            ra,
            rb,
            disp,
            raw16,
        } => match opcode {
            0x18 => mem::fence(raw16, core),
            0x1A => branch::jump(ra, rb, raw16, core),
            0x1E => branch::rei(core),
            _ => mem::memory(opcode, ra, rb, disp, core, bus),
        },
        Decoded::Operate {
            opcode,
            ra,
            operand,
            function,
            rc,
        } => int::operate(opcode, ra, operand, function, rc, core),
        Decoded::FpOperate {
            opcode,
            fa,
            fb,
            function,
            fc,
        } => fp::fp_operate(opcode, fa, fb, function, fc, core),
    }
}
