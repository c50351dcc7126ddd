use std::ops::Range;

use axp_cpu_core::interp::tier0;
use axp_cpu_core::mem::CpuBus;
use axp_cpu_core::state::CoreState;
use axp_cpu_core::trap::Trap;

use crate::backend::JitBackend;

/// A "compiled" block is just the address range it covers; running it
/// means re-fetching and re-dispatching through the tier-0 interpreter,
/// one instruction at a time, exactly as the non-JIT path would.
pub struct InterpretedBlock {
    start_pc: u64,
    end_pc: u64,
}

/// The shipped JIT backend: it compiles nothing and runs the same
/// interpreter every other tier uses. This satisfies the `JitBackend`
/// contract (and the bit-identical-semantics invariant for free, since
/// there is only one semantics) without a native codegen backend, which
/// is out of scope for this core.
#[derive(Default)]
pub struct InterpreterBackend;

impl JitBackend for InterpreterBackend {
    type CompiledBlock = InterpretedBlock;

    fn compile(&self, start_pc: u64, raw_bytes: &[u8]) -> InterpretedBlock {
        let instruction_count = (raw_bytes.len() / 4).max(1) as u64;
        InterpretedBlock {
            start_pc,
            end_pc: start_pc + instruction_count * 4,
        }
    }

    fn invoke(&self, block: &InterpretedBlock, core: &mut CoreState, bus: &mut dyn CpuBus) -> Option<Trap> {
        loop {
            if let Err(trap) = tier0::exec(core, bus) {
                return Some(trap);
            }
            // A taken branch can leave the block's address range before
            // its last instruction; stop rather than stepping bytes
            // that belong to whatever block comes next.
            if core.pc < block.start_pc || core.pc >= block.end_pc {
                return None;
            }
        }
    }

    fn invalidate(&self, _address_range: Range<u64>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use axp_types::Mode;

    struct FlatRam(Vec<u8>);
    impl CpuBus for FlatRam {
        fn read_u8(&mut self, va: u64, _mode: Mode) -> Result<u8, Trap> {
            Ok(self.0[va as usize])
        }
        fn read_u16(&mut self, va: u64, _mode: Mode) -> Result<u16, Trap> {
            Ok(u16::from_le_bytes(self.0[va as usize..va as usize + 2].try_into().unwrap()))
        }
        fn read_u32(&mut self, va: u64, _mode: Mode) -> Result<u32, Trap> {
            Ok(u32::from_le_bytes(self.0[va as usize..va as usize + 4].try_into().unwrap()))
        }
        fn read_u64(&mut self, va: u64, _mode: Mode) -> Result<u64, Trap> {
            Ok(u64::from_le_bytes(self.0[va as usize..va as usize + 8].try_into().unwrap()))
        }
        fn write_u8(&mut self, va: u64, value: u8, _mode: Mode) -> Result<(), Trap> {
            self.0[va as usize] = value;
            Ok(())
        }
        fn write_u16(&mut self, va: u64, value: u16, _mode: Mode) -> Result<(), Trap> {
            self.0[va as usize..va as usize + 2].copy_from_slice(&value.to_le_bytes());
            Ok(())
        }
        fn write_u32(&mut self, va: u64, value: u32, _mode: Mode) -> Result<(), Trap> {
            self.0[va as usize..va as usize + 4].copy_from_slice(&value.to_le_bytes());
            Ok(())
        }
        fn write_u64(&mut self, va: u64, value: u64, _mode: Mode) -> Result<(), Trap> {
            self.0[va as usize..va as usize + 8].copy_from_slice(&value.to_le_bytes());
            Ok(())
        }
        fn fetch_u32(&mut self, va: u64) -> Result<u32, Trap> {
            Ok(u32::from_le_bytes(self.0[va as usize..va as usize + 4].try_into().unwrap()))
        }
        fn translate_physical(
            &mut self,
            va: u64,
            _access: axp_cpu_core::mem::TranslateAccess,
            _mode: Mode,
        ) -> Result<u64, Trap> {
            Ok(va)
        }
    }

    fn addq_word(ra: u32, rb: u32, rc: u32) -> u32 {
        (0x10u32 << 26) | (ra << 21) | (rb << 16) | (0x20 << 5) | rc
    }

    #[test]
    fn invoke_runs_every_instruction_in_the_compiled_range() {
        let mut ram = FlatRam(vec![0; 0x100]);
        // r3 = r1 + r2; r4 = r3 + r2 -- two sequential ADDQs, one block.
        ram.0[0..4].copy_from_slice(&addq_word(1, 2, 3).to_le_bytes());
        ram.0[4..8].copy_from_slice(&addq_word(3, 2, 4).to_le_bytes());

        let mut core = CoreState::new(0);
        core.int_regs.write(1, 10);
        core.int_regs.write(2, 5);

        let backend = InterpreterBackend;
        let block = backend.compile(0, &ram.0[0..8]);
        let trap = backend.invoke(&block, &mut core, &mut ram);

        assert!(trap.is_none());
        assert_eq!(core.int_regs.read(3), 15);
        assert_eq!(core.int_regs.read(4), 20);
        assert_eq!(core.pc, 8);
    }

    #[test]
    fn invoke_stops_early_when_a_branch_leaves_the_block() {
        // BR (unconditional branch) at pc=0 jumps far outside the
        // 2-instruction block compiled below; invoke must not try to
        // re-execute stale bytes past the jump target.
        let mut ram = FlatRam(vec![0; 0x200]);
        let br_disp: i32 = 32; // words, so target = 4 + 32*4 = 132
        let br_word = (0x30u32 << 26) | (0 << 21) | ((br_disp as u32) & 0x1f_ffff);
        ram.0[0..4].copy_from_slice(&br_word.to_le_bytes());

        let mut core = CoreState::new(0);
        let backend = InterpreterBackend;
        let block = backend.compile(0, &ram.0[0..8]);
        let trap = backend.invoke(&block, &mut core, &mut ram);

        assert!(trap.is_none());
        assert_eq!(core.pc, 132);
    }
}
