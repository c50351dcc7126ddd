use axp_cpu_core::{CoreState, PagingBus};
use axp_mmu::{MemoryBus, PageTableEntry, Tlb, PAGE_SHIFT, PAGE_SIZE};
use axp_types::Protection;

struct FlatRam(Vec<u8>);
impl MemoryBus for FlatRam {
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

fn level_index(va: u64, level: u32) -> u64 {
    (va >> (PAGE_SHIFT + 10 * level)) & 0x3FF
}

fn install_identity_mapping(ram: &mut FlatRam, ptbr: u64, va: u64, pfn: u64) {
    let l1 = ptbr;
    let l2 = ptbr + PAGE_SIZE;
    let l3 = ptbr + 2 * PAGE_SIZE;
    let link = |next_pfn: u64| PageTableEntry {
        valid: true,
        pfn: next_pfn,
        protection: Protection::all_rwx(),
    };
    ram.write_u64(l1 + level_index(va, 2) * 8, link(l2 >> PAGE_SHIFT).encode());
    ram.write_u64(l2 + level_index(va, 1) * 8, link(l3 >> PAGE_SHIFT).encode());
    let leaf = PageTableEntry {
        valid: true,
        pfn,
        protection: Protection::all_rwx(),
    };
    ram.write_u64(l3 + level_index(va, 0) * 8, leaf.encode());
}

/// An LDQ through a mapped page must walk once, then serve the fetch of
/// the next instruction (the page-table pages themselves, plus code and
/// data, all live behind the same TLB) via a fresh lookup — exercising
/// the full tier-0 -> CpuBus -> TLB -> walker chain end to end.
#[test]
fn ldq_translates_through_mapped_page_and_loads_value() {
    let ptbr = 0x1000u64;
    let code_va = 0x40_0000u64;
    let data_va = 0x40_1000u64;

    let mut ram = FlatRam(vec![0; 0x30_0000]);
    install_identity_mapping(&mut ram, ptbr, code_va, 0x40);
    install_identity_mapping(&mut ram, ptbr, data_va, 0x41);

    // LDQ Ra=1(base)+0 -> Rb=2: opcode 0x29, ra=1, rb=2, disp=0
    let word = (0x29u32 << 26) | (1 << 21) | (2 << 16) | 0;
    let code_pa = 0x40 * PAGE_SIZE;
    ram.write_u32(code_pa, word);

    let data_pa = 0x41 * PAGE_SIZE;
    ram.write_u64(data_pa, 0x1234_5678_9ABC_DEF0);

    let mut core = CoreState::new(code_va);
    core.int_regs.write(1, data_va);
    core.iprs.ptbr = ptbr;

    let mut tlb = Tlb::new(8);
    let mut iprs = core.iprs;
    {
        let mut bus = PagingBus::new(&mut ram, &mut tlb, &mut iprs);
        axp_cpu_core::interp::tier0::exec(&mut core, &mut bus).unwrap();
    }
    core.iprs = iprs;

    assert_eq!(core.int_regs.read(2), 0x1234_5678_9ABC_DEF0);
    assert_eq!(core.pc, code_va + 4);
}
