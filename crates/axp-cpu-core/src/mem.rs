//! The CPU-facing memory port: translates virtual addresses through the
//! per-core TLB (walking on miss) before delegating to a physical bus.

use axp_mmu::{walk, AccessKind, MemoryBus, Tlb, TlbEntry};
use axp_types::Mode;

use crate::state::IprBank;
use crate::trap::Trap;

/// Re-exported so implementors of [`CpuBus::translate_physical`] outside
/// this crate don't need their own direct dependency on `axp-mmu` just
/// to name the parameter type.
pub use axp_mmu::AccessKind as TranslateAccess;

/// The interface handlers use to touch memory: virtual-address reads and
/// writes that may trap. Distinct from `axp_mmu::MemoryBus`, which speaks
/// physical addresses only.
pub trait CpuBus {
    fn read_u8(&mut self, va: u64, mode: Mode) -> Result<u8, Trap>;
    fn read_u16(&mut self, va: u64, mode: Mode) -> Result<u16, Trap>;
    fn read_u32(&mut self, va: u64, mode: Mode) -> Result<u32, Trap>;
    fn read_u64(&mut self, va: u64, mode: Mode) -> Result<u64, Trap>;

    fn write_u8(&mut self, va: u64, value: u8, mode: Mode) -> Result<(), Trap>;
    fn write_u16(&mut self, va: u64, value: u16, mode: Mode) -> Result<(), Trap>;
    fn write_u32(&mut self, va: u64, value: u32, mode: Mode) -> Result<(), Trap>;
    fn write_u64(&mut self, va: u64, value: u64, mode: Mode) -> Result<(), Trap>;

    fn fetch_u32(&mut self, va: u64) -> Result<u32, Trap>;

    /// Translates `va` to a physical address without performing an
    /// access of its own. LL/SC reservations are kept physical-address-
    /// keyed (spec §3) so a remote core's store at the same physical
    /// line invalidates them even under a different virtual mapping;
    /// this is how `handlers::mem` gets the PA to key a reservation
    /// with.
    fn translate_physical(&mut self, va: u64, access: TranslateAccess, mode: Mode) -> Result<u64, Trap>;
}

/// Adapts any physical `MemoryBus` implementor into a `CpuBus` by
/// interposing the per-core TLB: a lookup hit goes straight through, a
/// miss drives the page-table walker and installs the result (spec
/// §4.5/§4.7).
pub struct PagingBus<'a, M: MemoryBus> {
    pub phys: &'a mut M,
    pub tlb: &'a mut Tlb,
    pub iprs: &'a mut IprBank,
}

impl<'a, M: MemoryBus> PagingBus<'a, M> {
    pub fn new(phys: &'a mut M, tlb: &'a mut Tlb, iprs: &'a mut IprBank) -> Self {
        Self { phys, tlb, iprs }
    }

    fn translate(&mut self, va: u64, access: AccessKind, mode: Mode) -> Result<u64, Trap> {
        let page_offset = va & (axp_mmu::PAGE_SIZE - 1);
        let vpn = va >> axp_mmu::PAGE_SHIFT;
        let asn = self.iprs.asn;

        if let Some(entry) = self.tlb.lookup(access, vpn, asn) {
            if !Self::permitted(&entry, access, mode) {
                return Err(self.record_fault(va, access));
            }
            return Ok((entry.ppn << axp_mmu::PAGE_SHIFT) | page_offset);
        }

        let pte = walk(self.phys, self.iprs.ptbr, va, access, mode).map_err(|fault| {
            self.iprs.mm_fault_addr = va;
            self.iprs.mm_stat = fault as u8 as u64;
            Trap::from(fault)
        })?;

        self.tlb.insert(
            access,
            TlbEntry {
                vpn,
                ppn: pte.pfn,
                asn,
                protection: pte.protection,
                valid: true,
                global: false,
                dirty: access == AccessKind::Write,
                accessed: true,
            },
        );

        Ok((pte.pfn << axp_mmu::PAGE_SHIFT) | page_offset)
    }

    fn permitted(entry: &TlbEntry, access: AccessKind, mode: Mode) -> bool {
        match access {
            AccessKind::Fetch => entry.protection.executable(mode),
            AccessKind::Read => entry.protection.readable(mode),
            AccessKind::Write => entry.protection.writable(mode),
        }
    }

    fn record_fault(&mut self, va: u64, access: AccessKind) -> Trap {
        self.iprs.mm_fault_addr = va;
        match access {
            AccessKind::Fetch => Trap::FaultOnExecute,
            AccessKind::Read => Trap::FaultOnRead,
            AccessKind::Write => Trap::FaultOnWrite,
        }
    }
}

impl<'a, M: MemoryBus> PagingBus<'a, M> {
    /// Checks whether the access just performed against `self.phys`
    /// tripped a device-layer fault (spec §4.11/§7) and, if so, converts
    /// it to the `Trap` the dispatcher surfaces instead of the value the
    /// physical bus returned (which for an unmapped/bad-width MMIO access
    /// is meaningless).
    fn check_bus_fault(&mut self) -> Result<(), Trap> {
        match self.phys.take_bus_fault() {
            Some(fault) => Err(Trap::from(fault)),
            None => Ok(()),
        }
    }
}

impl<'a, M: MemoryBus> CpuBus for PagingBus<'a, M> {
    fn read_u8(&mut self, va: u64, mode: Mode) -> Result<u8, Trap> {
        let pa = self.translate(va, AccessKind::Read, mode)?;
        let value = self.phys.read_u8(pa);
        self.check_bus_fault()?;
        Ok(value)
    }

    fn read_u16(&mut self, va: u64, mode: Mode) -> Result<u16, Trap> {
        if va & 1 != 0 {
            return Err(Trap::Alignment);
        }
        let pa = self.translate(va, AccessKind::Read, mode)?;
        let value = self.phys.read_u16(pa);
        self.check_bus_fault()?;
        Ok(value)
    }

    fn read_u32(&mut self, va: u64, mode: Mode) -> Result<u32, Trap> {
        if va & 3 != 0 {
            return Err(Trap::Alignment);
        }
        let pa = self.translate(va, AccessKind::Read, mode)?;
        let value = self.phys.read_u32(pa);
        self.check_bus_fault()?;
        Ok(value)
    }

    fn read_u64(&mut self, va: u64, mode: Mode) -> Result<u64, Trap> {
        if va & 7 != 0 {
            return Err(Trap::Alignment);
        }
        let pa = self.translate(va, AccessKind::Read, mode)?;
        let value = self.phys.read_u64(pa);
        self.check_bus_fault()?;
        Ok(value)
    }

    fn write_u8(&mut self, va: u64, value: u8, mode: Mode) -> Result<(), Trap> {
        let pa = self.translate(va, AccessKind::Write, mode)?;
        self.phys.write_u8(pa, value);
        self.check_bus_fault()
    }

    fn write_u16(&mut self, va: u64, value: u16, mode: Mode) -> Result<(), Trap> {
        if va & 1 != 0 {
            return Err(Trap::Alignment);
        }
        let pa = self.translate(va, AccessKind::Write, mode)?;
        self.phys.write_u16(pa, value);
        self.check_bus_fault()
    }

    fn write_u32(&mut self, va: u64, value: u32, mode: Mode) -> Result<(), Trap> {
        if va & 3 != 0 {
            return Err(Trap::Alignment);
        }
        let pa = self.translate(va, AccessKind::Write, mode)?;
        self.phys.write_u32(pa, value);
        self.check_bus_fault()
    }

    fn write_u64(&mut self, va: u64, value: u64, mode: Mode) -> Result<(), Trap> {
        if va & 7 != 0 {
            return Err(Trap::Alignment);
        }
        let pa = self.translate(va, AccessKind::Write, mode)?;
        self.phys.write_u64(pa, value);
        self.check_bus_fault()
    }

    fn fetch_u32(&mut self, va: u64) -> Result<u32, Trap> {
        if va & 3 != 0 {
            return Err(Trap::Alignment);
        }
        let pa = self.translate(va, AccessKind::Fetch, Mode::Kernel)?;
        let value = self.phys.read_u32(pa);
        self.check_bus_fault()?;
        Ok(value)
    }

    fn translate_physical(&mut self, va: u64, access: AccessKind, mode: Mode) -> Result<u64, Trap> {
        self.translate(va, access, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axp_mmu::{PageTableEntry, PAGE_SIZE};
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
        (va >> (13 + 10 * level)) & 0x3FF
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
        ram.write_u64(l1 + level_index(va, 2) * 8, link(l2 >> 13).encode());
        ram.write_u64(l2 + level_index(va, 1) * 8, link(l3 >> 13).encode());
        let leaf = PageTableEntry {
            valid: true,
            pfn,
            protection: Protection::all_rwx(),
        };
        ram.write_u64(l3 + level_index(va, 0) * 8, leaf.encode());
    }

    #[test]
    fn read_through_paging_bus_walks_then_reuses_tlb() {
        let mut ram = FlatRam(vec![0; 0x20_0000]);
        let ptbr = 0x1000u64;
        let va = 0x40_0010u64;
        install_identity_mapping(&mut ram, ptbr, va & !(PAGE_SIZE - 1), 0x10);
        ram.write_u32(0x10 * PAGE_SIZE + (va & (PAGE_SIZE - 1)), 0xCAFEBABE);

        let mut tlb = Tlb::new(8);
        let mut iprs = IprBank {
            ptbr,
            ..IprBank::default()
        };
        let mut bus = PagingBus::new(&mut ram, &mut tlb, &mut iprs);
        assert_eq!(bus.read_u32(va, Mode::Kernel).unwrap(), 0xCAFEBABE);
        // Second read must hit the TLB, not re-walk (would panic on stray
        // writes otherwise; correctness here is exercised in axp-mmu).
        assert_eq!(bus.read_u32(va, Mode::Kernel).unwrap(), 0xCAFEBABE);
    }

    #[test]
    fn misaligned_quad_access_traps() {
        let mut ram = FlatRam(vec![0; 0x20_0000]);
        let mut tlb = Tlb::new(8);
        let mut iprs = IprBank::default();
        let mut bus = PagingBus::new(&mut ram, &mut tlb, &mut iprs);
        assert_eq!(bus.read_u64(0x1001, Mode::Kernel), Err(Trap::Alignment));
    }

    /// Two different virtual addresses mapped to the same physical frame
    /// must translate to the same PA -- this is what lets
    /// `handlers::mem` key an LL/SC reservation physically instead of
    /// virtually (a remote store through either VA has to be able to
    /// invalidate a reservation taken through the other one).
    #[test]
    fn aliased_virtual_addresses_translate_to_the_same_physical_address() {
        let mut ram = FlatRam(vec![0; 0x30_0000]);
        let ptbr = 0x1000u64;
        let va_a = 0x40_0010u64;
        // Differs from va_a in the top-level (level-2) page-table index so
        // the two mappings don't clobber each other's interior nodes.
        let va_b = va_a + (1u64 << 33);
        install_identity_mapping(&mut ram, ptbr, va_a & !(PAGE_SIZE - 1), 0x20);
        install_identity_mapping(&mut ram, ptbr, va_b & !(PAGE_SIZE - 1), 0x20);

        let mut tlb = Tlb::new(8);
        let mut iprs = IprBank {
            ptbr,
            ..IprBank::default()
        };
        let mut bus = PagingBus::new(&mut ram, &mut tlb, &mut iprs);
        let pa_a = bus.translate_physical(va_a, AccessKind::Read, Mode::Kernel).unwrap();
        let pa_b = bus.translate_physical(va_b, AccessKind::Write, Mode::Kernel).unwrap();
        assert_eq!(pa_a, pa_b);
    }
}
