use axp_types::Protection;

use crate::bus::MemoryBus;
use crate::tlb::AccessKind;

/// 8 KiB pages, three page-table levels of 10 bits each (1024 8-byte PTEs
/// per level-table page), matching Alpha's real page-table geometry.
pub const PAGE_SIZE: u64 = 8192;
pub const PAGE_SHIFT: u32 = 13;
const LEVEL_BITS: u32 = 10;
const LEVEL_MASK: u64 = (1 << LEVEL_BITS) - 1;
const PTE_SIZE: u64 = 8;

/// One page-table-entry's decoded fields. The bit layout is this core's
/// own (the spec does not pin an exact PTE encoding), but is internally
/// consistent end to end between the walker and whatever constructs page
/// tables in RAM.
#[derive(Clone, Copy, Debug)]
pub struct PageTableEntry {
    pub valid: bool,
    pub pfn: u64,
    pub protection: Protection,
}

impl PageTableEntry {
    const VALID_BIT: u64 = 1 << 0;
    const KRE: u64 = 1 << 1;
    const KWE: u64 = 1 << 2;
    const KXE: u64 = 1 << 3;
    const URE: u64 = 1 << 4;
    const UWE: u64 = 1 << 5;
    const UXE: u64 = 1 << 6;
    const PFN_SHIFT: u32 = 13;

    pub fn decode(raw: u64) -> Self {
        Self {
            valid: raw & Self::VALID_BIT != 0,
            pfn: raw >> Self::PFN_SHIFT,
            protection: Protection {
                kernel_read: raw & Self::KRE != 0,
                kernel_write: raw & Self::KWE != 0,
                kernel_execute: raw & Self::KXE != 0,
                user_read: raw & Self::URE != 0,
                user_write: raw & Self::UWE != 0,
                user_execute: raw & Self::UXE != 0,
            },
        }
    }

    pub fn encode(self) -> u64 {
        let mut raw = (self.pfn) << Self::PFN_SHIFT;
        if self.valid {
            raw |= Self::VALID_BIT;
        }
        let p = self.protection;
        if p.kernel_read {
            raw |= Self::KRE;
        }
        if p.kernel_write {
            raw |= Self::KWE;
        }
        if p.kernel_execute {
            raw |= Self::KXE;
        }
        if p.user_read {
            raw |= Self::URE;
        }
        if p.user_write {
            raw |= Self::UWE;
        }
        if p.user_execute {
            raw |= Self::UXE;
        }
        raw
    }
}

/// The reasons a walk can fail to produce a usable translation (spec
/// §4.7). `axp-cpu-core` maps each of these onto the corresponding
/// architectural trap and populates MM_STAT/MM_FAULT_ADDR/EXC_SUM.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
    TranslationNotValid,
    AccessViolation,
    FaultOnRead,
    FaultOnWrite,
    FaultOnExecute,
    Alignment,
}

fn level_index(va: u64, level: u32) -> u64 {
    (va >> (PAGE_SHIFT + LEVEL_BITS * level)) & LEVEL_MASK
}

/// Walk the three-level page table rooted at `ptbr` for `va`, checking
/// `access`/`mode` against the leaf PTE's protection bits. On success
/// returns the leaf `PageTableEntry` (the caller combines its PFN with the
/// page offset and installs a TLB entry); on failure returns the
/// specific `Fault`.
pub fn walk(
    bus: &mut impl MemoryBus,
    ptbr: u64,
    va: u64,
    access: AccessKind,
    mode: axp_types::Mode,
) -> Result<PageTableEntry, Fault> {
    let mut table_base = ptbr;
    let mut pte = PageTableEntry {
        valid: false,
        pfn: 0,
        protection: Protection::default(),
    };
    for level in (0..3).rev() {
        let index = level_index(va, level);
        let entry_addr = table_base + index * PTE_SIZE;
        let raw = bus.read_u64(entry_addr);
        pte = PageTableEntry::decode(raw);
        if !pte.valid {
            return Err(Fault::TranslationNotValid);
        }
        if level == 0 {
            break;
        }
        table_base = pte.pfn << PAGE_SHIFT;
    }

    let allowed = match access {
        AccessKind::Fetch => pte.protection.executable(mode),
        AccessKind::Read => pte.protection.readable(mode),
        AccessKind::Write => pte.protection.writable(mode),
    };
    if !allowed {
        return Err(match access {
            AccessKind::Fetch => Fault::FaultOnExecute,
            AccessKind::Read => Fault::FaultOnRead,
            AccessKind::Write => Fault::FaultOnWrite,
        });
    }

    Ok(pte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

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

    fn install_identity_mapping(ram: &mut FlatRam, ptbr: u64, va: u64, pfn: u64, prot: Protection) {
        let l1 = ptbr;
        let l2 = ptbr + PAGE_SIZE;
        let l3 = ptbr + 2 * PAGE_SIZE;
        let pte = |next_pfn: u64| PageTableEntry {
            valid: true,
            pfn: next_pfn,
            protection: Protection::kernel_rwx(),
        };
        ram.write_u64(l1 + level_index(va, 2) * PTE_SIZE, pte(l2 >> PAGE_SHIFT).encode());
        ram.write_u64(l2 + level_index(va, 1) * PTE_SIZE, pte(l3 >> PAGE_SHIFT).encode());
        let leaf = PageTableEntry {
            valid: true,
            pfn,
            protection: prot,
        };
        ram.write_u64(l3 + level_index(va, 0) * PTE_SIZE, leaf.encode());
    }

    #[test]
    fn walk_resolves_identity_mapping() {
        let mut ram = FlatRam(vec![0; 0x10_0000]);
        let ptbr = 0x1000u64;
        let va = 0x40_0000u64;
        install_identity_mapping(&mut ram, ptbr, va, 0x77, Protection::all_rwx());

        let pte = walk(&mut ram, ptbr, va, AccessKind::Read, axp_types::Mode::Kernel).unwrap();
        assert_eq!(pte.pfn, 0x77);
    }

    #[test]
    fn walk_reports_translation_not_valid_for_unmapped_va() {
        let mut ram = FlatRam(vec![0; 0x10_0000]);
        let err = walk(&mut ram, 0x1000, 0x80_0000, AccessKind::Read, axp_types::Mode::Kernel)
            .unwrap_err();
        assert_eq!(err, Fault::TranslationNotValid);
    }

    #[test]
    fn walk_reports_protection_fault_for_user_write_to_kernel_only_page() {
        let mut ram = FlatRam(vec![0; 0x10_0000]);
        let ptbr = 0x1000u64;
        let va = 0x40_0000u64;
        install_identity_mapping(&mut ram, ptbr, va, 0x77, Protection::kernel_rwx());

        let err = walk(&mut ram, ptbr, va, AccessKind::Write, axp_types::Mode::User).unwrap_err();
        assert_eq!(err, Fault::FaultOnWrite);
    }
}
