use std::io::{Read, Write};

use axp_cpu_core::state::{CoreState, Fpcr, IprBank, IntRegisters, Ps, Reservation};
use axp_mmu::tlb::{Tlb, TlbEntry};
use axp_types::Protection;

use crate::error::{Result, SnapshotError};
use crate::ids::DeviceId;

fn write_u8(w: &mut impl Write, v: u8) -> Result<()> {
    w.write_all(&[v]).map_err(Into::into)
}

fn write_u32(w: &mut impl Write, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes()).map_err(Into::into)
}

fn write_u64(w: &mut impl Write, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes()).map_err(Into::into)
}

fn read_u8(r: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Snapshot-wide metadata, one copy per file (spec.md §6 `save_state`).
#[derive(Clone, Debug, Default)]
pub struct SnapshotMeta {
    pub snapshot_id: u64,
    pub created_unix_ms: u64,
    pub label: Option<String>,
    pub cpu_count: u32,
    pub ram_bytes: u64,
    pub pal_base: u64,
}

impl SnapshotMeta {
    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        write_u64(w, self.snapshot_id)?;
        write_u64(w, self.created_unix_ms)?;
        match &self.label {
            Some(label) => {
                let bytes = label.as_bytes();
                write_u32(w, bytes.len() as u32)?;
                w.write_all(bytes)?;
            }
            None => write_u32(w, u32::MAX)?,
        }
        write_u32(w, self.cpu_count)?;
        write_u64(w, self.ram_bytes)?;
        write_u64(w, self.pal_base)?;
        Ok(())
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        let snapshot_id = read_u64(r)?;
        let created_unix_ms = read_u64(r)?;
        let label_len = read_u32(r)?;
        let label = if label_len == u32::MAX {
            None
        } else {
            let mut bytes = vec![0u8; label_len as usize];
            r.read_exact(&mut bytes)?;
            Some(String::from_utf8(bytes).map_err(|_| SnapshotError::Corrupt("non-utf8 snapshot label"))?)
        };
        let cpu_count = read_u32(r)?;
        let ram_bytes = read_u64(r)?;
        let pal_base = read_u64(r)?;
        Ok(Self {
            snapshot_id,
            created_unix_ms,
            label,
            cpu_count,
            ram_bytes,
            pal_base,
        })
    }
}

/// One core's architectural register state (spec §3 "Core context"),
/// detached from `CoreState` so the on-disk layout doesn't have to track
/// every in-memory field renaming.
#[derive(Clone, Debug, Default)]
pub struct CpuState {
    pub int_regs: [u64; 32],
    pub fp_regs: [u64; 32],
    pub pc: u64,
    pub ps_bits: u64,
    pub fpcr: u64,
    pub reservation_address: u64,
    pub reservation_size: u8,
    pub reservation_valid: bool,
    pub mm_stat: u64,
    pub mm_fault_addr: u64,
    pub exc_sum: u64,
    pub ptbr: u64,
    pub asn: u32,
    pub pal_base: u64,
    pub exc_addr: u64,
    pub exc_ps: u64,
}

impl From<&CoreState> for CpuState {
    fn from(core: &CoreState) -> Self {
        let mut int_regs = [0u64; 32];
        let mut fp_regs = [0u64; 32];
        for i in 0..32u8 {
            int_regs[i as usize] = core.int_regs.read(i);
            fp_regs[i as usize] = core.fp_regs.read(i);
        }
        Self {
            int_regs,
            fp_regs,
            pc: core.pc,
            ps_bits: core.ps.bits(),
            fpcr: core.fpcr.0,
            reservation_address: core.reservation.address,
            reservation_size: core.reservation.size,
            reservation_valid: core.reservation.valid,
            mm_stat: core.iprs.mm_stat,
            mm_fault_addr: core.iprs.mm_fault_addr,
            exc_sum: core.iprs.exc_sum,
            ptbr: core.iprs.ptbr,
            asn: core.iprs.asn,
            pal_base: core.iprs.pal_base,
            exc_addr: core.iprs.exc_addr,
            exc_ps: core.iprs.exc_ps,
        }
    }
}

impl CpuState {
    /// Rebuilds a full `CoreState` from this snapshot.
    pub fn to_core_state(&self) -> CoreState {
        let mut int_regs = IntRegisters::default();
        let mut fp_regs = axp_cpu_core::state::FpRegisters::default();
        for i in 0..32u8 {
            int_regs.write(i, self.int_regs[i as usize]);
            fp_regs.write(i, self.fp_regs[i as usize]);
        }
        CoreState {
            int_regs,
            fp_regs,
            pc: self.pc,
            ps: Ps::from_bits(self.ps_bits),
            fpcr: Fpcr(self.fpcr),
            reservation: Reservation {
                address: self.reservation_address,
                size: self.reservation_size,
                valid: self.reservation_valid,
            },
            iprs: IprBank {
                mm_stat: self.mm_stat,
                mm_fault_addr: self.mm_fault_addr,
                exc_sum: self.exc_sum,
                ptbr: self.ptbr,
                asn: self.asn,
                pal_base: self.pal_base,
                exc_addr: self.exc_addr,
                exc_ps: self.exc_ps,
            },
        }
    }

    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        for v in self.int_regs {
            write_u64(w, v)?;
        }
        for v in self.fp_regs {
            write_u64(w, v)?;
        }
        write_u64(w, self.pc)?;
        write_u64(w, self.ps_bits)?;
        write_u64(w, self.fpcr)?;
        write_u64(w, self.reservation_address)?;
        write_u8(w, self.reservation_size)?;
        write_u8(w, self.reservation_valid as u8)?;
        write_u64(w, self.mm_stat)?;
        write_u64(w, self.mm_fault_addr)?;
        write_u64(w, self.exc_sum)?;
        write_u64(w, self.ptbr)?;
        write_u32(w, self.asn)?;
        write_u64(w, self.pal_base)?;
        write_u64(w, self.exc_addr)?;
        write_u64(w, self.exc_ps)?;
        Ok(())
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        let mut int_regs = [0u64; 32];
        for slot in &mut int_regs {
            *slot = read_u64(r)?;
        }
        let mut fp_regs = [0u64; 32];
        for slot in &mut fp_regs {
            *slot = read_u64(r)?;
        }
        Ok(Self {
            int_regs,
            fp_regs,
            pc: read_u64(r)?,
            ps_bits: read_u64(r)?,
            fpcr: read_u64(r)?,
            reservation_address: read_u64(r)?,
            reservation_size: read_u8(r)?,
            reservation_valid: read_u8(r)? != 0,
            mm_stat: read_u64(r)?,
            mm_fault_addr: read_u64(r)?,
            exc_sum: read_u64(r)?,
            ptbr: read_u64(r)?,
            asn: read_u32(r)?,
            pal_base: read_u64(r)?,
            exc_addr: read_u64(r)?,
            exc_ps: read_u64(r)?,
        })
    }
}

fn encode_protection(p: Protection) -> u8 {
    (p.kernel_read as u8)
        | (p.kernel_write as u8) << 1
        | (p.kernel_execute as u8) << 2
        | (p.user_read as u8) << 3
        | (p.user_write as u8) << 4
        | (p.user_execute as u8) << 5
}

fn decode_protection(bits: u8) -> Protection {
    Protection {
        kernel_read: bits & 1 != 0,
        kernel_write: bits & (1 << 1) != 0,
        kernel_execute: bits & (1 << 2) != 0,
        user_read: bits & (1 << 3) != 0,
        user_write: bits & (1 << 4) != 0,
        user_execute: bits & (1 << 5) != 0,
    }
}

fn encode_tlb_entry(w: &mut impl Write, entry: &TlbEntry) -> Result<()> {
    write_u64(w, entry.vpn)?;
    write_u64(w, entry.ppn)?;
    write_u32(w, entry.asn)?;
    write_u8(w, encode_protection(entry.protection))?;
    let flags =
        (entry.valid as u8) | (entry.global as u8) << 1 | (entry.dirty as u8) << 2 | (entry.accessed as u8) << 3;
    write_u8(w, flags)?;
    Ok(())
}

fn decode_tlb_entry(r: &mut impl Read) -> Result<TlbEntry> {
    let vpn = read_u64(r)?;
    let ppn = read_u64(r)?;
    let asn = read_u32(r)?;
    let protection = decode_protection(read_u8(r)?);
    let flags = read_u8(r)?;
    Ok(TlbEntry {
        vpn,
        ppn,
        asn,
        protection,
        valid: flags & 1 != 0,
        global: flags & (1 << 1) != 0,
        dirty: flags & (1 << 2) != 0,
        accessed: flags & (1 << 3) != 0,
    })
}

/// One core's TLB state (spec §4.7). The victim-cache tier is not part
/// of architectural state and is intentionally not snapshotted -- after
/// restore it simply starts cold, exactly as a real TLB does on a
/// context switch.
#[derive(Clone, Debug, Default)]
pub struct MmuState {
    pub itlb_entries: Vec<TlbEntry>,
    pub dtlb_entries: Vec<TlbEntry>,
}

impl MmuState {
    pub fn from_tlb(tlb: &Tlb) -> Self {
        Self {
            itlb_entries: tlb.itlb.snapshot_entries(),
            dtlb_entries: tlb.dtlb.snapshot_entries(),
        }
    }

    pub fn apply_to(&self, tlb: &mut Tlb) {
        tlb.itlb.restore_entries(self.itlb_entries.clone());
        tlb.dtlb.restore_entries(self.dtlb_entries.clone());
    }

    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        write_u32(w, self.itlb_entries.len() as u32)?;
        for entry in &self.itlb_entries {
            encode_tlb_entry(w, entry)?;
        }
        write_u32(w, self.dtlb_entries.len() as u32)?;
        for entry in &self.dtlb_entries {
            encode_tlb_entry(w, entry)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        let itlb_count = read_u32(r)?;
        let mut itlb_entries = Vec::with_capacity(itlb_count as usize);
        for _ in 0..itlb_count {
            itlb_entries.push(decode_tlb_entry(r)?);
        }
        let dtlb_count = read_u32(r)?;
        let mut dtlb_entries = Vec::with_capacity(dtlb_count as usize);
        for _ in 0..dtlb_count {
            dtlb_entries.push(decode_tlb_entry(r)?);
        }
        Ok(Self {
            itlb_entries,
            dtlb_entries,
        })
    }
}

/// One device's opaque state blob, tagged by [`DeviceId`]. Devices
/// serialize their own CSR/FIFO contents; `axp-snapshot` only frames
/// the blob.
#[derive(Clone, Debug)]
pub struct DeviceState {
    pub id: DeviceId,
    pub payload: Vec<u8>,
}

/// A reference to an externally-stored disk overlay file, not the disk
/// bytes themselves (disk image I/O is out of scope for this
/// workspace -- `axp-devices::DiskBackend` is the real collaborator).
#[derive(Clone, Debug)]
pub struct DiskOverlayRef {
    pub lba_base: u64,
    pub overlay_path: String,
}
