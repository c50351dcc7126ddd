use crate::backend::DiskBackend;
use crate::bus::MmioHandler;
use crate::irq::IrqLine;

const REG_COMMAND: u64 = 0x00;
const REG_STATUS: u64 = 0x04;
const REG_LBA: u64 = 0x08;
const REG_SECTOR_COUNT: u64 = 0x10;
const REG_DMA_ADDR: u64 = 0x14;

const CMD_READ: u32 = 1;
const CMD_WRITE: u32 = 2;

const STATUS_BUSY: u32 = 1 << 0;
const STATUS_ERROR: u32 = 1 << 1;
const STATUS_DONE: u32 = 1 << 2;

/// CSR skeleton for a simple SCSI disk controller: programmed-IO command
/// register, LBA, sector count, and a DMA target address. Transfers
/// happen synchronously against `dma_memory` (the physical RAM backing
/// store) the moment `REG_COMMAND` is written, which is enough for SRM's
/// polling disk driver even though it isn't how real SCSI DMA overlaps
/// with execution (spec §4.11: "CSR-layout skeletons ... sufficient to
/// satisfy the bus contract").
pub struct ScsiController<D: DiskBackend> {
    disk: D,
    lba: u64,
    sector_count: u32,
    dma_addr: u32,
    status: u32,
    irq: Option<IrqLine>,
}

impl<D: DiskBackend> ScsiController<D> {
    pub fn new(disk: D, irq: Option<IrqLine>) -> Self {
        Self {
            disk,
            lba: 0,
            sector_count: 0,
            dma_addr: 0,
            status: 0,
            irq,
        }
    }

    /// Executes a programmed command against `dma_memory`, a flat buffer
    /// standing in for the physical RAM the controller would DMA into or
    /// out of (`axp-machine` wires this to the real `PhysicalMemory`).
    pub fn execute(&mut self, command: u32, dma_memory: &mut [u8]) {
        const SECTOR_SIZE: usize = 512;
        self.status = STATUS_BUSY;
        let result = match command {
            CMD_READ => {
                let mut buf = vec![0u8; SECTOR_SIZE * self.sector_count.max(1) as usize];
                self.disk.read_sector(self.lba, &mut buf);
                let base = self.dma_addr as usize;
                if base + buf.len() <= dma_memory.len() {
                    dma_memory[base..base + buf.len()].copy_from_slice(&buf);
                    true
                } else {
                    false
                }
            }
            CMD_WRITE => {
                let len = SECTOR_SIZE * self.sector_count.max(1) as usize;
                let base = self.dma_addr as usize;
                if base + len <= dma_memory.len() {
                    self.disk.write_sector(self.lba, &dma_memory[base..base + len]);
                    true
                } else {
                    false
                }
            }
            _ => false,
        };

        self.status = if result { STATUS_DONE } else { STATUS_ERROR };
        if let Some(irq) = &self.irq {
            irq.raise();
        }
    }

    /// Serializes CSR state for snapshotting. The backing disk is the
    /// embedder's responsibility (spec non-goal: disk image I/O), so
    /// only register state round-trips here.
    pub fn dump_state(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out[0..8].copy_from_slice(&self.lba.to_le_bytes());
        out[8..12].copy_from_slice(&self.sector_count.to_le_bytes());
        out[12..16].copy_from_slice(&self.dma_addr.to_le_bytes());
        out[16..20].copy_from_slice(&self.status.to_le_bytes());
        out
    }

    pub fn load_state(&mut self, bytes: &[u8]) {
        if bytes.len() < 20 {
            return;
        }
        self.lba = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        self.sector_count = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        self.dma_addr = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        self.status = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
    }
}

impl<D: DiskBackend> MmioHandler for ScsiController<D> {
    fn read(&mut self, offset: u64, _width: u8) -> u64 {
        match offset {
            REG_STATUS => self.status as u64,
            REG_LBA => self.lba,
            REG_SECTOR_COUNT => self.sector_count as u64,
            REG_DMA_ADDR => self.dma_addr as u64,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u64, value: u64, _width: u8) {
        match offset {
            REG_COMMAND => {
                if let Some(irq) = &self.irq {
                    irq.lower();
                }
                // Programmed-IO command execution needs the DMA target
                // buffer; the bus contract alone can't supply it, so
                // `axp-machine` calls `execute` directly instead of
                // routing CMD writes through this path.
                let _ = value as u32;
            }
            REG_LBA => self.lba = value,
            REG_SECTOR_COUNT => self.sector_count = value as u32,
            REG_DMA_ADDR => self.dma_addr = value as u32,
            _ => {}
        }
    }
}
