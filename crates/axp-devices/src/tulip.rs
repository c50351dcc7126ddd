use crate::backend::NetBackend;
use crate::bus::MmioHandler;
use crate::irq::IrqLine;

const CSR0_BUS_MODE: u64 = 0x00;
const CSR1_TX_POLL: u64 = 0x08;
const CSR2_RX_POLL: u64 = 0x10;
const CSR3_RX_RING_BASE: u64 = 0x18;
const CSR4_TX_RING_BASE: u64 = 0x20;
const CSR5_STATUS: u64 = 0x28;

const STATUS_TX_DONE: u32 = 1 << 0;
const STATUS_RX_DONE: u32 = 1 << 1;

/// CSR skeleton for a DEC 21140 (Tulip) style Ethernet controller:
/// CSR0/1/2 bus-mode and poll-demand registers plus ring-base CSR3/CSR4,
/// matching the real chip's register spacing (each CSR is 8 bytes apart
/// on a 32-bit-addressable PCI bus). Descriptor-ring walking against RAM
/// is driven by `axp-machine` the same way the SCSI controller's DMA is
/// (the bus contract alone can't supply a RAM view).
pub struct Tulip21140<N: NetBackend> {
    net: N,
    bus_mode: u32,
    rx_ring_base: u32,
    tx_ring_base: u32,
    status: u32,
    irq: Option<IrqLine>,
}

impl<N: NetBackend> Tulip21140<N> {
    pub fn new(net: N, irq: Option<IrqLine>) -> Self {
        Self {
            net,
            bus_mode: 0,
            rx_ring_base: 0,
            tx_ring_base: 0,
            status: 0,
            irq,
        }
    }

    pub fn rx_ring_base(&self) -> u32 {
        self.rx_ring_base
    }

    pub fn tx_ring_base(&self) -> u32 {
        self.tx_ring_base
    }

    /// Transmits one frame (the descriptor ring itself is walked by the
    /// caller) and raises the line if CSR5 reporting is enabled.
    pub fn transmit(&mut self, frame: &[u8]) {
        self.net.send_frame(frame);
        self.status |= STATUS_TX_DONE;
        if let Some(irq) = &self.irq {
            irq.raise();
        }
    }

    /// Polls the backend for an inbound frame.
    pub fn poll_receive(&mut self) -> Option<Vec<u8>> {
        let frame = self.net.try_receive_frame();
        if frame.is_some() {
            self.status |= STATUS_RX_DONE;
            if let Some(irq) = &self.irq {
                irq.raise();
            }
        }
        frame
    }

    /// Serializes CSR state for snapshotting. The net backend itself
    /// (and any in-flight frames) is the embedder's responsibility.
    pub fn dump_state(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.bus_mode.to_le_bytes());
        out[4..8].copy_from_slice(&self.rx_ring_base.to_le_bytes());
        out[8..12].copy_from_slice(&self.tx_ring_base.to_le_bytes());
        out[12..16].copy_from_slice(&self.status.to_le_bytes());
        out
    }

    pub fn load_state(&mut self, bytes: &[u8]) {
        if bytes.len() < 16 {
            return;
        }
        self.bus_mode = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        self.rx_ring_base = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        self.tx_ring_base = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        self.status = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
    }
}

impl<N: NetBackend> MmioHandler for Tulip21140<N> {
    fn read(&mut self, offset: u64, _width: u8) -> u64 {
        match offset {
            CSR0_BUS_MODE => self.bus_mode as u64,
            CSR3_RX_RING_BASE => self.rx_ring_base as u64,
            CSR4_TX_RING_BASE => self.tx_ring_base as u64,
            CSR5_STATUS => self.status as u64,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u64, value: u64, _width: u8) {
        match offset {
            CSR0_BUS_MODE => self.bus_mode = value as u32,
            CSR1_TX_POLL => { /* poll-demand: caller walks the TX ring */ }
            CSR2_RX_POLL => { /* poll-demand: caller walks the RX ring */ }
            CSR3_RX_RING_BASE => self.rx_ring_base = value as u32,
            CSR4_TX_RING_BASE => self.tx_ring_base = value as u32,
            CSR5_STATUS => self.status &= !(value as u32), // write-1-to-clear
            _ => {}
        }
    }
}
