use std::collections::VecDeque;

use crate::bus::MmioHandler;
use crate::irq::IrqLine;

const THR_RBR: u64 = 0;
const IER: u64 = 1;
const IIR_FCR: u64 = 2;
const LCR: u64 = 3;
#[allow(dead_code)]
const MCR: u64 = 4;
const LSR: u64 = 5;
#[allow(dead_code)]
const MSR: u64 = 6;
#[allow(dead_code)]
const SCR: u64 = 7;

fn take_u32(cursor: &mut &[u8]) -> Option<u32> {
    if cursor.len() < 4 {
        return None;
    }
    let (head, rest) = cursor.split_at(4);
    *cursor = rest;
    Some(u32::from_le_bytes(head.try_into().unwrap()))
}

fn take_bytes(cursor: &mut &[u8], n: usize) -> Vec<u8> {
    let n = n.min(cursor.len());
    let (head, rest) = cursor.split_at(n);
    *cursor = rest;
    head.to_vec()
}

const LSR_DATA_READY: u8 = 1 << 0;
const LSR_THR_EMPTY: u8 = 1 << 5;
const LSR_TSR_EMPTY: u8 = 1 << 6;

/// 16550A-compatible UART register set, enough CSR surface to satisfy
/// SRM's console driver (spec §4.11). Host-side byte delivery is the
/// embedder's job: `poll_rx`/`push_tx` are the seam `axp-machine` uses to
/// connect a real terminal or pty.
pub struct Uart16550 {
    rx_fifo: VecDeque<u8>,
    tx_out: VecDeque<u8>,
    ier: u8,
    lcr: u8,
    scratch: u8,
    irq: Option<IrqLine>,
}

impl Uart16550 {
    pub fn new(irq: Option<IrqLine>) -> Self {
        Self {
            rx_fifo: VecDeque::new(),
            tx_out: VecDeque::new(),
            ier: 0,
            lcr: 0,
            scratch: 0,
            irq,
        }
    }

    /// Host feeds a received byte into the UART's RX FIFO.
    pub fn push_rx(&mut self, byte: u8) {
        self.rx_fifo.push_back(byte);
        if self.ier & 0b1 != 0 {
            if let Some(irq) = &self.irq {
                irq.raise();
            }
        }
    }

    /// Host drains bytes the guest has transmitted.
    pub fn drain_tx(&mut self) -> Vec<u8> {
        self.tx_out.drain(..).collect()
    }

    /// Serializes FIFO contents and CSR state for snapshotting
    /// (`axp-snapshot`'s `DeviceState` only frames the blob this
    /// produces -- it has no knowledge of the UART's register layout).
    pub fn dump_state(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.rx_fifo.len() as u32).to_le_bytes());
        out.extend(self.rx_fifo.iter().copied());
        out.extend_from_slice(&(self.tx_out.len() as u32).to_le_bytes());
        out.extend(self.tx_out.iter().copied());
        out.push(self.ier);
        out.push(self.lcr);
        out.push(self.scratch);
        out
    }

    /// Restores state produced by [`Self::dump_state`]. The IRQ handle
    /// is left untouched -- it isn't architectural state, it's wiring.
    pub fn load_state(&mut self, bytes: &[u8]) {
        let mut cursor = bytes;
        let Some(rx_len) = take_u32(&mut cursor) else { return };
        self.rx_fifo = take_bytes(&mut cursor, rx_len as usize).into();
        let Some(tx_len) = take_u32(&mut cursor) else { return };
        self.tx_out = take_bytes(&mut cursor, tx_len as usize).into();
        self.ier = cursor.first().copied().unwrap_or(0);
        self.lcr = cursor.get(1).copied().unwrap_or(0);
        self.scratch = cursor.get(2).copied().unwrap_or(0);
    }

    fn update_irq(&self) {
        let rx_irq_enabled = self.ier & 0b1 != 0;
        let has_data = !self.rx_fifo.is_empty();
        if let Some(irq) = &self.irq {
            if rx_irq_enabled && has_data {
                irq.raise();
            } else {
                irq.lower();
            }
        }
    }
}

impl MmioHandler for Uart16550 {
    fn read(&mut self, offset: u64, _width: u8) -> u64 {
        let value = match offset {
            THR_RBR => self.rx_fifo.pop_front().unwrap_or(0),
            IER => self.ier,
            IIR_FCR => 0x01, // "no interrupt pending" when FIFO empty
            LCR => self.lcr,
            LSR => {
                let mut lsr = LSR_THR_EMPTY | LSR_TSR_EMPTY;
                if !self.rx_fifo.is_empty() {
                    lsr |= LSR_DATA_READY;
                }
                lsr
            }
            SCR => self.scratch,
            _ => 0,
        };
        self.update_irq();
        value as u64
    }

    fn write(&mut self, offset: u64, value: u64, _width: u8) {
        match offset {
            THR_RBR => self.tx_out.push_back(value as u8),
            IER => self.ier = value as u8,
            LCR => self.lcr = value as u8,
            SCR => self.scratch = value as u8,
            _ => {}
        }
        self.update_irq();
    }
}
