//! Generic device/bus/IRQ contract (spec §6, ambient expansion §4.11):
//! an address-space router dispatching to registered MMIO handlers, plus
//! CSR-layout skeletons for the three device types SRM/NetBSD-class
//! guests expect (UART, SCSI disk, Tulip Ethernet). Actual disk I/O and
//! packet delivery stay behind [`DiskBackend`]/[`NetBackend`], external
//! collaborators the embedding host supplies.

mod backend;
mod bus;
mod irq;
mod scsi;
mod tulip;
mod uart;

pub use backend::{DiskBackend, NetBackend};
pub use bus::{Bus, MmioHandler};
pub use irq::IrqLine;
pub use scsi::ScsiController;
pub use tulip::Tulip21140;
pub use uart::Uart16550;
