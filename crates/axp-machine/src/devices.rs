//! Wires [`crate::config::DeviceConfig`] entries into live device
//! instances registered on a shared [`axp_devices::Bus`], and keeps typed
//! handles to the ones whose command registers need direct RAM access
//! (spec §4.11: SCSI/Tulip command execution "needs the DMA target
//! buffer; the bus contract alone can't supply it", per `axp-devices`'
//! own doc comments -- so `axp-machine` calls `execute`/`transmit`
//! directly instead of routing command writes through the bus).

use std::sync::{Arc, Mutex};

use axp_devices::{Bus as DeviceBus, DiskBackend, IrqLine, MmioHandler, NetBackend, ScsiController, Tulip21140, Uart16550};
use axp_interrupts::InterruptController;

use crate::config::DeviceConfig;

/// Forwards `MmioHandler` calls through a shared lock so a device can be
/// registered on the bus for plain CSR access while `axp-machine` keeps
/// its own typed handle for operations the bus contract can't express.
struct Shared<T>(Arc<Mutex<T>>);

impl<T: MmioHandler> MmioHandler for Shared<T> {
    fn read(&mut self, offset: u64, width: u8) -> u64 {
        self.0.lock().unwrap().read(offset, width)
    }
    fn write(&mut self, offset: u64, value: u64, width: u8) {
        self.0.lock().unwrap().write(offset, value, width)
    }
}

/// Live devices attached to one machine, plus enough to build the
/// [`axp_devices::Bus`] they're registered on. Generic over the disk/net
/// backend types the embedder supplies; a machine has at most one
/// concrete backend type for each.
pub struct DeviceSet<D: DiskBackend, N: NetBackend> {
    pub uart: Option<Arc<Mutex<Uart16550>>>,
    pub scsi: Option<(u64, Arc<Mutex<ScsiController<D>>>)>,
    pub tulip: Option<(u64, Arc<Mutex<Tulip21140<N>>>)>,
}

impl<D: DiskBackend, N: NetBackend> Default for DeviceSet<D, N> {
    fn default() -> Self {
        Self {
            uart: None,
            scsi: None,
            tulip: None,
        }
    }
}

/// Builds the one device bus and typed handle set shared by every core in
/// the machine (devices live in one global physical address space; each
/// per-core [`crate::bus::SystemBus`] gets its own `Arc` clone of the
/// result). `irq_target_core` is the core that receives every device's
/// interrupt line -- this workspace doesn't model an IRQ redirection
/// table, so all devices are wired to a single core, conventionally 0.
/// Disk/net backend instances are consumed in the same order their
/// `DeviceConfig` entries appear.
pub fn build<D, N>(
    configs: &[DeviceConfig],
    interrupts: &Arc<InterruptController>,
    irq_target_core: usize,
    disks: Vec<D>,
    nets: Vec<N>,
) -> (DeviceBus, DeviceSet<D, N>)
where
    D: DiskBackend,
    N: NetBackend,
{
    let mut bus = DeviceBus::new();
    let mut set = DeviceSet::default();
    let mut disks = disks.into_iter();
    let mut nets = nets.into_iter();

    for config in configs {
        match *config {
            DeviceConfig::Uart { base, irq_vector } => {
                let irq = IrqLine::new(Arc::clone(interrupts), irq_target_core, irq_vector);
                let uart = Arc::new(Mutex::new(Uart16550::new(Some(irq))));
                bus.register(base, 0x8, Box::new(Shared(Arc::clone(&uart))));
                set.uart = Some(uart);
            }
            DeviceConfig::Scsi { base, irq_vector } => {
                let irq = IrqLine::new(Arc::clone(interrupts), irq_target_core, irq_vector);
                let disk = disks.next().unwrap_or_else(|| panic!("no disk backend supplied for SCSI device at {base:#x}"));
                let scsi = Arc::new(Mutex::new(ScsiController::new(disk, Some(irq))));
                bus.register(base, 0x20, Box::new(Shared(Arc::clone(&scsi))));
                set.scsi = Some((base, scsi));
            }
            DeviceConfig::Tulip { base, irq_vector } => {
                let irq = IrqLine::new(Arc::clone(interrupts), irq_target_core, irq_vector);
                let net = nets.next().unwrap_or_else(|| panic!("no net backend supplied for Tulip device at {base:#x}"));
                let tulip = Arc::new(Mutex::new(Tulip21140::new(net, Some(irq))));
                bus.register(base, 0x30, Box::new(Shared(Arc::clone(&tulip))));
                set.tulip = Some((base, tulip));
            }
        }
    }

    (bus, set)
}
