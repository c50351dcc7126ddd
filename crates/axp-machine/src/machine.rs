//! The top-level emulated machine (spec §6 "CLI/events exposed ... by the
//! core"): owns configuration, the cache/memory/interrupt/device fabric
//! shared by every core, and the [`axp_smp::SmpManager`] that actually
//! runs them. Generic over the disk/net backend types so an embedder can
//! plug in real I/O without this crate depending on it (spec §1
//! non-goals).

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axp_cache::{CacheBus, SharedL3};
use axp_cpu_core::state::CoreState;
use axp_devices::{Bus as DeviceBus, DiskBackend, NetBackend};
use axp_interrupts::InterruptController;
use axp_memory::{MemoryMap, PhysicalMemory, ReservationTracker};
use axp_mmu::tlb::Tlb;
use axp_smp::{CoreStatus, ShootdownScope, SmpManager};
use axp_snapshot::{CpuState, DeviceId, DeviceState, DiskOverlayRef, MmuState, SnapshotError, SnapshotMeta, SnapshotSource, SnapshotTarget};
use axp_types::{MemoryKind, MemoryMapEntry, PhysAddr, Protection, VirtAddr};

use crate::bus::SystemBus;
use crate::config::Config;
use crate::devices::{self, DeviceSet};
use crate::driver::MachineCoreDriver;
use crate::error::MachineError;
use crate::events::{EventSink, StatusChanged};
use crate::firmware;

/// Entry count for each core's I-TLB and D-TLB partition. Real 21264-class
/// implementations run with comparable-order TLBs; nothing in this
/// workspace depends on the exact figure.
const TLB_ENTRIES: usize = 64;

/// Upper bound on how long [`Machine::save_state`]/[`Machine::load_state`]
/// wait for every core to reach a quiesced state after [`Machine::pause`]
/// before giving up and proceeding anyway (mirrors `axp-smp`'s bounded
/// stop-join wait, spec §5 "Cancellation and timeouts").
const QUIESCE_TIMEOUT: Duration = Duration::from_secs(2);

/// The fully wired-up emulated machine. Built once by [`Machine::new`]
/// from a validated [`Config`]; `cpu_count`/`ram_bytes` are then fixed for
/// the instance's lifetime (spec §6: changing them means building a new
/// machine, not mutating one in place).
pub struct Machine<D: DiskBackend + 'static, N: NetBackend + 'static> {
    config: Config,
    smp: SmpManager<MachineCoreDriver>,
    l3: Arc<SharedL3<PhysicalMemory>>,
    #[allow(dead_code)]
    map: Arc<MemoryMap>,
    #[allow(dead_code)]
    interrupts: Arc<InterruptController>,
    #[allow(dead_code)]
    device_bus: Arc<Mutex<DeviceBus>>,
    devices: DeviceSet<D, N>,
    events: Arc<Mutex<dyn EventSink>>,
    last_status: Vec<CoreStatus>,
}

impl<D: DiskBackend + 'static, N: NetBackend + 'static> Machine<D, N> {
    /// Validates `config` and builds every shared structure and one
    /// [`MachineCoreDriver`] per core (spec §6 `initialize(config) ->
    /// bool`). No core thread is spawned until [`Machine::start`]. A
    /// `Config` error returns before anything is built, so there is no
    /// partially-initialized instance to clean up (spec §7: "no core
    /// threads started" on a configuration error).
    pub fn new(config: Config, disks: Vec<D>, nets: Vec<N>, events: Arc<Mutex<dyn EventSink>>) -> Result<Self, MachineError> {
        config.validate()?;

        let ram = PhysicalMemory::new(config.ram_bytes);
        let l3 = SharedL3::new(ram);

        let map = Arc::new(MemoryMap::new());
        map.insert(MemoryMapEntry {
            virtual_base: VirtAddr::new(0),
            physical_base: PhysAddr::new(0),
            length: config.ram_bytes as u64,
            protection: Protection::all_rwx(),
            kind: MemoryKind::Ram,
        });
        map.insert(MemoryMapEntry {
            virtual_base: VirtAddr::new(config.mmio_base),
            physical_base: PhysAddr::new(config.mmio_base),
            length: config.mmio_size,
            protection: Protection::all_rwx(),
            kind: MemoryKind::Mmio,
        });

        let interrupts = Arc::new(InterruptController::new(config.cpu_count));
        // Every device's IRQ is wired to core 0 (`axp-devices::devices::build`'s
        // doc comment: this workspace has no IRQ-redirection table).
        let (bus, device_set) = devices::build(&config.devices, &interrupts, 0, disks, nets);
        let device_bus = Arc::new(Mutex::new(bus));

        let jit_threshold = config.jit_enabled.then_some(config.jit_threshold);
        let reservations = Arc::new(ReservationTracker::new(config.cpu_count));

        let mut drivers = Vec::with_capacity(config.cpu_count);
        for core_id in 0..config.cpu_count {
            let cache = CacheBus::new(l3.clone());
            let system_bus = SystemBus::new(cache, device_bus.clone(), map.clone(), reservations.clone(), core_id);
            let tlb = Tlb::new(TLB_ENTRIES);

            // Only core 0 starts at the configured `start_pc` (spec §6's
            // config table: "PC for core 0 at start"). Secondary cores
            // come up at `pal_base`: real Alpha SMP bring-up has APs
            // enter PALcode reset and spin there until the primary issues
            // a start IPI, and that spin-wait is PALcode's job, not this
            // core's -- there is no separate "waiting for SIPI" run state
            // to model here.
            let pc = if core_id == 0 { config.start_pc } else { config.pal_base };
            let mut state = CoreState::new(pc);
            state.iprs.pal_base = config.pal_base;

            let driver = MachineCoreDriver::new(
                core_id,
                state,
                tlb,
                system_bus,
                interrupts.clone(),
                jit_threshold,
                events.clone(),
                config.trace_level,
            );
            drivers.push(driver);
        }

        let cpu_count = config.cpu_count;
        let smp = SmpManager::new(interrupts.clone(), drivers);

        Ok(Self {
            config,
            smp,
            l3,
            map,
            interrupts,
            device_bus,
            devices: device_set,
            events,
            last_status: vec![CoreStatus::Idle; cpu_count],
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn core_count(&self) -> usize {
        self.config.cpu_count
    }

    pub fn core_status(&self, core: usize) -> CoreStatus {
        self.smp.status(core)
    }

    /// Reads back a core's architectural register state; mainly useful
    /// for tests and debugging tools, since reading while the core is
    /// `Running` races with its own thread (same caveat as
    /// [`axp_smp::SmpManager::driver_handle`]).
    pub fn with_core_state<R>(&self, core: usize, f: impl FnOnce(&CoreState) -> R) -> Result<R, MachineError> {
        if core >= self.config.cpu_count {
            return Err(MachineError::CoreOutOfRange { core, cpu_count: self.config.cpu_count });
        }
        let driver = self.smp.driver_handle(core);
        let driver = driver.lock().unwrap();
        Ok(f(driver.core_state()))
    }

    pub fn start(&mut self) {
        self.smp.start();
        self.sync_status_events();
    }

    pub fn pause(&mut self) {
        self.smp.pause();
        self.sync_status_events();
    }

    pub fn resume(&mut self) {
        self.smp.resume();
        self.sync_status_events();
    }

    pub fn stop(&mut self) {
        self.smp.stop();
        self.sync_status_events();
    }

    pub fn reset(&mut self) {
        self.smp.reset();
        self.sync_status_events();
    }

    /// Cross-core TLB shootdown (spec §4.7 scenario 3): `initiator`
    /// invalidates its own TLB, every other core invalidates at the top
    /// of its own fetch loop, and this call blocks until all of them
    /// have acknowledged. Every target core must be `Running` or this
    /// blocks forever (same barrier used elsewhere has a fixed party
    /// count equal to `cpu_count`).
    pub fn invalidate_tlb(&self, initiator: usize, scope: ShootdownScope) {
        self.smp.shootdown_tlb(initiator, scope);
    }

    /// Convenience wrapper matching the single-VA shootdown named in
    /// spec.md's scenario 3: `va` is translated to the VPN the TLB keys
    /// entries by before the scope is broadcast.
    pub fn invalidate_tlb_single(&self, initiator: usize, va: u64) {
        let vpn = va >> axp_mmu::PAGE_SHIFT;
        self.invalidate_tlb(initiator, ShootdownScope::SingleVa(vpn));
    }

    /// Re-checks every core's status against what was last reported and
    /// fires [`EventSink::status_changed`] for anything that moved.
    /// `axp-smp` itself has no event hook (it stays CPU-agnostic), so a
    /// transition a core reaches on its own -- most notably `Halted` from
    /// a `CALL_PAL HALT` -- is only observed the next time this (or one
    /// of the lifecycle methods above) runs. An embedder polling for
    /// status changes between calls can invoke this directly.
    pub fn sync_status_events(&mut self) {
        for core in 0..self.config.cpu_count {
            let status = self.smp.status(core);
            if self.last_status[core] != status {
                self.last_status[core] = status;
                self.events.lock().unwrap().status_changed(StatusChanged { core, status });
            }
        }
    }

    /// Loads a raw binary or Intel HEX firmware image directly into
    /// backing RAM, bypassing the cache hierarchy entirely (spec §6
    /// "Memory image loader"). Intended to run before [`Machine::start`],
    /// while no core has touched memory yet; calling it afterward is
    /// safe too since the cache is reset once the write completes.
    pub fn load_binary(&mut self, path: &Path, load_addr: u64, set_pc: bool) -> Result<(), MachineError> {
        let l3 = self.l3.clone();
        let ram_bytes = self.config.ram_bytes as u64;
        let pc = firmware::load_binary(path, load_addr, set_pc, ram_bytes, |addr, data| {
            l3.with_backing(|mem| {
                let start = addr as usize;
                mem.as_mut_slice()[start..start + data.len()].copy_from_slice(data);
            });
        })?;
        self.l3.reset_caches();
        if let Some(pc) = pc {
            self.smp.driver_handle(0).lock().unwrap().core_state_mut().pc = pc;
        }
        Ok(())
    }

    /// Pauses every core and blocks (bounded by [`QUIESCE_TIMEOUT`]) until
    /// each has actually left `Running`, so the snapshot read/write below
    /// sees a consistent view (spec §5: "updates ... require all cores
    /// paused").
    fn pause_and_wait(&mut self) {
        self.pause();
        let deadline = Instant::now() + QUIESCE_TIMEOUT;
        loop {
            let quiesced = (0..self.config.cpu_count).all(|c| self.smp.status(c) != CoreStatus::Running);
            if quiesced {
                return;
            }
            if Instant::now() >= deadline {
                log::warn!("not every core quiesced within {QUIESCE_TIMEOUT:?}; proceeding with snapshot anyway");
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Writes a full snapshot to `path` (spec §6 `save_state`). Pauses
    /// every core first.
    pub fn save_state(&mut self, path: &Path) -> Result<(), MachineError> {
        self.pause_and_wait();
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        axp_snapshot::save_snapshot(&mut writer, self, axp_snapshot::SaveOptions::default())?;
        Ok(())
    }

    /// Restores a full snapshot from `path` (spec §6 `load_state`).
    /// Pauses every core first; leaves them paused afterward so the
    /// embedder decides when to resume.
    pub fn load_state(&mut self, path: &Path) -> Result<(), MachineError> {
        self.pause_and_wait();
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        axp_snapshot::restore_snapshot(&mut reader, self)?;
        Ok(())
    }

    pub fn uart_push_rx(&self, byte: u8) -> Result<(), MachineError> {
        let uart = self.devices.uart.as_ref().ok_or_else(|| MachineError::Firmware("no UART configured".into()))?;
        uart.lock().unwrap().push_rx(byte);
        Ok(())
    }

    pub fn uart_drain_tx(&self) -> Result<Vec<u8>, MachineError> {
        let uart = self.devices.uart.as_ref().ok_or_else(|| MachineError::Firmware("no UART configured".into()))?;
        Ok(uart.lock().unwrap().drain_tx())
    }

    /// Runs a programmed SCSI command against the real RAM backing store
    /// (spec §4.11/§6: the command register's DMA target "needs the DMA
    /// target buffer; the bus contract alone can't supply it"). Flushes
    /// dirty cache lines first and resets every cache afterward so the
    /// DMA'd bytes are the ones any core subsequently observes.
    pub fn scsi_execute(&self, command: u32) -> Result<(), MachineError> {
        let (_, scsi) = self.devices.scsi.as_ref().ok_or_else(|| MachineError::Firmware("no SCSI controller configured".into()))?;
        self.l3.flush_all_to_backing();
        self.l3.with_backing(|mem| scsi.lock().unwrap().execute(command, mem.as_mut_slice()));
        self.l3.reset_caches();
        Ok(())
    }

    pub fn tulip_transmit(&self, frame: &[u8]) -> Result<(), MachineError> {
        let (_, tulip) = self.devices.tulip.as_ref().ok_or_else(|| MachineError::Firmware("no Tulip NIC configured".into()))?;
        tulip.lock().unwrap().transmit(frame);
        Ok(())
    }

    pub fn tulip_poll_receive(&self) -> Result<Option<Vec<u8>>, MachineError> {
        let (_, tulip) = self.devices.tulip.as_ref().ok_or_else(|| MachineError::Firmware("no Tulip NIC configured".into()))?;
        Ok(tulip.lock().unwrap().poll_receive())
    }
}

impl<D: DiskBackend + 'static, N: NetBackend + 'static> SnapshotSource for Machine<D, N> {
    fn snapshot_meta(&mut self) -> SnapshotMeta {
        SnapshotMeta {
            snapshot_id: 0,
            created_unix_ms: 0,
            label: None,
            cpu_count: self.config.cpu_count as u32,
            ram_bytes: self.config.ram_bytes as u64,
            pal_base: self.config.pal_base,
        }
    }

    fn cpu_states(&self) -> Vec<CpuState> {
        (0..self.config.cpu_count)
            .map(|core| CpuState::from(self.smp.driver_handle(core).lock().unwrap().core_state()))
            .collect()
    }

    fn mmu_states(&self) -> Vec<MmuState> {
        (0..self.config.cpu_count)
            .map(|core| MmuState::from_tlb(self.smp.driver_handle(core).lock().unwrap().tlb()))
            .collect()
    }

    fn device_states(&self) -> Vec<DeviceState> {
        let mut states = Vec::new();
        if let Some(uart) = &self.devices.uart {
            states.push(DeviceState { id: DeviceId::UART, payload: uart.lock().unwrap().dump_state() });
        }
        if let Some((_, scsi)) = &self.devices.scsi {
            states.push(DeviceState { id: DeviceId::SCSI, payload: scsi.lock().unwrap().dump_state().to_vec() });
        }
        if let Some((_, tulip)) = &self.devices.tulip {
            states.push(DeviceState { id: DeviceId::TULIP, payload: tulip.lock().unwrap().dump_state().to_vec() });
        }
        states
    }

    /// Always empty: disk image I/O is out of scope for this workspace
    /// (spec §1 non-goal), so there is no overlay file bookkeeping to
    /// snapshot.
    fn disk_overlays(&self) -> Vec<DiskOverlayRef> {
        Vec::new()
    }

    fn ram_len(&self) -> usize {
        self.config.ram_bytes
    }

    fn read_ram(&self, offset: u64, buf: &mut [u8]) -> axp_snapshot::Result<()> {
        self.l3.flush_all_to_backing();
        self.l3.with_backing(|mem| {
            let start = offset as usize;
            buf.copy_from_slice(&mem.as_slice()[start..start + buf.len()]);
        });
        Ok(())
    }
}

impl<D: DiskBackend + 'static, N: NetBackend + 'static> SnapshotTarget for Machine<D, N> {
    fn cpu_count(&self) -> usize {
        self.config.cpu_count
    }

    fn ram_len(&self) -> usize {
        self.config.ram_bytes
    }

    fn restore_cpu_states(&mut self, states: Vec<CpuState>) -> axp_snapshot::Result<()> {
        if states.len() != self.config.cpu_count {
            return Err(SnapshotError::ConfigMismatch {
                field: "cpu_count",
                expected: self.config.cpu_count as u64,
                found: states.len() as u64,
            });
        }
        for (core, state) in states.into_iter().enumerate() {
            let driver = self.smp.driver_handle(core);
            *driver.lock().unwrap().core_state_mut() = state.to_core_state();
        }
        Ok(())
    }

    fn restore_mmu_states(&mut self, states: Vec<MmuState>) -> axp_snapshot::Result<()> {
        if states.len() != self.config.cpu_count {
            return Err(SnapshotError::ConfigMismatch {
                field: "cpu_count",
                expected: self.config.cpu_count as u64,
                found: states.len() as u64,
            });
        }
        for (core, state) in states.into_iter().enumerate() {
            let driver = self.smp.driver_handle(core);
            state.apply_to(driver.lock().unwrap().tlb_mut());
        }
        Ok(())
    }

    fn restore_device_states(&mut self, states: Vec<DeviceState>) -> axp_snapshot::Result<()> {
        for state in states {
            match state.id {
                DeviceId::UART => {
                    if let Some(uart) = &self.devices.uart {
                        uart.lock().unwrap().load_state(&state.payload);
                    }
                }
                DeviceId::SCSI => {
                    if let Some((_, scsi)) = &self.devices.scsi {
                        scsi.lock().unwrap().load_state(&state.payload);
                    }
                }
                DeviceId::TULIP => {
                    if let Some((_, tulip)) = &self.devices.tulip {
                        tulip.lock().unwrap().load_state(&state.payload);
                    }
                }
                _ => log::warn!("ignoring unknown device id {} in snapshot", state.id),
            }
        }
        Ok(())
    }

    fn restore_disk_overlays(&mut self, _overlays: Vec<DiskOverlayRef>) -> axp_snapshot::Result<()> {
        Ok(())
    }

    fn write_ram(&mut self, offset: u64, data: &[u8]) -> axp_snapshot::Result<()> {
        self.l3.with_backing(|mem| {
            let start = offset as usize;
            mem.as_mut_slice()[start..start + data.len()].copy_from_slice(data);
        });
        self.l3.reset_caches();
        Ok(())
    }
}
