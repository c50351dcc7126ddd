use crate::error::Result;
use crate::state::{CpuState, DeviceState, DiskOverlayRef, MmuState, SnapshotMeta};

/// Everything `save_snapshot` needs to pull out of a running `Machine`.
/// `axp-machine` implements this directly against its live core/device
/// state; tests implement it against fixtures.
pub trait SnapshotSource {
    fn snapshot_meta(&mut self) -> SnapshotMeta;
    fn cpu_states(&self) -> Vec<CpuState>;
    fn mmu_states(&self) -> Vec<MmuState>;
    fn device_states(&self) -> Vec<DeviceState>;
    fn disk_overlays(&self) -> Vec<DiskOverlayRef>;
    fn ram_len(&self) -> usize;
    fn read_ram(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Everything `restore_snapshot` needs to push back into a `Machine`
/// being brought up from a saved file. All cores must be paused while
/// this runs (spec §5: mutation of shared tables requires all cores
/// paused).
pub trait SnapshotTarget {
    fn cpu_count(&self) -> usize;
    fn ram_len(&self) -> usize;
    fn restore_cpu_states(&mut self, states: Vec<CpuState>) -> Result<()>;
    fn restore_mmu_states(&mut self, states: Vec<MmuState>) -> Result<()>;
    fn restore_device_states(&mut self, states: Vec<DeviceState>) -> Result<()>;
    fn restore_disk_overlays(&mut self, overlays: Vec<DiskOverlayRef>) -> Result<()>;
    fn write_ram(&mut self, offset: u64, data: &[u8]) -> Result<()>;
}
