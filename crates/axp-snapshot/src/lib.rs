//! Binary snapshot format (spec.md §6 `save_state`/`load_state`): a
//! magic/version/endianness header followed by TLV sections -- META,
//! CPUS, MMUS, DEVICES, DISKS, RAM -- matching the teacher's
//! `aero-snapshot` encoding style (section ids, length-prefixed entries,
//! optional LZ4 RAM compression) but scoped to this core's own
//! architectural state instead of an x86 hypervisor's.

mod error;
mod format;
mod ids;
mod restore;
mod save;
mod source;
mod state;

pub use error::{Result, SnapshotError};
pub use format::{SNAPSHOT_ENDIANNESS_LITTLE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION_V1};
pub use ids::{DeviceId, SectionId};
pub use restore::restore_snapshot;
pub use save::{save_snapshot, Compression, SaveOptions};
pub use source::{SnapshotSource, SnapshotTarget};
pub use state::{CpuState, DeviceState, DiskOverlayRef, MmuState, SnapshotMeta};
