use thiserror::Error;

use crate::config::ConfigError;

/// Top-level error type for everything that can go wrong operating a
/// [`crate::Machine`] from the outside: bad configuration, firmware that
/// won't parse, or a snapshot that won't load.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("firmware/state I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed firmware image: {0}")]
    Firmware(String),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] axp_snapshot::SnapshotError),
    #[error("load address {addr:#x} plus length {len:#x} exceeds RAM size {ram_bytes:#x}")]
    LoadOutOfBounds { addr: u64, len: u64, ram_bytes: u64 },
    #[error("core index {core} out of range for cpu_count {cpu_count}")]
    CoreOutOfRange { core: usize, cpu_count: usize },
}
