use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    VersionMismatch { expected: u16, found: u16 },

    #[error("snapshot {field} mismatch: expected {expected}, found {found}")]
    ConfigMismatch {
        field: &'static str,
        expected: u64,
        found: u64,
    },
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
