/// 8-byte file magic, written verbatim at the start of every snapshot.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"AXPSNAP1";

/// Format version carried in the header, independent of the `version`
/// field each TLV section carries for its own payload layout.
pub const SNAPSHOT_VERSION_V1: u16 = 1;

pub const SNAPSHOT_ENDIANNESS_LITTLE: u8 = 0;
