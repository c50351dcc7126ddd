use std::io::Read;

use crate::error::{Result, SnapshotError};
use crate::format::{SNAPSHOT_ENDIANNESS_LITTLE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION_V1};
use crate::ids::SectionId;
use crate::save::Compression;
use crate::source::SnapshotTarget;
use crate::state::{CpuState, DeviceState, DiskOverlayRef, MmuState, SnapshotMeta};

fn read_u8(r: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16(r: &mut impl Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

struct Section {
    id: SectionId,
    #[allow(dead_code)]
    version: u16,
    payload: Vec<u8>,
}

fn read_section(r: &mut impl Read) -> std::result::Result<Option<Section>, SnapshotError> {
    // A zero-byte read of the first id byte means a clean end of stream
    // (no more sections); anything else must be a complete 4-byte id.
    let mut first = [0u8; 1];
    if r.read(&mut first)? == 0 {
        return Ok(None);
    }
    let mut rest = [0u8; 3];
    r.read_exact(&mut rest)?;
    let id = SectionId(u32::from_le_bytes([first[0], rest[0], rest[1], rest[2]]));
    let version = read_u16(r)?;
    let _flags = read_u16(r)?;
    let len = read_u64(r)?;
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    Ok(Some(Section { id, version, payload }))
}

fn parse_cpus(payload: &[u8]) -> Result<Vec<CpuState>> {
    let mut cursor = payload;
    let count = read_u32(&mut cursor)?;
    let mut states = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let entry_len = read_u64(&mut cursor)? as usize;
        if cursor.len() < entry_len {
            return Err(SnapshotError::Corrupt("truncated CPU entry"));
        }
        let (entry, rest) = cursor.split_at(entry_len);
        states.push(CpuState::decode(&mut &*entry)?);
        cursor = rest;
    }
    Ok(states)
}

fn parse_mmus(payload: &[u8]) -> Result<Vec<MmuState>> {
    let mut cursor = payload;
    let count = read_u32(&mut cursor)?;
    let mut states = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let entry_len = read_u64(&mut cursor)? as usize;
        if cursor.len() < entry_len {
            return Err(SnapshotError::Corrupt("truncated MMU entry"));
        }
        let (entry, rest) = cursor.split_at(entry_len);
        states.push(MmuState::decode(&mut &*entry)?);
        cursor = rest;
    }
    Ok(states)
}

fn parse_devices(payload: &[u8]) -> Result<Vec<DeviceState>> {
    let mut cursor = payload;
    let count = read_u32(&mut cursor)?;
    let mut states = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = crate::ids::DeviceId(read_u32(&mut cursor)?);
        let entry_len = read_u64(&mut cursor)? as usize;
        if cursor.len() < entry_len {
            return Err(SnapshotError::Corrupt("truncated device entry"));
        }
        let (payload, rest) = cursor.split_at(entry_len);
        states.push(DeviceState {
            id,
            payload: payload.to_vec(),
        });
        cursor = rest;
    }
    Ok(states)
}

fn parse_disks(payload: &[u8]) -> Result<Vec<DiskOverlayRef>> {
    let mut cursor = payload;
    let count = read_u32(&mut cursor)?;
    let mut disks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let lba_base = read_u64(&mut cursor)?;
        let path_len = read_u32(&mut cursor)? as usize;
        if cursor.len() < path_len {
            return Err(SnapshotError::Corrupt("truncated disk overlay path"));
        }
        let (path_bytes, rest) = cursor.split_at(path_len);
        let overlay_path =
            String::from_utf8(path_bytes.to_vec()).map_err(|_| SnapshotError::Corrupt("non-utf8 overlay path"))?;
        disks.push(DiskOverlayRef { lba_base, overlay_path });
        cursor = rest;
    }
    Ok(disks)
}

fn parse_ram(payload: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = payload;
    let total_len = read_u64(&mut cursor)? as usize;
    let compression = read_u8(&mut cursor)?;
    let data = match compression {
        c if c == Compression::None as u8 => cursor.to_vec(),
        c if c == Compression::Lz4 as u8 => {
            lz4_flex::decompress_size_prepended(cursor).map_err(|_| SnapshotError::Corrupt("corrupt lz4 RAM payload"))?
        }
        _ => return Err(SnapshotError::Corrupt("unknown RAM compression tag")),
    };
    if data.len() != total_len {
        return Err(SnapshotError::Corrupt("RAM payload length mismatch"));
    }
    Ok(data)
}

/// Reads a snapshot written by [`crate::save_snapshot`] and applies it
/// to `target`, validating that `cpu_count`/`ram_bytes` in the META
/// section match the target's own configuration (spec §6: "`load_state`
/// requires matching `cpu_count` and `ram_bytes`").
pub fn restore_snapshot(reader: &mut impl Read, target: &mut dyn SnapshotTarget) -> Result<()> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::Corrupt("bad snapshot magic"));
    }
    let version = read_u16(reader)?;
    if version != SNAPSHOT_VERSION_V1 {
        return Err(SnapshotError::VersionMismatch {
            expected: SNAPSHOT_VERSION_V1,
            found: version,
        });
    }
    let endianness = read_u8(reader)?;
    if endianness != SNAPSHOT_ENDIANNESS_LITTLE {
        return Err(SnapshotError::Corrupt("unsupported snapshot endianness"));
    }
    let _flags = read_u8(reader)?;
    let _reserved = read_u32(reader)?;

    let mut meta: Option<SnapshotMeta> = None;
    let mut cpu_states = Vec::new();
    let mut mmu_states = Vec::new();
    let mut device_states = Vec::new();
    let mut disk_overlays = Vec::new();
    let mut ram: Option<Vec<u8>> = None;

    while let Some(section) = read_section(reader)? {
        match section.id {
            SectionId::META => meta = Some(SnapshotMeta::decode(&mut &section.payload[..])?),
            SectionId::CPUS => cpu_states = parse_cpus(&section.payload)?,
            SectionId::MMUS => mmu_states = parse_mmus(&section.payload)?,
            SectionId::DEVICES => device_states = parse_devices(&section.payload)?,
            SectionId::DISKS => disk_overlays = parse_disks(&section.payload)?,
            SectionId::RAM => ram = Some(parse_ram(&section.payload)?),
            _ => {
                log::warn!("ignoring unknown snapshot section {}", section.id);
            }
        }
    }

    let meta = meta.ok_or(SnapshotError::Corrupt("missing META section"))?;

    if meta.cpu_count as usize != target.cpu_count() {
        return Err(SnapshotError::ConfigMismatch {
            field: "cpu_count",
            expected: target.cpu_count() as u64,
            found: meta.cpu_count as u64,
        });
    }
    if meta.ram_bytes as usize != target.ram_len() {
        return Err(SnapshotError::ConfigMismatch {
            field: "ram_bytes",
            expected: target.ram_len() as u64,
            found: meta.ram_bytes,
        });
    }

    target.restore_cpu_states(cpu_states)?;
    target.restore_mmu_states(mmu_states)?;
    target.restore_device_states(device_states)?;
    target.restore_disk_overlays(disk_overlays)?;
    if let Some(ram) = ram {
        target.write_ram(0, &ram)?;
    }

    Ok(())
}
