use std::io::Write;

use crate::error::Result;
use crate::format::{SNAPSHOT_ENDIANNESS_LITTLE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION_V1};
use crate::ids::SectionId;
use crate::source::SnapshotSource;

/// RAM payload compression (spec §6: "RAM is optionally LZ4-compressed").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Compression {
    None = 0,
    Lz4 = 1,
}

#[derive(Clone, Copy, Debug)]
pub struct SaveOptions {
    pub compression: Compression,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Lz4,
        }
    }
}

fn write_section(w: &mut impl Write, id: SectionId, version: u16, payload: &[u8]) -> Result<()> {
    w.write_all(&id.0.to_le_bytes())?;
    w.write_all(&version.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // flags, unused
    w.write_all(&(payload.len() as u64).to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

/// Writes a full snapshot of `source` to `writer` (spec §6 `save_state`).
/// Section order is META, CPUS, MMUS, DEVICES, DISKS, RAM; `restore_snapshot`
/// does not require this order but every implementation here produces it.
pub fn save_snapshot(writer: &mut impl Write, source: &mut dyn SnapshotSource, options: SaveOptions) -> Result<()> {
    writer.write_all(SNAPSHOT_MAGIC)?;
    writer.write_all(&SNAPSHOT_VERSION_V1.to_le_bytes())?;
    writer.write_all(&[SNAPSHOT_ENDIANNESS_LITTLE, 0])?;
    writer.write_all(&0u32.to_le_bytes())?; // reserved

    let meta = source.snapshot_meta();
    let mut meta_payload = Vec::new();
    meta.encode(&mut meta_payload)?;
    write_section(writer, SectionId::META, 1, &meta_payload)?;

    let cpu_states = source.cpu_states();
    let mut cpus_payload = Vec::new();
    cpus_payload.extend_from_slice(&(cpu_states.len() as u32).to_le_bytes());
    for state in &cpu_states {
        let mut entry = Vec::new();
        state.encode(&mut entry)?;
        cpus_payload.extend_from_slice(&(entry.len() as u64).to_le_bytes());
        cpus_payload.extend_from_slice(&entry);
    }
    write_section(writer, SectionId::CPUS, 1, &cpus_payload)?;

    let mmu_states = source.mmu_states();
    let mut mmus_payload = Vec::new();
    mmus_payload.extend_from_slice(&(mmu_states.len() as u32).to_le_bytes());
    for state in &mmu_states {
        let mut entry = Vec::new();
        state.encode(&mut entry)?;
        mmus_payload.extend_from_slice(&(entry.len() as u64).to_le_bytes());
        mmus_payload.extend_from_slice(&entry);
    }
    write_section(writer, SectionId::MMUS, 1, &mmus_payload)?;

    let device_states = source.device_states();
    let mut devices_payload = Vec::new();
    devices_payload.extend_from_slice(&(device_states.len() as u32).to_le_bytes());
    for device in &device_states {
        devices_payload.extend_from_slice(&device.id.0.to_le_bytes());
        devices_payload.extend_from_slice(&(device.payload.len() as u64).to_le_bytes());
        devices_payload.extend_from_slice(&device.payload);
    }
    write_section(writer, SectionId::DEVICES, 1, &devices_payload)?;

    let disks = source.disk_overlays();
    let mut disks_payload = Vec::new();
    disks_payload.extend_from_slice(&(disks.len() as u32).to_le_bytes());
    for disk in &disks {
        disks_payload.extend_from_slice(&disk.lba_base.to_le_bytes());
        let path_bytes = disk.overlay_path.as_bytes();
        disks_payload.extend_from_slice(&(path_bytes.len() as u32).to_le_bytes());
        disks_payload.extend_from_slice(path_bytes);
    }
    write_section(writer, SectionId::DISKS, 1, &disks_payload)?;

    let ram_len = source.ram_len();
    let mut raw_ram = vec![0u8; ram_len];
    source.read_ram(0, &mut raw_ram)?;
    let (compression, ram_bytes) = match options.compression {
        Compression::Lz4 => (Compression::Lz4, lz4_flex::compress_prepend_size(&raw_ram)),
        Compression::None => (Compression::None, raw_ram),
    };
    let mut ram_payload = Vec::new();
    ram_payload.extend_from_slice(&(ram_len as u64).to_le_bytes());
    ram_payload.push(compression as u8);
    ram_payload.extend_from_slice(&ram_bytes);
    write_section(writer, SectionId::RAM, 1, &ram_payload)?;

    Ok(())
}
