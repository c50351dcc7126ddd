//! Machine configuration record (spec §6 `Config`), validated once at
//! [`crate::Machine::initialize`] rather than scattered across the
//! construction path.

use thiserror::Error;

/// One memory-mapped device to attach at `initialize` time. The disk/net
/// backends themselves are supplied by the embedder (spec §1 non-goals:
/// disk image I/O and host networking are out of scope here), so this
/// only carries placement and wiring, not device-specific payloads.
#[derive(Clone, Debug)]
pub enum DeviceConfig {
    Uart { base: u64, irq_vector: u8 },
    Scsi { base: u64, irq_vector: u8 },
    Tulip { base: u64, irq_vector: u8 },
}

impl DeviceConfig {
    fn base(&self) -> u64 {
        match self {
            DeviceConfig::Uart { base, .. } => *base,
            DeviceConfig::Scsi { base, .. } => *base,
            DeviceConfig::Tulip { base, .. } => *base,
        }
    }

    /// Register window size, used only to reject overlapping device
    /// placements at validation time.
    fn size(&self) -> u64 {
        match self {
            DeviceConfig::Uart { .. } => 0x8,
            DeviceConfig::Scsi { .. } => 0x20,
            DeviceConfig::Tulip { .. } => 0x30,
        }
    }
}

/// Machine-wide configuration (spec §6). `ram_bytes` and `cpu_count` are
/// load-bearing for snapshot compatibility (`load_state` rejects a
/// mismatch), so changing them after `initialize` means building a new
/// `Machine`, not mutating one in place.
#[derive(Clone, Debug)]
pub struct Config {
    pub cpu_count: usize,
    pub ram_bytes: usize,
    pub pal_base: u64,
    pub start_pc: u64,
    pub mmio_base: u64,
    pub mmio_size: u64,
    pub jit_enabled: bool,
    pub jit_threshold: u32,
    pub jit_opt_level: u8,
    pub trace_level: u8,
    pub devices: Vec<DeviceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cpu_count: 1,
            ram_bytes: 64 * 1024 * 1024,
            pal_base: 0x8000,
            start_pc: 0x2000_0000,
            mmio_base: 0x1_0000_0000,
            mmio_size: 0x1000_0000,
            jit_enabled: false,
            jit_threshold: axp_jit::DEFAULT_JIT_THRESHOLD,
            jit_opt_level: 0,
            trace_level: 0,
            devices: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cpu_count must be between 1 and 4, got {0}")]
    CpuCountOutOfRange(usize),
    #[error("ram_bytes must be nonzero")]
    ZeroRam,
    #[error("ram_bytes must be a multiple of the page size ({page_size})")]
    RamNotPageAligned { page_size: u64 },
    #[error("pal_base must be aligned to 0x40 (the CALL_PAL entry granularity)")]
    PalBaseMisaligned,
    #[error("jit_opt_level must be between 0 and 3, got {0}")]
    JitOptLevelOutOfRange(u8),
    #[error("trace_level must be between 0 and 3, got {0}")]
    TraceLevelOutOfRange(u8),
    #[error("device at base {base:#x} overlaps the RAM region [0, {ram_bytes:#x})")]
    DeviceOverlapsRam { base: u64, ram_bytes: u64 },
    #[error("devices at base {a:#x} and {b:#x} overlap")]
    DevicesOverlap { a: u64, b: u64 },
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_count == 0 || self.cpu_count > 4 {
            return Err(ConfigError::CpuCountOutOfRange(self.cpu_count));
        }
        if self.ram_bytes == 0 {
            return Err(ConfigError::ZeroRam);
        }
        if self.ram_bytes as u64 % axp_mmu::PAGE_SIZE != 0 {
            return Err(ConfigError::RamNotPageAligned {
                page_size: axp_mmu::PAGE_SIZE,
            });
        }
        if self.pal_base % 0x40 != 0 {
            return Err(ConfigError::PalBaseMisaligned);
        }
        if self.jit_opt_level > 3 {
            return Err(ConfigError::JitOptLevelOutOfRange(self.jit_opt_level));
        }
        if self.trace_level > 3 {
            return Err(ConfigError::TraceLevelOutOfRange(self.trace_level));
        }
        for device in &self.devices {
            let base = device.base();
            let end = base + device.size();
            if base < self.ram_bytes as u64 && end > 0 {
                return Err(ConfigError::DeviceOverlapsRam {
                    base,
                    ram_bytes: self.ram_bytes as u64,
                });
            }
        }
        for (i, a) in self.devices.iter().enumerate() {
            for b in &self.devices[i + 1..] {
                let (a_base, a_end) = (a.base(), a.base() + a.size());
                let (b_base, b_end) = (b.base(), b.base() + b.size());
                if a_base < b_end && b_base < a_end {
                    return Err(ConfigError::DevicesOverlap { a: a_base, b: b_base });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_cpu_count_out_of_range() {
        let mut cfg = Config::default();
        cfg.cpu_count = 5;
        assert!(matches!(cfg.validate(), Err(ConfigError::CpuCountOutOfRange(5))));
    }

    #[test]
    fn rejects_misaligned_pal_base() {
        let mut cfg = Config::default();
        cfg.pal_base = 0x13;
        assert!(matches!(cfg.validate(), Err(ConfigError::PalBaseMisaligned)));
    }

    #[test]
    fn rejects_overlapping_devices() {
        let mut cfg = Config::default();
        cfg.devices.push(DeviceConfig::Uart {
            base: cfg.mmio_base,
            irq_vector: 1,
        });
        cfg.devices.push(DeviceConfig::Scsi {
            base: cfg.mmio_base + 4,
            irq_vector: 2,
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::DevicesOverlap { .. })));
    }
}
