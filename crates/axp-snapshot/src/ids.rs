use std::fmt;

/// TLV section identifier. Numbers are part of the on-disk format and
/// must never be renumbered once shipped (matching the teacher's
/// `aero-snapshot` stability rule for its own section ids).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SectionId(pub u32);

impl SectionId {
    pub const META: SectionId = SectionId(1);
    pub const CPU: SectionId = SectionId(2);
    pub const MMU: SectionId = SectionId(3);
    pub const DEVICES: SectionId = SectionId(4);
    pub const DISKS: SectionId = SectionId(5);
    pub const RAM: SectionId = SectionId(6);
    pub const CPUS: SectionId = SectionId(7);
    pub const MMUS: SectionId = SectionId(8);

    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("META"),
            2 => Some("CPU"),
            3 => Some("MMU"),
            4 => Some("DEVICES"),
            5 => Some("DISKS"),
            6 => Some("RAM"),
            7 => Some("CPUS"),
            8 => Some("MMUS"),
            _ => None,
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "UNKNOWN({})", self.0),
        }
    }
}

/// Device identifier tagging each blob inside a DEVICES section. Numbers
/// are part of the on-disk format, same stability rule as `SectionId`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub const UART: DeviceId = DeviceId(1);
    pub const SCSI: DeviceId = DeviceId(2);
    pub const TULIP: DeviceId = DeviceId(3);

    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("UART"),
            2 => Some("SCSI"),
            3 => Some("TULIP"),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "UNKNOWN({})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_ids_have_stable_names_and_numbers() {
        let cases = [
            (SectionId::META, 1u32, "META"),
            (SectionId::CPU, 2u32, "CPU"),
            (SectionId::MMU, 3u32, "MMU"),
            (SectionId::DEVICES, 4u32, "DEVICES"),
            (SectionId::DISKS, 5u32, "DISKS"),
            (SectionId::RAM, 6u32, "RAM"),
            (SectionId::CPUS, 7u32, "CPUS"),
            (SectionId::MMUS, 8u32, "MMUS"),
        ];
        for (id, expected_num, expected_name) in cases {
            assert_eq!(id.0, expected_num);
            assert_eq!(id.name(), Some(expected_name));
            assert_eq!(format!("{id}"), format!("{expected_name}({expected_num})"));
        }
    }

    #[test]
    fn device_ids_have_stable_names_and_numbers() {
        let cases = [
            (DeviceId::UART, 1u32, "UART"),
            (DeviceId::SCSI, 2u32, "SCSI"),
            (DeviceId::TULIP, 3u32, "TULIP"),
        ];
        for (id, expected_num, expected_name) in cases {
            assert_eq!(id.0, expected_num);
            assert_eq!(id.name(), Some(expected_name));
            assert_eq!(format!("{id}"), format!("{expected_name}({expected_num})"));
        }
    }

    #[test]
    fn unknown_ids_format_without_a_name() {
        assert_eq!(SectionId(99).name(), None);
        assert_eq!(format!("{}", SectionId(99)), "UNKNOWN(99)");
    }
}
