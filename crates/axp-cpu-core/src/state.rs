//! Per-core architectural state: register file, FPCR, PS, reservation,
//! and the IPR bank (spec §3).

/// Integer register file. R31 is hardwired zero: writes are discarded,
/// reads always return 0.
#[derive(Clone, Debug)]
pub struct IntRegisters([u64; 32]);

impl Default for IntRegisters {
    fn default() -> Self {
        Self([0; 32])
    }
}

impl IntRegisters {
    pub fn read(&self, index: u8) -> u64 {
        if index == 31 {
            0
        } else {
            self.0[index as usize]
        }
    }

    pub fn write(&mut self, index: u8, value: u64) {
        if index != 31 {
            self.0[index as usize] = value;
        }
    }
}

/// Floating-point register file, storing raw 64-bit bit patterns. F31 is
/// hardwired zero.
#[derive(Clone, Debug)]
pub struct FpRegisters([u64; 32]);

impl Default for FpRegisters {
    fn default() -> Self {
        Self([0; 32])
    }
}

impl FpRegisters {
    pub fn read(&self, index: u8) -> u64 {
        if index == 31 {
            0
        } else {
            self.0[index as usize]
        }
    }

    pub fn write(&mut self, index: u8, value: u64) {
        if index != 31 {
            self.0[index as usize] = value;
        }
    }
}

/// Floating-point control register: trap enables (bits 0-4), sticky
/// exception flags (bits 5-9), dynamic rounding mode (bits 58-59), summary
/// bit (63).
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Fpcr(pub u64);

impl Fpcr {
    const TRAP_ENABLE_SHIFT: u32 = 0;
    const STICKY_SHIFT: u32 = 5;
    const DYN_ROUND_SHIFT: u32 = 58;
    const SUMMARY_BIT: u64 = 1 << 63;

    pub const fn trap_enabled(self, bit: u32) -> bool {
        (self.0 >> (Self::TRAP_ENABLE_SHIFT + bit)) & 1 != 0
    }

    pub fn set_sticky(&mut self, bit: u32) {
        self.0 |= 1 << (Self::STICKY_SHIFT + bit);
    }

    pub const fn sticky(self, bit: u32) -> bool {
        (self.0 >> (Self::STICKY_SHIFT + bit)) & 1 != 0
    }

    pub const fn dynamic_rounding(self) -> axp_decoder::RoundingMode {
        axp_decoder::RoundingMode::from_bits(((self.0 >> Self::DYN_ROUND_SHIFT) & 0b11) as u8)
    }

    pub fn set_summary(&mut self, set: bool) {
        if set {
            self.0 |= Self::SUMMARY_BIT;
        } else {
            self.0 &= !Self::SUMMARY_BIT;
        }
    }
}

/// Processor status: current mode (bits 3-4), interrupt-enable, PALmode,
/// and current IPL.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Ps {
    pub mode: axp_types::Mode,
    pub interrupts_enabled: bool,
    pub pal_mode: bool,
    pub ipl: u8,
}

impl Default for Ps {
    fn default() -> Self {
        Self {
            mode: axp_types::Mode::Kernel,
            interrupts_enabled: true,
            pal_mode: false,
            ipl: 0,
        }
    }
}

impl Ps {
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            mode: axp_types::Mode::from_bits(((bits >> 3) & 0b11) as u8),
            interrupts_enabled: (bits & 1) != 0,
            pal_mode: (bits >> 2) & 1 != 0,
            ipl: ((bits >> 8) & 0x1F) as u8,
        }
    }

    pub const fn bits(self) -> u64 {
        (self.interrupts_enabled as u64)
            | ((self.pal_mode as u64) << 2)
            | ((self.mode.bits() as u64) << 3)
            | ((self.ipl as u64) << 8)
    }
}

/// A core's LL/SC reservation: at most one outstanding range, cleared by
/// any overlapping write, a context switch, STx_C (either outcome), or
/// interrupt entry (spec §3).
#[derive(Clone, Copy, Default, Debug)]
pub struct Reservation {
    pub address: u64,
    pub size: u8,
    pub valid: bool,
}

impl Reservation {
    pub fn set(&mut self, address: u64, size: u8) {
        self.address = address;
        self.size = size;
        self.valid = true;
    }

    pub fn clear(&mut self) {
        self.valid = false;
    }

    pub fn covers(&self, address: u64) -> bool {
        self.valid && address >= self.address && address < self.address + self.size as u64
    }

    /// Overlapping write observed anywhere (local store or remote
    /// coherency traffic) invalidates the reservation.
    pub fn observe_write(&mut self, address: u64, size: u8) {
        if !self.valid {
            return;
        }
        let write_end = address + size as u64;
        let res_end = self.address + self.size as u64;
        if address < res_end && write_end > self.address {
            self.valid = false;
        }
    }
}

/// Implementation-private registers populated by the MMU walker before a
/// memory-related trap is raised (spec §4.7).
#[derive(Clone, Copy, Default, Debug)]
pub struct IprBank {
    pub mm_stat: u64,
    pub mm_fault_addr: u64,
    pub exc_sum: u64,
    pub ptbr: u64,
    pub asn: u32,
    pub pal_base: u64,
    pub exc_addr: u64,
    pub exc_ps: u64,
}

/// Full per-core architectural context (spec §3's "Core context").
/// Exactly one execution thread owns this; cross-thread access goes
/// through `axp-smp`'s message channels or atomics on designated fields,
/// never a shared reference to this struct itself.
#[derive(Clone, Debug)]
pub struct CoreState {
    pub int_regs: IntRegisters,
    pub fp_regs: FpRegisters,
    pub pc: u64,
    pub ps: Ps,
    pub fpcr: Fpcr,
    pub reservation: Reservation,
    pub iprs: IprBank,
}

impl Default for CoreState {
    fn default() -> Self {
        Self {
            int_regs: IntRegisters::default(),
            fp_regs: FpRegisters::default(),
            pc: 0,
            ps: Ps::default(),
            fpcr: Fpcr::default(),
            reservation: Reservation::default(),
            iprs: IprBank::default(),
        }
    }
}

impl CoreState {
    pub fn new(start_pc: u64) -> Self {
        Self {
            pc: start_pc,
            ..Self::default()
        }
    }
}
