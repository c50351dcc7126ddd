use std::sync::Arc;

use axp_interrupts::InterruptController;

/// A device's handle to its wired IRQ line (spec §6: "generic ...
/// IRQ contract"). Mirrors a real interrupt line: `raise`/`lower` are
/// level-triggered, matching how 16550-class UARTs and the Tulip
/// controller hold their line asserted until the driver services it.
pub struct IrqLine {
    interrupts: Arc<InterruptController>,
    core: usize,
    vector: u8,
}

impl IrqLine {
    pub fn new(interrupts: Arc<InterruptController>, core: usize, vector: u8) -> Self {
        Self { interrupts, core, vector }
    }

    pub fn raise(&self) {
        self.interrupts.signal_irq(self.core, self.vector);
    }

    pub fn lower(&self) {
        self.interrupts.clear_irq(self.core, self.vector);
    }

    pub fn is_raised(&self) -> bool {
        self.interrupts.is_pending(self.core, self.vector)
    }
}
