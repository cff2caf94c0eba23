use axerrno::{ax_err, AxResult};
use bitflags::bitflags;

use crate::arbiter::irqfd_delegation_allowed;
use crate::vm::VirqVm;

bitflags! {
    /// Flags of an irqfd registration request.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct IrqfdFlags: u32 {
        /// Remove an existing registration.
        const DEASSIGN = 1 << 0;
        /// Level-triggered source, resampled on end of interrupt.
        const RESAMPLE = 1 << 1;
    }
}

/// An irqfd registration request: an event source driving a guest interrupt line.
#[derive(Clone, Copy, Debug)]
pub struct IrqfdArgs {
    /// The global system interrupt the event drives.
    pub gsi: u32,
    /// Request flags.
    pub flags: IrqfdFlags,
}

impl VirqVm {
    /// Whether the controller mode can serve the irqfd described by `args`.
    pub fn irqfd_allowed(&self, args: &IrqfdArgs) -> bool {
        irqfd_delegation_allowed(self, args.flags.contains(IrqfdFlags::RESAMPLE))
    }

    /// Admission check performed once when an irqfd is registered.
    ///
    /// Deassign requests are always admitted.
    pub fn admit_irqfd(&self, args: &IrqfdArgs) -> AxResult {
        if args.flags.contains(IrqfdFlags::DEASSIGN) || self.irqfd_allowed(args) {
            Ok(())
        } else {
            ax_err!(
                InvalidInput,
                format!(
                    "VM[{}] irqfd for gsi {} ({:?}) not supported in {:?} mode",
                    self.id(),
                    args.gsi,
                    args.flags,
                    self.irqchip_mode()
                )
            )
        }
    }
}
