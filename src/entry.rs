use crate::arbiter;
use crate::hal::AxVirqHal;
use crate::vcpu::VirqVCpu;
use crate::vector::Vector;

/// What the run loop should do about interrupts before entering the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryAction {
    /// Nothing is pending.
    Idle,
    /// An interrupt is pending but the guest can't take it now. Request an interrupt-window
    /// exit and try again then.
    RequestWindow,
    /// Inject this vector. Its source has already been acknowledged.
    Deliver(Vector),
}

/// Decide interrupt delivery for one guest entry.
///
/// `window_open` tells whether the guest can take an interrupt right now (interrupts
/// enabled, no blocking shadow). The vector is only acknowledged when it can be delivered.
pub fn prepare_guest_entry<H: AxVirqHal>(vcpu: &VirqVCpu<H>, window_open: bool) -> EntryAction {
    arbiter::inject_pending_timer_interrupts(vcpu);

    if !arbiter::has_injectable_interrupt(vcpu) {
        return EntryAction::Idle;
    }
    if !window_open {
        return EntryAction::RequestWindow;
    }
    match arbiter::get_interrupt(vcpu) {
        Some(vector) => EntryAction::Deliver(vector),
        None => EntryAction::Idle,
    }
}

/// Whether a halted vcpu has a reason to wake up.
pub fn has_wake_events<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> bool {
    arbiter::has_interrupt(vcpu) || arbiter::has_pending_timer(vcpu)
}
