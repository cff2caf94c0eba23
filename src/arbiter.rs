//! Interrupt arbitration for one vcpu.
//!
//! Several producers can make an interrupt pending: the legacy controller (or, in split
//! mode, userspace through the vcpu's pending external vector), the local controller, and the raw
//! injection slot of vcpus without a local controller. The functions here merge them into a
//! single presence answer and a single consuming delivery.
//!
//! Legacy-class interrupts are always checked and drained before the local controller.
//!
//! The consuming functions ([`get_extint`], [`get_interrupt`]) acknowledge the source that
//! supplied the vector. Call them only after [`has_injectable_interrupt`] (or
//! [`has_interrupt`] on nested exit paths) returned `true`, and only once per delivered
//! interrupt.

use core::cell::RefCell;

use alloc::boxed::Box;

use crate::controller::{AdvancedController, LegacyController};
use crate::hal::AxVirqHal;
use crate::mailbox::ExtIntMailbox;
use crate::vcpu::{GuestMode, RawInjection, VirqVCpu};
use crate::vector::Vector;
use crate::vm::{IrqChip, IrqChipMode, VirqVm};

/// Where the vcpu's local interrupts come from.
enum LocalSource<'a> {
    /// No in-kernel local controller, the raw injection slot is the only source.
    Raw(RawInjection),
    /// The in-kernel local controller.
    Lapic(&'a RefCell<Box<dyn AdvancedController>>),
}

/// Where legacy-class (external) interrupts come from.
enum ExtIntSource<'a> {
    Absent,
    Pic(&'a dyn LegacyController),
    Userspace(&'a ExtIntMailbox),
}

fn local_source<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> LocalSource<'_> {
    match vcpu.lapic.as_ref() {
        Some(lapic) => LocalSource::Lapic(lapic),
        None => LocalSource::Raw(vcpu.raw_injection()),
    }
}

fn ext_int_source<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> ExtIntSource<'_> {
    match vcpu.vm().irqchip() {
        Some(IrqChip::KernelFull { pic }) => ExtIntSource::Pic(pic.as_ref()),
        Some(IrqChip::KernelSplit) => ExtIntSource::Userspace(vcpu.ext_int_mailbox()),
        None => ExtIntSource::Absent,
    }
}

/// Whether the local controller has an expired timer not injected yet.
pub fn has_pending_timer<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> bool {
    match local_source(vcpu) {
        LocalSource::Lapic(lapic) => lapic.borrow().has_pending_timer(),
        LocalSource::Raw(_) => false,
    }
}

/// Whether a legacy-class interrupt is pending, without acknowledging it.
///
/// Requires a local controller that currently accepts legacy-class interrupts.
pub fn has_extint<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> bool {
    let LocalSource::Lapic(lapic) = local_source(vcpu) else {
        return false;
    };
    if !lapic.borrow().accepts_legacy_class() {
        return false;
    }
    match ext_int_source(vcpu) {
        ExtIntSource::Pic(pic) => pic.output_pending(),
        ExtIntSource::Userspace(mailbox) => mailbox.is_pending(),
        ExtIntSource::Absent => false,
    }
}

/// Whether an interrupt can be injected by software before entering the guest.
///
/// When a nested guest runs with hardware-assisted delivery, local controller interrupts
/// are delivered by hardware and are not reported here.
pub fn has_injectable_interrupt<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> bool {
    match (
        local_source(vcpu),
        has_extint(vcpu),
        vcpu.guest_mode(),
        vcpu.hw_delivery_active(),
    ) {
        (LocalSource::Raw(raw), _, _, _) => raw.injected.is_some(),
        (LocalSource::Lapic(_), true, _, _) => true,
        (LocalSource::Lapic(_), false, GuestMode::Nested, true) => false,
        (LocalSource::Lapic(lapic), false, GuestMode::Nested, false)
        | (LocalSource::Lapic(lapic), false, GuestMode::Flat, _) => {
            lapic.borrow().highest_priority_vector().is_some()
        }
    }
}

/// Whether any interrupt is pending, regardless of who delivers it.
///
/// Used for scheduling and wake-up decisions.
pub fn has_interrupt<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> bool {
    match (local_source(vcpu), has_extint(vcpu)) {
        (LocalSource::Raw(raw), _) => raw.injected.is_some(),
        (LocalSource::Lapic(_), true) => true,
        (LocalSource::Lapic(lapic), false) => lapic.borrow().highest_priority_vector().is_some(),
    }
}

/// Acknowledge and return the pending legacy-class interrupt.
///
/// In split mode the vcpu's mailbox is drained, otherwise the legacy controller performs
/// its acknowledge cycle.
pub fn get_extint<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> Option<Vector> {
    if !has_extint(vcpu) {
        return None;
    }
    match ext_int_source(vcpu) {
        ExtIntSource::Pic(pic) => Some(pic.read_and_ack()),
        ExtIntSource::Userspace(mailbox) => mailbox.take(),
        ExtIntSource::Absent => None,
    }
}

/// Acknowledge and return the interrupt to deliver now.
///
/// Without a local controller this is the raw injection slot, which is left for the run
/// loop to clear once delivery completed.
pub fn get_interrupt<H: AxVirqHal>(vcpu: &VirqVCpu<H>) -> Option<Vector> {
    let vector = match local_source(vcpu) {
        LocalSource::Raw(raw) => raw.injected,
        LocalSource::Lapic(lapic) => match get_extint(vcpu) {
            Some(vector) => Some(vector),
            None => lapic.borrow_mut().ack_highest_priority_vector(),
        },
    };
    if let Some(vector) = vector {
        trace!(
            "VM[{}] VCpu[{}] delivering vector {} ({:?})",
            vcpu.vm().id(),
            vcpu.id(),
            vector,
            vcpu.vm().irqchip_mode()
        );
    }
    vector
}

/// Latch elapsed local controller timer periods into its pending set.
///
/// Called once per guest entry, before the presence check.
pub fn inject_pending_timer_interrupts<H: AxVirqHal>(vcpu: &VirqVCpu<H>) {
    if let LocalSource::Lapic(lapic) = local_source(vcpu) {
        lapic.borrow_mut().inject_pending_timers();
    }
}

/// Move the vcpu's host-side timers to the physical CPU it now runs on.
///
/// The legacy periodic timer delivers through the bootstrap vcpu, so it only follows that
/// one.
pub fn migrate_timers<H: AxVirqHal>(vcpu: &VirqVCpu<H>) {
    if let LocalSource::Lapic(lapic) = local_source(vcpu) {
        lapic.borrow_mut().migrate_timer();
    }
    if vcpu.is_bsp() {
        if let Some(pit) = vcpu.vm().pit() {
            pit.migrate_timer();
        }
    }
}

/// Whether an irqfd may be delegated to the in-kernel controllers.
///
/// Resampling needs the in-kernel legacy controller, plain edge-triggered sources only
/// need kernel-emulated local controllers.
pub fn irqfd_delegation_allowed(vm: &VirqVm, resample: bool) -> bool {
    match (vm.irqchip_mode(), resample) {
        (IrqChipMode::KernelFull, _) => true,
        (IrqChipMode::KernelSplit, false) => true,
        (IrqChipMode::KernelSplit, true) | (IrqChipMode::None, _) => false,
    }
}
