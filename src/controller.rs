use crate::vector::Vector;

/// The legacy cascaded priority-encoder interrupt controller of a virtual machine.
///
/// One instance is shared by all vcpus of the VM. Device emulation threads raise lines
/// concurrently with the vcpu thread acknowledging them, so implementors serialize their
/// own state.
pub trait LegacyController: Send + Sync {
    /// Whether the controller's output line is asserted.
    fn output_pending(&self) -> bool;

    /// Perform the interrupt acknowledge cycle and return the vector of the acknowledged
    /// interrupt.
    ///
    /// This consumes the interrupt. Callers only use it after [`output_pending`] reported
    /// an interrupt.
    ///
    /// [`output_pending`]: LegacyController::output_pending
    fn read_and_ack(&self) -> Vector;
}

/// The per-vcpu local (advanced) interrupt controller with its internal timer.
///
/// It's guaranteed (for implementors, and required for callers) that every method is called
/// on the thread currently driving the owning vcpu.
pub trait AdvancedController: Send {
    /// Whether the controller currently accepts interrupts from the legacy controller.
    fn accepts_legacy_class(&self) -> bool;

    /// The highest-priority deliverable vector, without acknowledging it.
    fn highest_priority_vector(&self) -> Option<Vector>;

    /// Acknowledge and return the highest-priority deliverable vector.
    ///
    /// The returned vector is removed from the controller's pending set.
    fn ack_highest_priority_vector(&mut self) -> Option<Vector>;

    /// Whether the controller's timer has expired and not been injected yet.
    fn has_pending_timer(&self) -> bool;

    /// Latch the interrupts of every elapsed timer period into the pending set.
    fn inject_pending_timers(&mut self);

    /// Re-arm the host-side timer on the physical CPU the vcpu now runs on.
    fn migrate_timer(&mut self);
}

/// The VM-wide legacy periodic interval timer.
///
/// Only its host-side timer placement matters here.
pub trait PeriodicTimer: Send + Sync {
    /// Re-arm the host-side timer on the current physical CPU.
    fn migrate_timer(&self);
}
