/// The interfaces which the underlying software (kernel or hypervisor) must implement.
pub trait AxVirqHal {
    /// Returns the id of the physical CPU the caller runs on.
    ///
    /// Used when a vcpu is bound, to detect that it moved to another physical CPU and its
    /// host-side timers must follow.
    fn current_pcpu_id() -> usize;
}
