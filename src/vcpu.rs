use alloc::boxed::Box;
use alloc::sync::Arc;
use core::cell::{Ref, RefCell, RefMut};
use core::marker::PhantomData;

use axerrno::{ax_err, AxResult};

use crate::arbiter;
use crate::controller::AdvancedController;
use crate::entry::{self, EntryAction};
use crate::hal::AxVirqHal;
use crate::mailbox::{ExtIntMailbox, ExtIntSender};
use crate::vector::Vector;
use crate::vm::{IrqChipMode, VirqVm};

/// The state of a virtual CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VCpuState {
    /// An invalid state.
    Invalid = 0,
    /// The vcpu is created but not initialized yet.
    Created = 1,
    /// The vcpu is already initialized and can be bound to a physical CPU.
    Free = 2,
    /// The vcpu is bound to a physical CPU and ready to run.
    Ready = 3,
    /// The vcpu is bound to a physical CPU and running.
    Running = 4,
    /// The vcpu is blocked.
    Blocked = 5,
}

/// Whether the vcpu currently runs a nested guest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GuestMode {
    /// The vcpu runs its own guest.
    #[default]
    Flat,
    /// The vcpu runs a nested (L2) guest.
    Nested,
}

/// The raw injection slot, used when the vcpu has no in-kernel local controller.
///
/// The run loop fills it when hardware reports an interrupt that has to be (re)injected and
/// clears it once the interrupt reached the guest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawInjection {
    /// The interrupt to inject.
    pub injected: Option<Vector>,
    /// Raw injections queued since the last completed delivery.
    pub pending_count: u32,
}

/// The configuration for creating a [`VirqVCpu`].
pub struct VirqVCpuConfig {
    /// The id of the vcpu.
    pub id: usize,
    /// The in-kernel local controller. Without one the vcpu runs in raw injection mode.
    pub lapic: Option<Box<dyn AdvancedController>>,
}

/// The constant part of `VirqVCpu`.
struct VirqVCpuInnerConst {
    /// The id of the vcpu.
    id: usize,
    /// The VM the vcpu belongs to.
    vm: Arc<VirqVm>,
}

/// The mutable part of [`VirqVCpu`].
struct VirqVCpuInnerMut {
    /// The state of the vcpu.
    state: VCpuState,
    /// The physical CPU the vcpu was last bound to.
    last_pcpu: Option<usize>,
    raw: RawInjection,
    guest_mode: GuestMode,
    /// Whether hardware-assisted interrupt delivery is active.
    hw_delivery: bool,
}

/// The interrupt delivery state of a virtual CPU.
///
/// Note that:
/// - This struct handles internal mutability itself, almost all the methods are `&self`.
/// - This struct is not thread-safe, it's driven by one thread at a time. The only state
///   written from other threads is the split-mode pending external vector, reached through
///   the [`ExtIntSender`] handed out by [`VirqVCpu::external_vector_sender`].
pub struct VirqVCpu<H: AxVirqHal> {
    /// The constant part of the vcpu.
    inner_const: VirqVCpuInnerConst,
    /// The mutable part of the vcpu.
    inner_mut: RefCell<VirqVCpuInnerMut>,
    /// The in-kernel local controller.
    pub(crate) lapic: Option<RefCell<Box<dyn AdvancedController>>>,
    /// The split-mode pending external vector.
    pending_external_vector: Arc<ExtIntMailbox>,
    _hal: PhantomData<fn() -> H>,
}

impl<H: AxVirqHal> VirqVCpu<H> {
    /// Create a new [`VirqVCpu`] in `vm`.
    pub fn new(vm: Arc<VirqVm>, config: VirqVCpuConfig) -> AxResult<Self> {
        vm.register_vcpu(config.id)?;
        debug!(
            "VM[{}] VCpu[{}] created, local controller: {}",
            vm.id(),
            config.id,
            config.lapic.is_some()
        );
        Ok(Self {
            inner_const: VirqVCpuInnerConst { id: config.id, vm },
            inner_mut: RefCell::new(VirqVCpuInnerMut {
                state: VCpuState::Created,
                last_pcpu: None,
                raw: RawInjection::default(),
                guest_mode: GuestMode::Flat,
                hw_delivery: false,
            }),
            lapic: config.lapic.map(RefCell::new),
            pending_external_vector: Arc::new(ExtIntMailbox::new()),
            _hal: PhantomData,
        })
    }

    /// Get the id of the vcpu.
    pub const fn id(&self) -> usize {
        self.inner_const.id
    }

    /// Get whether the vcpu is the BSP. We always assume the first vcpu (vcpu with id #0) is the BSP.
    pub const fn is_bsp(&self) -> bool {
        self.inner_const.id == 0
    }

    /// Get the VM the vcpu belongs to.
    pub fn vm(&self) -> &Arc<VirqVm> {
        &self.inner_const.vm
    }

    /// Get the state of the vcpu.
    pub fn state(&self) -> VCpuState {
        self.inner_mut.borrow().state
    }

    /// Execute a block with the state of the vcpu transitioned from `from` to `to`. If the current state is not `from`, return an error.
    ///
    /// The state will be set to [`VCpuState::Invalid`] if an error occurs (including the case that the current state is not `from`).
    ///
    /// The state will be set to `to` if the block is executed successfully.
    pub fn with_state_transition<F, T>(&self, from: VCpuState, to: VCpuState, f: F) -> AxResult<T>
    where
        F: FnOnce() -> AxResult<T>,
    {
        let current = self.state();
        if current != from {
            self.inner_mut.borrow_mut().state = VCpuState::Invalid;
            return ax_err!(
                BadState,
                format!("VCpu state is not {:?}, but {:?}", from, current)
            );
        }
        // The block may inspect the vcpu, so no borrow is held while it runs.
        let result = f();
        self.inner_mut.borrow_mut().state = if result.is_err() {
            VCpuState::Invalid
        } else {
            to
        };
        result
    }

    /// Transition the state of the vcpu. If the current state is not `from`, return an error.
    pub fn transition_state(&self, from: VCpuState, to: VCpuState) -> AxResult {
        self.with_state_transition(from, to, || Ok(()))
    }

    /// Finish initialization, making the vcpu available for binding.
    pub fn setup(&self) -> AxResult {
        self.transition_state(VCpuState::Created, VCpuState::Free)
    }

    /// Bind the vcpu to the current physical CPU.
    ///
    /// When the vcpu last ran on another physical CPU, its host-side timers are migrated
    /// before it becomes ready to enter the guest again.
    pub fn bind(&self) -> AxResult {
        self.with_state_transition(VCpuState::Free, VCpuState::Ready, || {
            let pcpu = H::current_pcpu_id();
            let last = self.inner_mut.borrow_mut().last_pcpu.replace(pcpu);
            if matches!(last, Some(last) if last != pcpu) {
                debug!(
                    "VM[{}] VCpu[{}] moved from pCPU {:?} to pCPU {}",
                    self.vm().id(),
                    self.id(),
                    last,
                    pcpu
                );
                arbiter::migrate_timers(self);
            }
            Ok(())
        })
    }

    /// Unbind the vcpu from the current physical CPU.
    pub fn unbind(&self) -> AxResult {
        self.transition_state(VCpuState::Ready, VCpuState::Free)
    }

    /// Enter the guest, deciding interrupt delivery for this entry on the way.
    ///
    /// `window_open` tells whether the guest can take an interrupt right now. The returned
    /// action has already acknowledged its vector, the caller must inject it.
    pub fn enter_guest(&self, window_open: bool) -> AxResult<EntryAction> {
        self.with_state_transition(VCpuState::Ready, VCpuState::Running, || {
            Ok(entry::prepare_guest_entry(self, window_open))
        })
    }

    /// Return from the guest to the host.
    pub fn exit_guest(&self) -> AxResult {
        self.transition_state(VCpuState::Running, VCpuState::Ready)
    }

    /// Block the vcpu, e.g. on a guest halt.
    pub fn block(&self) -> AxResult {
        self.transition_state(VCpuState::Ready, VCpuState::Blocked)
    }

    /// Make a blocked vcpu ready again if it has a wake event.
    ///
    /// Returns `false` and stays blocked when nothing is pending.
    pub fn try_wake(&self) -> AxResult<bool> {
        let current = self.state();
        if current != VCpuState::Blocked {
            return ax_err!(
                BadState,
                format!("VCpu state is not {:?}, but {:?}", VCpuState::Blocked, current)
            );
        }
        if !entry::has_wake_events(self) {
            return Ok(false);
        }
        self.transition_state(VCpuState::Blocked, VCpuState::Ready)?;
        Ok(true)
    }

    /// The physical CPU the vcpu was last bound to.
    pub fn last_pcpu(&self) -> Option<usize> {
        self.inner_mut.borrow().last_pcpu
    }

    /// Whether the vcpu has an in-kernel local controller.
    pub fn has_lapic(&self) -> bool {
        self.lapic.is_some()
    }

    /// Borrow the in-kernel local controller.
    pub fn lapic(&self) -> Option<Ref<'_, Box<dyn AdvancedController>>> {
        self.lapic.as_ref().map(RefCell::borrow)
    }

    /// Mutably borrow the in-kernel local controller.
    pub fn lapic_mut(&self) -> Option<RefMut<'_, Box<dyn AdvancedController>>> {
        self.lapic.as_ref().map(RefCell::borrow_mut)
    }

    pub(crate) fn ext_int_mailbox(&self) -> &ExtIntMailbox {
        &self.pending_external_vector
    }

    fn check_split_mode(&self) -> AxResult {
        match self.vm().irqchip_mode() {
            IrqChipMode::KernelSplit => Ok(()),
            mode => ax_err!(
                BadState,
                format!(
                    "VM[{}] VCpu[{}] has no pending external vector in {:?} mode",
                    self.vm().id(),
                    self.id(),
                    mode
                )
            ),
        }
    }

    /// Post a legacy-class vector acknowledged by the userspace controller.
    ///
    /// Only valid in split mode, the in-kernel legacy controller is the source otherwise.
    pub fn post_external_vector(&self, vector: Vector) -> AxResult {
        self.check_split_mode()?;
        self.pending_external_vector.post(vector)
    }

    /// A handle for posting external vectors from another thread. Split mode only.
    pub fn external_vector_sender(&self) -> AxResult<ExtIntSender> {
        self.check_split_mode()?;
        Ok(ExtIntSender::new(self.pending_external_vector.clone()))
    }

    /// The posted external vector not drained yet.
    pub fn pending_external_vector(&self) -> Option<Vector> {
        self.pending_external_vector.peek()
    }

    /// A snapshot of the raw injection slot.
    pub fn raw_injection(&self) -> RawInjection {
        self.inner_mut.borrow().raw
    }

    /// Queue `vector` for raw injection.
    pub fn queue_raw_interrupt(&self, vector: Vector) {
        let mut inner = self.inner_mut.borrow_mut();
        inner.raw.injected = Some(vector);
        inner.raw.pending_count = inner.raw.pending_count.saturating_add(1);
    }

    /// Clear the raw injection slot after the interrupt reached the guest.
    pub fn complete_raw_interrupt(&self) -> Option<Vector> {
        let mut inner = self.inner_mut.borrow_mut();
        inner.raw.pending_count = 0;
        inner.raw.injected.take()
    }

    /// Whether the vcpu runs a nested guest.
    pub fn guest_mode(&self) -> GuestMode {
        self.inner_mut.borrow().guest_mode
    }

    /// Record a switch between the vcpu's own guest and a nested guest.
    pub fn set_guest_mode(&self, mode: GuestMode) {
        self.inner_mut.borrow_mut().guest_mode = mode;
    }

    /// Whether hardware-assisted interrupt delivery is active.
    pub fn hw_delivery_active(&self) -> bool {
        self.inner_mut.borrow().hw_delivery
    }

    /// Activate or deactivate hardware-assisted interrupt delivery.
    pub fn set_hw_delivery(&self, active: bool) {
        self.inner_mut.borrow_mut().hw_delivery = active;
    }
}
