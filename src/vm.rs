use alloc::collections::BTreeSet;
use alloc::sync::Arc;

use axerrno::{ax_err, AxResult};
use spin::{Mutex, Once};

use crate::controller::{LegacyController, PeriodicTimer};

/// The default upper bound of vcpus per VM.
pub const DEFAULT_MAX_VCPUS: usize = 255;

/// How interrupt controllers of a VM are emulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqChipMode {
    /// No in-kernel interrupt controller.
    None,
    /// Both the legacy controller and the local controllers are emulated in kernel.
    KernelFull,
    /// Local controllers are emulated in kernel, the legacy controller and its routing are
    /// delegated to userspace.
    KernelSplit,
}

impl IrqChipMode {
    /// Whether any controller is emulated in kernel.
    pub const fn in_kernel(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the legacy controller is emulated in kernel too.
    pub const fn is_kernel_full(self) -> bool {
        matches!(self, Self::KernelFull)
    }

    /// Whether the legacy controller lives in userspace.
    pub const fn is_split(self) -> bool {
        matches!(self, Self::KernelSplit)
    }
}

/// The in-kernel interrupt controller configuration of a VM.
///
/// The legacy controller only exists in [`IrqChip::KernelFull`], so the split mode can not
/// consult it by construction.
pub enum IrqChip {
    /// Fully kernel-emulated controllers.
    KernelFull {
        /// The legacy controller shared by all vcpus.
        pic: Arc<dyn LegacyController>,
    },
    /// Split controllers, with external interrupts posted by userspace to each vcpu through
    /// an [`ExtIntSender`](crate::ExtIntSender).
    KernelSplit,
}

impl IrqChip {
    /// The mode this configuration implements.
    pub const fn mode(&self) -> IrqChipMode {
        match self {
            Self::KernelFull { .. } => IrqChipMode::KernelFull,
            Self::KernelSplit => IrqChipMode::KernelSplit,
        }
    }
}

/// The configuration for creating a [`VirqVm`].
#[derive(Clone, Copy, Debug)]
pub struct VirqVmConfig {
    /// The id of the VM.
    pub id: usize,
    /// The maximum number of vcpus.
    pub max_vcpus: usize,
}

impl Default for VirqVmConfig {
    fn default() -> Self {
        Self {
            id: 0,
            max_vcpus: DEFAULT_MAX_VCPUS,
        }
    }
}

/// The VM-wide interrupt state shared by all vcpus.
///
/// The controller mode is chosen once, after the VM is created and before its first vcpu.
/// Callers serialize VM configuration against vcpu creation.
pub struct VirqVm {
    id: usize,
    max_vcpus: usize,
    vcpu_ids: Mutex<BTreeSet<usize>>,
    irqchip: Once<IrqChip>,
    pit: Once<Arc<dyn PeriodicTimer>>,
}

impl VirqVm {
    /// Create a VM without any in-kernel interrupt controller.
    pub fn new(config: VirqVmConfig) -> Self {
        Self {
            id: config.id,
            max_vcpus: config.max_vcpus,
            vcpu_ids: Mutex::new(BTreeSet::new()),
            irqchip: Once::new(),
            pit: Once::new(),
        }
    }

    /// The id of the VM.
    pub const fn id(&self) -> usize {
        self.id
    }

    /// The maximum number of vcpus.
    pub const fn max_vcpus(&self) -> usize {
        self.max_vcpus
    }

    /// The number of vcpus created so far.
    pub fn created_vcpus(&self) -> usize {
        self.vcpu_ids.lock().len()
    }

    /// Create fully kernel-emulated controllers backed by `pic`.
    pub fn create_irqchip(&self, pic: Arc<dyn LegacyController>) -> AxResult {
        self.install_irqchip(IrqChip::KernelFull { pic })
    }

    /// Create kernel-emulated local controllers, with the legacy controller left to
    /// userspace.
    pub fn enable_split_irqchip(&self) -> AxResult {
        self.install_irqchip(IrqChip::KernelSplit)
    }

    fn install_irqchip(&self, chip: IrqChip) -> AxResult {
        if self.created_vcpus() != 0 {
            return ax_err!(
                BadState,
                format!("VM[{}] irqchip must be created before any vcpu", self.id)
            );
        }

        let mode = chip.mode();
        let mut installed = false;
        self.irqchip.call_once(|| {
            installed = true;
            chip
        });
        if !installed {
            return ax_err!(
                AlreadyExists,
                format!("VM[{}] already has an irqchip", self.id)
            );
        }

        debug!("VM[{}] irqchip created: {:?}", self.id, mode);
        Ok(())
    }

    /// Attach the legacy periodic interval timer.
    pub fn create_pit(&self, pit: Arc<dyn PeriodicTimer>) -> AxResult {
        let mut installed = false;
        self.pit.call_once(|| {
            installed = true;
            pit
        });
        if installed {
            debug!("VM[{}] periodic timer created", self.id);
            Ok(())
        } else {
            ax_err!(AlreadyExists, format!("VM[{}] already has a PIT", self.id))
        }
    }

    /// The in-kernel controller configuration, `None` when no controller was created.
    pub fn irqchip(&self) -> Option<&IrqChip> {
        self.irqchip.get()
    }

    /// The controller mode.
    pub fn irqchip_mode(&self) -> IrqChipMode {
        self.irqchip().map_or(IrqChipMode::None, IrqChip::mode)
    }

    /// The legacy periodic interval timer, if any.
    pub fn pit(&self) -> Option<&Arc<dyn PeriodicTimer>> {
        self.pit.get()
    }

    /// Account for a new vcpu. Every id below `max_vcpus` can be used once.
    pub(crate) fn register_vcpu(&self, vcpu_id: usize) -> AxResult {
        if vcpu_id >= self.max_vcpus {
            return ax_err!(
                InvalidInput,
                format!("VM[{}] vcpu id {} out of range", self.id, vcpu_id)
            );
        }
        let mut ids = self.vcpu_ids.lock();
        if ids.contains(&vcpu_id) {
            return ax_err!(
                AlreadyExists,
                format!("VM[{}] vcpu id {} already exists", self.id, vcpu_id)
            );
        }
        ids.insert(vcpu_id);
        Ok(())
    }
}
