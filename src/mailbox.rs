use alloc::sync::Arc;
use core::sync::atomic::{AtomicI32, Ordering};

use axerrno::{ax_err, AxResult};

use crate::vector::{Vector, NO_VECTOR};

/// The split-controller "pending external vector" slot of a vcpu.
///
/// In split mode the legacy controller lives in userspace, which hands the acknowledged
/// vector to the vcpu through this slot. The slot is written from the userspace-facing
/// delivery path and drained from the vcpu's own thread, so both sides go through atomic
/// read-modify-write operations and a vector is never lost nor delivered twice.
///
/// Producers only reach the slot through an [`ExtIntSender`], which exists in split mode only.
#[derive(Debug)]
pub(crate) struct ExtIntMailbox {
    slot: AtomicI32,
}

impl ExtIntMailbox {
    /// Create an empty mailbox.
    pub const fn new() -> Self {
        Self {
            slot: AtomicI32::new(NO_VECTOR),
        }
    }

    /// Post a vector.
    ///
    /// The producer must wait for the previous vector to be drained; posting into an
    /// occupied slot fails with `ResourceBusy` and keeps the earlier vector.
    pub fn post(&self, vector: Vector) -> AxResult {
        match self.slot.compare_exchange(
            NO_VECTOR,
            Vector::to_raw(Some(vector)),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(occupied) => ax_err!(
                ResourceBusy,
                format!(
                    "external vector {} posted while {:?} is still pending",
                    vector,
                    Vector::from_raw(occupied)
                )
            ),
        }
    }

    /// The pending vector, if any. The slot is left untouched.
    pub fn peek(&self) -> Option<Vector> {
        Vector::from_raw(self.slot.load(Ordering::Acquire))
    }

    /// Whether a vector is waiting to be drained.
    pub fn is_pending(&self) -> bool {
        self.peek().is_some()
    }

    /// Drain the slot, returning the vector that was pending.
    pub fn take(&self) -> Option<Vector> {
        Vector::from_raw(self.slot.swap(NO_VECTOR, Ordering::AcqRel))
    }
}

impl Default for ExtIntMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// The producer side of a vcpu's pending external vector slot.
///
/// Obtained with [`VirqVCpu::external_vector_sender`](crate::VirqVCpu::external_vector_sender)
/// on a VM in split mode, and moved to the userspace-facing delivery path.
#[derive(Clone, Debug)]
pub struct ExtIntSender {
    mailbox: Arc<ExtIntMailbox>,
}

impl ExtIntSender {
    pub(crate) fn new(mailbox: Arc<ExtIntMailbox>) -> Self {
        Self { mailbox }
    }

    /// Post a vector to the vcpu. Fails with `ResourceBusy` until the previous one is drained.
    pub fn post(&self, vector: Vector) -> AxResult {
        self.mailbox.post(vector)
    }

    /// Whether the previously posted vector is still waiting.
    pub fn is_pending(&self) -> bool {
        self.mailbox.is_pending()
    }
}
