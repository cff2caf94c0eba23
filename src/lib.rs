// Copyright 2025 The Axvisor Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! AxVirq - Virtual interrupt arbitration for ArceOS hypervisors.
//!
//! This crate decides, for one virtual CPU, whether an interrupt is pending and which vector
//! to deliver to the guest. It combines the sources of a VM's interrupt controllers:
//! the legacy controller (emulated in kernel, or in userspace with the split controller
//! model), the per-vcpu local controller, and raw injection for vcpus without a local
//! controller. Controller emulation itself is left to implementations of the
//! [`LegacyController`] and [`AdvancedController`] traits.
//!
//! # Features
//!
//! - Legacy-first interrupt arbitration with consuming delivery ([`arbiter`])
//! - Lock-free split-controller pending vector slot ([`ExtIntSender`])
//! - Controller mode selection and irqfd admission per VM ([`VirqVm`])
//! - VCpu lifecycle (Created → Free → Ready ⇄ Running / Blocked) with timer migration on rebinding
//! - Guest entry decisions for the run loop ([`entry`])

#![no_std]

#[macro_use]
extern crate alloc;
#[macro_use]
extern crate log;

// Core modules
pub mod addr; // Guest and host address types
pub mod arbiter; // Interrupt presence and delivery decisions
mod controller; // External interrupt controller contracts
pub mod entry; // Guest entry helpers for the vcpu run loop
mod hal; // Hardware abstraction layer interfaces
pub mod hypercall; // SMCCC register convention helpers
mod irqfd; // irqfd admission
mod mailbox; // Split-controller pending external vector
mod vcpu; // Per-vcpu interrupt state
mod vector; // Interrupt vector type
mod vm; // Per-VM controller configuration

// Public API exports
pub use controller::{AdvancedController, LegacyController, PeriodicTimer};
pub use entry::EntryAction;
pub use hal::AxVirqHal; // Hardware abstraction layer trait
pub use hypercall::RegisterAccess;
pub use irqfd::{IrqfdArgs, IrqfdFlags};
pub use mailbox::ExtIntSender;
pub use vcpu::*;
pub use vector::{Vector, NO_VECTOR, NR_VECTORS};
pub use vm::*;
