//! SMCCC hypercall argument access.
//!
//! Function id in `x0`, arguments in `x1`..`x3`, results returned in `x0`..`x3`.

/// Access to a vcpu's general-purpose registers.
pub trait RegisterAccess {
    /// Gets the value of a general-purpose register.
    fn gpr(&self, reg: usize) -> usize;

    /// Sets the value of a general-purpose register.
    fn set_gpr(&mut self, reg: usize, val: usize);
}

/// The SMCCC function id of the pending call.
pub fn smccc_get_function(regs: &impl RegisterAccess) -> u32 {
    regs.gpr(0) as u32
}

/// The argument passed in `x1`.
pub fn smccc_get_arg1(regs: &impl RegisterAccess) -> usize {
    regs.gpr(1)
}

/// The argument passed in `x2`.
pub fn smccc_get_arg2(regs: &impl RegisterAccess) -> usize {
    regs.gpr(2)
}

/// The argument passed in `x3`.
pub fn smccc_get_arg3(regs: &impl RegisterAccess) -> usize {
    regs.gpr(3)
}

/// Write the four result registers of the call.
pub fn smccc_set_retval(regs: &mut impl RegisterAccess, a0: usize, a1: usize, a2: usize, a3: usize) {
    regs.set_gpr(0, a0);
    regs.set_gpr(1, a1);
    regs.set_gpr(2, a2);
    regs.set_gpr(3, a3);
}
