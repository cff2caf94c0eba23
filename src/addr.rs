use memory_addr::{def_usize_addr, def_usize_addr_formatter, PAGE_SIZE_4K};

def_usize_addr! {
    /// Guest virtual address.
    pub type GuestVirtAddr;
    /// Guest physical address.
    pub type GuestPhysAddr;
    /// Host virtual address.
    pub type HostVirtAddr;
    /// Host physical address.
    pub type HostPhysAddr;
}

def_usize_addr_formatter! {
    GuestVirtAddr = "GVA:{}";
    GuestPhysAddr = "GPA:{}";
    HostVirtAddr = "HVA:{}";
    HostPhysAddr = "HPA:{}";
}

/// Guest frame number.
pub type Gfn = usize;
/// Host frame number.
pub type Hfn = usize;

/// A guest physical address that never maps anything.
pub const GPA_INVALID: GuestPhysAddr = GuestPhysAddr::from_usize(usize::MAX);

const PAGE_SHIFT: usize = PAGE_SIZE_4K.trailing_zeros() as usize;

/// The frame containing `gpa`.
pub const fn gpa_to_gfn(gpa: GuestPhysAddr) -> Gfn {
    gpa.as_usize() >> PAGE_SHIFT
}

/// The first address of frame `gfn`.
pub const fn gfn_to_gpa(gfn: Gfn) -> GuestPhysAddr {
    GuestPhysAddr::from_usize(gfn << PAGE_SHIFT)
}
