//! User Virtual Address Types
//!
//! Type-safe wrapper for user-supplied virtual addresses. Everything a user
//! process hands the kernel arrives as a raw register value; it becomes a
//! `VirtAddr` before any range or page arithmetic is done on it.
//!
//! # Security Properties
//! - Page arithmetic is checked, never wrapping
//! - Kernel-half addresses are rejected by `is_user`
//! - There is no conversion to a pointer; user memory is only reached
//!   through `AddressSpace::read_user`/`write_user`

use core::fmt;
use core::ops::Range;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Fixed user address-space layout.
pub mod layout {
    /// First kernel virtual address. Everything below is user space.
    pub const KERN_BASE: usize = 0x80_0400_0000;
    /// Top of the initial user stack (grows downward).
    pub const USER_STACK: usize = 0x4748_0000;
    /// Maximum size the user stack may grow to.
    pub const STACK_LIMIT: usize = 1 << 20;
}

/// Round `len` up to a whole number of pages, `None` on overflow.
#[inline]
pub const fn page_round_up(len: usize) -> Option<usize> {
    match len.checked_add(PAGE_MASK) {
        Some(v) => Some(v & !PAGE_MASK),
        None => None,
    }
}

/// A user virtual address.
///
/// Unlike a kernel pointer, this carries no promise that anything is mapped
/// there. Only the validator turns it into something a handler may read.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Null address.
    pub const NULL: Self = Self(0);

    /// Create a virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Create from a raw syscall argument register.
    #[inline]
    pub const fn from_arg(arg: u64) -> Self {
        Self(arg as usize)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Get the raw address as u64.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Add an offset, `None` if the result would wrap.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Check if this is a user address (below `KERN_BASE`).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < layout::KERN_BASE
    }

    /// Check if this is a kernel address.
    #[inline]
    pub const fn is_kernel(self) -> bool {
        !self.is_user()
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#018x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Iterate the page-aligned addresses of every page touched by `range`.
///
/// An empty range yields nothing.
pub fn pages_in(range: Range<VirtAddr>) -> impl Iterator<Item = VirtAddr> {
    let start = range.start.align_down().as_usize();
    let end = if range.start < range.end {
        range.end.as_usize()
    } else {
        start
    };
    (start..end).step_by(PAGE_SIZE).map(VirtAddr::new)
}

/// Check whether two half-open address ranges intersect.
#[inline]
pub fn overlaps(a: &Range<VirtAddr>, b: &Range<VirtAddr>) -> bool {
    a.start < b.end && b.start < a.end
}
