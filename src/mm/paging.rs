//! Page State and the Address-Space Interface
//!
//! The page-fault resolver and its supplemental page table live outside this
//! crate. This module defines what the syscall layer needs from them: a
//! page-table walk, a metadata lookup, lazy page registration and release,
//! and copies to and from already-validated user memory.
//!
//! # Security Properties
//! - Page state is strictly typed (`PageFlags`) instead of raw PTE bits
//! - The syscall layer never dereferences user memory directly; every access
//!   goes through `read_user`/`write_user` after validation

use bitflags::bitflags;

use super::address::VirtAddr;

bitflags! {
    /// State of one user page as recorded by the VM resolver.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        /// A physical frame currently backs the page.
        const PRESENT = 1 << 0;
        /// User writes are permitted.
        const WRITABLE = 1 << 1;
        /// The page was written since it was populated.
        const DIRTY = 1 << 2;
        /// The page is populated from a file mapping.
        const FILE_BACKED = 1 << 3;
        /// The page belongs to the user stack.
        const STACK = 1 << 4;
    }
}

/// Error type for page mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The virtual address is already mapped.
    AlreadyMapped,
    /// The virtual address is not mapped.
    NotMapped,
    /// No memory left for page metadata.
    OutOfMemory,
    /// The address is not properly aligned.
    MisalignedAddress,
    /// The range reaches into kernel space or wraps.
    OutOfRange,
    /// The range intersects a mapping or reserved region.
    Overlap,
    /// The descriptor cannot back a mapping.
    NotMappable,
    /// Zero-length request.
    EmptyRange,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
            Self::NotMapped => write!(f, "virtual address not mapped"),
            Self::OutOfMemory => write!(f, "out of memory for page metadata"),
            Self::MisalignedAddress => write!(f, "address not properly aligned"),
            Self::OutOfRange => write!(f, "range outside user space"),
            Self::Overlap => write!(f, "range overlaps an existing mapping"),
            Self::NotMappable => write!(f, "descriptor cannot be mapped"),
            Self::EmptyRange => write!(f, "zero-length mapping"),
        }
    }
}

/// The current process's address space, as seen from the syscall layer.
///
/// Implemented by the VM resolver. All addresses passed in are user
/// addresses; `read_user`/`write_user` are only called on ranges the
/// validator has accepted, and may fault pages in on the way.
pub trait AddressSpace {
    /// Page-table walk: does the page table reach a leaf entry slot for `va`?
    fn walk(&self, va: VirtAddr) -> bool;

    /// Supplemental page table lookup for the page containing `va`.
    fn find_page(&self, va: VirtAddr) -> Option<PageFlags>;

    /// Register a not-yet-populated page at page-aligned `va`.
    ///
    /// The resolver populates it on first access (for file mappings, by
    /// calling back into `Kernel::page_in`).
    fn reserve_lazy(&mut self, va: VirtAddr, flags: PageFlags) -> Result<(), MappingError>;

    /// Drop the page at `va`: its frame, its page-table entry and its
    /// metadata.
    fn release(&mut self, va: VirtAddr);

    /// Copy `buf.len()` bytes out of user memory starting at `va`.
    fn read_user(&self, va: VirtAddr, buf: &mut [u8]);

    /// Copy `buf` into user memory starting at `va`.
    fn write_user(&mut self, va: VirtAddr, buf: &[u8]);
}
