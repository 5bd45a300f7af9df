//! Memory management for user processes
//!
//! Provides:
//! - Typed user virtual addresses and the fixed user layout
//! - The interface to the external VM resolver (`AddressSpace`)
//! - File-backed, lazily populated memory mappings (mmap/munmap)
//!
//! # Security Principles
//! - Every range is checked for overflow and kernel-half overlap
//! - Mappings never overlap each other or reserved regions
//! - No page is populated at map time

pub mod address;
pub mod mmap;
pub mod paging;

pub use address::{VirtAddr, PAGE_SIZE};
pub use mmap::{MapRequest, MapTable, MappedPage, MemoryMapRegion};
pub use paging::{AddressSpace, MappingError, PageFlags};
