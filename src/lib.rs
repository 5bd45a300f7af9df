//! userprog - User-Program Syscall Boundary
//!
//! The trusted layer between unprivileged user processes and the kernel:
//! it decodes syscall requests, validates every user pointer, keeps each
//! process's table of open descriptors, and manages lazily populated
//! file-backed memory mappings.
//!
//! # Security Features
//! - No user pointer is dereferenced before it is validated against the
//!   page table and the VM resolver
//! - A bad pointer or an unknown syscall terminates the caller, never the
//!   kernel
//! - All storage-engine access is serialized by one scoped lock
//! - Descriptor slots are a tagged enum; console streams are never confused
//!   with file handles
//!
//! # Collaborators
//! The storage engine (`filesys::FileSystem`), the VM resolver
//! (`mm::AddressSpace`), the console driver (`console::Console`) and process
//! lifecycle (`process::Lifecycle`) live outside this crate.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod console;
pub mod fd;
pub mod filesys;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod testing;

pub use kernel::Kernel;
pub use process::{Lifecycle, Pid, Process};
pub use syscall::{dispatch, Current, Disposition, SyscallError};
pub use trap::TrapFrame;
