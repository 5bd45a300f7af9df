//! System Call Interface
//!
//! The boundary between user processes and the kernel.
//!
//! # Security Model
//! - Whitelist approach: only the syscalls in `numbers` are served
//! - All user pointers are validated before use
//! - Invalid inputs return failure values or terminate the caller, never panic
//!
//! # Syscalls
//! - Process: halt, exit, fork, exec, wait
//! - Files: create, remove, open, filesize, read, write, seek, tell, close,
//!   dup2
//! - Memory: mmap, munmap

mod file;
mod handler;
mod memory;
mod process;
pub mod validate;


pub use handler::{dispatch, numbers, Current, Disposition, SyscallError};
pub use validate::{UserBuffer, UserBufferMut};
