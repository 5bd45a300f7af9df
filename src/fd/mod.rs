//! File Descriptors
//!
//! Each process owns a `FdTable` mapping small integers to resources.
//!
//! # Design
//! - Console streams and files share one slot space but are distinct
//!   variants of `FdEntry`, never magic handle values
//! - Descriptors created by `dup2` share one `FileHandle`
//!
//! # Security Properties
//! - Descriptor numbers from user space are range-checked into `Fd`
//! - A storage file object is released exactly once
//! - A full table never leaks the file that was opened for it

pub mod handle;
pub mod table;

pub use handle::{FileHandle, SharedFile};
pub use table::{Fd, FdEntry, FdError, FdTable, Stream, FD_LIMIT};
