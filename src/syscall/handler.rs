//! System Call Handler
//!
//! Decodes the trap frame, dispatches to one handler and writes the result
//! back.
//!
//! # Security Considerations
//! - All syscall numbers are checked against the table below
//! - Unknown syscalls terminate the caller with status -1
//! - A bad user pointer anywhere in a call terminates the caller with -1;
//!   every other failure is reported through the return value

use crate::console::Console;
use crate::fd::FdError;
use crate::filesys::FileSystem;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, MappingError};
use crate::process::{Lifecycle, Process};
use crate::trap::TrapFrame;

use super::{file, memory, process};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u64 = 0;
    pub const SYS_EXIT: u64 = 1;
    pub const SYS_FORK: u64 = 2;
    pub const SYS_EXEC: u64 = 3;
    pub const SYS_WAIT: u64 = 4;
    pub const SYS_CREATE: u64 = 5;
    pub const SYS_REMOVE: u64 = 6;
    pub const SYS_OPEN: u64 = 7;
    pub const SYS_FILESIZE: u64 = 8;
    pub const SYS_READ: u64 = 9;
    pub const SYS_WRITE: u64 = 10;
    pub const SYS_SEEK: u64 = 11;
    pub const SYS_TELL: u64 = 12;
    pub const SYS_CLOSE: u64 = 13;
    pub const SYS_MMAP: u64 = 14;
    pub const SYS_MUNMAP: u64 = 15;
    pub const SYS_DUP2: u64 = 22;
}

/// System call error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// An argument is out of range or names nothing usable
    InvalidArgument,
    /// A user pointer failed validation; the caller is terminated
    InvalidPointer,
    /// A table or allocator is full
    ResourceExhausted,
    /// The named file or object does not exist
    ResourceNotFound,
    /// A mapping would overlap an existing one
    ConflictingMapping,
    /// The storage engine or lifecycle collaborator failed
    Io,
}

impl core::fmt::Display for SyscallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::InvalidPointer => write!(f, "invalid user pointer"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),
            Self::ResourceNotFound => write!(f, "resource not found"),
            Self::ConflictingMapping => write!(f, "conflicting mapping"),
            Self::Io => write!(f, "I/O failure"),
        }
    }
}

impl From<FdError> for SyscallError {
    fn from(err: FdError) -> Self {
        match err {
            FdError::BadDescriptor => Self::InvalidArgument,
            FdError::TableFull => Self::ResourceExhausted,
            FdError::NotFound => Self::ResourceNotFound,
            FdError::Io => Self::Io,
        }
    }
}

impl From<MappingError> for SyscallError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::AlreadyMapped | MappingError::Overlap => Self::ConflictingMapping,
            MappingError::OutOfMemory => Self::ResourceExhausted,
            MappingError::NotMapped => Self::ResourceNotFound,
            MappingError::MisalignedAddress
            | MappingError::OutOfRange
            | MappingError::NotMappable
            | MappingError::EmptyRange => Self::InvalidArgument,
        }
    }
}

/// What the trap glue does after a syscall returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Return to user space through the (possibly rewritten) frame.
    Resume,
    /// The process has been torn down with this status; schedule away.
    Exit(i32),
    /// The machine is powering off.
    Halt,
}

/// The calling process and the collaborators that act on its behalf.
pub struct Current<'a, F, V, L> {
    pub process: &'a mut Process<F>,
    pub vm: &'a mut V,
    pub lifecycle: &'a mut L,
}

/// A handler's result: `Some(value)` for the return slot, `None` for calls
/// that return nothing.
pub(super) type Outcome = Result<Option<u64>, SyscallError>;

/// Failure value for calls that report -1.
const FAIL: u64 = -1i64 as u64;

/// Dispatch one system call.
///
/// The syscall number is read from `rax` and the arguments from `rdi`,
/// `rsi`, `rdx`, `r10`, `r8` and `r9`. The return value, if the call has
/// one, is written back to `rax`.
pub fn dispatch<S, C, V, L>(
    kernel: &Kernel<S, C>,
    cur: &mut Current<'_, S::File, V, L>,
    frame: &mut TrapFrame,
) -> Disposition
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
    L: Lifecycle<S::File>,
{
    use numbers::*;

    cur.process.record_user_rsp(frame);
    let number = frame.number();
    log::trace!("syscall {} from {}", number, cur.lifecycle.name());

    let (outcome, failure): (Outcome, u64) = match number {
        SYS_HALT => {
            process::halt(cur);
            return Disposition::Halt;
        }
        SYS_EXIT => {
            let status = frame.arg(0) as i32;
            return kernel.terminate(cur.process, cur.vm, cur.lifecycle.name(), status);
        }
        SYS_FORK => (process::fork(kernel, cur, frame), FAIL),
        SYS_EXEC => match process::exec(kernel, cur, frame) {
            Ok(()) => return Disposition::Resume,
            Err(err) => {
                log::debug!("exec failed: {}", err);
                return kernel.terminate(cur.process, cur.vm, cur.lifecycle.name(), -1);
            }
        },
        SYS_WAIT => (process::wait(cur, frame), FAIL),
        SYS_CREATE => (file::create(kernel, cur, frame), 0),
        SYS_REMOVE => (file::remove(kernel, cur, frame), 0),
        SYS_OPEN => (file::open(kernel, cur, frame), FAIL),
        SYS_FILESIZE => (file::filesize(kernel, cur, frame), FAIL),
        SYS_READ => (file::read(kernel, cur, frame), FAIL),
        SYS_WRITE => (file::write(kernel, cur, frame), FAIL),
        SYS_SEEK => (file::seek(cur, frame), FAIL),
        SYS_TELL => (file::tell(cur, frame), u32::MAX as u64),
        SYS_CLOSE => (file::close(kernel, cur, frame), FAIL),
        SYS_DUP2 => (file::dup2(kernel, cur, frame), FAIL),
        SYS_MMAP => (memory::mmap(kernel, cur, frame), 0),
        SYS_MUNMAP => (memory::munmap(kernel, cur, frame), FAIL),
        _ => {
            log::warn!("unknown syscall {} from {}", number, cur.lifecycle.name());
            return kernel.terminate(cur.process, cur.vm, cur.lifecycle.name(), -1);
        }
    };

    match outcome {
        Ok(Some(value)) => frame.set_return(value),
        Ok(None) => {}
        Err(SyscallError::InvalidPointer) => {
            return kernel.terminate(cur.process, cur.vm, cur.lifecycle.name(), -1);
        }
        Err(err) => {
            log::debug!("syscall {} failed: {}", number, err);
            frame.set_return(failure);
        }
    }
    Disposition::Resume
}
