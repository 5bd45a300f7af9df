//! Shared Kernel Context
//!
//! `Kernel` is the state every process's syscalls share: the storage engine
//! behind the global file-system lock, and the console.
//!
//! # Design
//! - One `Kernel` per machine, shared by reference between CPUs and threads
//! - Per-process state is passed in separately, by `&mut`, so two syscalls
//!   of the same process can never interleave on it

use alloc::format;

use crate::console::Console;
use crate::filesys::{FileSystem, FsLock};
use crate::mm::{AddressSpace, MappingError, VirtAddr, PAGE_SIZE};
use crate::process::Process;
use crate::syscall::Disposition;

/// Storage engine and console shared by all processes.
pub struct Kernel<S, C> {
    fs: FsLock<S>,
    console: C,
}

impl<S: FileSystem, C: Console> Kernel<S, C> {
    pub const fn new(engine: S, console: C) -> Self {
        Self {
            fs: FsLock::new(engine),
            console,
        }
    }

    /// The storage engine and its lock.
    #[inline]
    pub fn fs(&self) -> &FsLock<S> {
        &self.fs
    }

    #[inline]
    pub fn console(&self) -> &C {
        &self.console
    }

    /// Populate one page of a file mapping. Called by the fault resolver on
    /// the first access to a lazily mapped page.
    pub fn page_in(
        &self,
        process: &mut Process<S::File>,
        va: VirtAddr,
        frame: &mut [u8; PAGE_SIZE],
    ) -> Result<(), MappingError> {
        process.maps_mut().page_in(&self.fs, va, frame)
    }

    /// Tear a process down: unmap every region, close every descriptor,
    /// record the status and print the exit message.
    pub fn terminate<V: AddressSpace>(
        &self,
        process: &mut Process<S::File>,
        vm: &mut V,
        name: &str,
        status: i32,
    ) -> Disposition {
        process.maps_mut().unmap_all(&self.fs, vm);
        process.fds_mut().close_all(&self.fs);
        process.set_exit_status(status);

        self.console
            .putbuf(format!("{}: exit({})\n", name, status).as_bytes());
        log::info!("{} exited with status {}", name, status);
        Disposition::Exit(status)
    }
}
