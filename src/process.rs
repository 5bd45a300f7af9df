//! Per-Process State and the Lifecycle Interface
//!
//! `Process` is the part of a user process this crate owns: its descriptor
//! table, its file mappings and the address ranges the loader reserved.
//! Thread identity, image loading, fork and wait belong to the lifecycle
//! collaborator.

use alloc::vec::Vec;
use core::ops::Range;

use crate::fd::FdTable;
use crate::filesys::{FileSystem, FsLock};
use crate::mm::address::layout;
use crate::mm::{AddressSpace, MapRequest, MapTable, MappingError, VirtAddr};
use crate::trap::TrapFrame;

/// Process identifier as seen by user space.
pub type Pid = i32;

/// State of one user process.
#[derive(Debug)]
pub struct Process<F> {
    fds: FdTable<F>,
    maps: MapTable<F>,
    /// Stack and executable image ranges. Mappings may not overlap them.
    reserved: Vec<Range<VirtAddr>>,
    user_rsp: u64,
    exit_status: Option<i32>,
}

impl<F> Process<F> {
    /// A process with a fresh descriptor table and the given reserved
    /// ranges.
    pub fn new(reserved: Vec<Range<VirtAddr>>) -> Self {
        Self::with_fds(FdTable::new(), reserved)
    }

    /// A process starting from an existing descriptor table (a fork child).
    pub fn with_fds(fds: FdTable<F>, reserved: Vec<Range<VirtAddr>>) -> Self {
        Self {
            fds,
            maps: MapTable::new(),
            reserved,
            user_rsp: 0,
            exit_status: None,
        }
    }

    #[inline]
    pub fn fds(&self) -> &FdTable<F> {
        &self.fds
    }

    #[inline]
    pub fn fds_mut(&mut self) -> &mut FdTable<F> {
        &mut self.fds
    }

    #[inline]
    pub fn maps(&self) -> &MapTable<F> {
        &self.maps
    }

    #[inline]
    pub fn maps_mut(&mut self) -> &mut MapTable<F> {
        &mut self.maps
    }

    pub fn reserved(&self) -> &[Range<VirtAddr>] {
        &self.reserved
    }

    /// Replace the reserved ranges after a new image is loaded.
    pub fn set_reserved(&mut self, reserved: Vec<Range<VirtAddr>>) {
        self.reserved = reserved;
    }

    /// Remember the user stack pointer the last syscall entered with. The
    /// fault resolver uses it to tell stack growth from stray accesses.
    #[inline]
    pub fn record_user_rsp(&mut self, frame: &TrapFrame) {
        self.user_rsp = frame.rsp;
    }

    #[inline]
    pub fn user_rsp(&self) -> u64 {
        self.user_rsp
    }

    #[inline]
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    pub(crate) fn set_exit_status(&mut self, status: i32) {
        self.exit_status = Some(status);
    }
}

impl<F: Send> Process<F> {
    /// Map the file behind descriptor `fd` as described by `req`.
    ///
    /// Console descriptors and unused slots cannot be mapped.
    pub fn map_file<S, V>(
        &mut self,
        fs: &FsLock<S>,
        vm: &mut V,
        fd: i32,
        req: MapRequest,
    ) -> Result<VirtAddr, MappingError>
    where
        S: FileSystem<File = F>,
        V: AddressSpace,
    {
        let handle = self.fds.file(fd).ok_or(MappingError::NotMappable)?;
        self.maps.map(fs, vm, &self.reserved, handle, req)
    }
}

/// The user stack range as initially reserved by the loader.
pub fn stack_range() -> Range<VirtAddr> {
    VirtAddr::new(layout::USER_STACK - layout::STACK_LIMIT)..VirtAddr::new(layout::USER_STACK)
}

/// Process lifecycle collaborator: thread identity, image loading, fork and
/// wait.
pub trait Lifecycle<F> {
    /// Name of the calling process, as printed in exit messages.
    fn name(&self) -> &str;

    /// Shut the machine down.
    fn power_off(&mut self);

    /// Clone the calling process as `name`, resuming from `frame`, with
    /// `fds` as its descriptor table.
    ///
    /// The child inherits no file mappings. Whatever the parent had mapped
    /// reaches the child only as pages the VM resolver copies, and the
    /// resolver owns those copies: the child's `munmap` of a parent region
    /// is a no-op, nothing is written back to the file from the child, and
    /// `Kernel::page_in` reports `NotMapped` for the child.
    ///
    /// On failure the table is handed back so the caller can release it.
    fn fork(&mut self, name: &str, frame: &TrapFrame, fds: FdTable<F>) -> Result<Pid, FdTable<F>>;

    /// Replace the calling process's image with the program named by
    /// `cmdline`, rewriting `frame` to enter it.
    ///
    /// Returns the new image's reserved ranges, or `None` if loading failed.
    fn exec(&mut self, cmdline: &str, frame: &mut TrapFrame) -> Option<Vec<Range<VirtAddr>>>;

    /// Wait for child `pid` and return its exit status, −1 if it is not a
    /// child or was already waited for.
    fn wait(&mut self, pid: Pid) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::PAGE_SIZE;
    use crate::testing::{FakeVm, MemFile, MemFs};

    #[test]
    fn test_new_process_has_console_fds() {
        let process: Process<MemFile> = Process::new(alloc::vec![stack_range()]);
        assert_eq!(process.fds().open_count(), 2);
        assert!(process.maps().is_empty());
        assert_eq!(process.exit_status(), None);
    }

    #[test]
    fn test_record_user_rsp() {
        let mut process: Process<MemFile> = Process::new(Vec::new());
        let frame = TrapFrame {
            rsp: 0x4747_ff00,
            ..TrapFrame::default()
        };
        process.record_user_rsp(&frame);
        assert_eq!(process.user_rsp(), 0x4747_ff00);
    }

    #[test]
    fn test_map_file_rejects_console_and_stack() {
        let mut fs = MemFs::new();
        fs.create_with("f", &[1u8; 16]);
        let fs = FsLock::new(fs);
        let mut vm = FakeVm::new();
        let mut process: Process<MemFile> = Process::new(alloc::vec![stack_range()]);
        let fd = process.fds_mut().open(&fs, "f").unwrap().as_i32();

        let req = |addr: usize| MapRequest {
            addr: VirtAddr::new(addr),
            length: 16,
            writable: false,
            offset: 0,
        };
        assert_eq!(
            process.map_file(&fs, &mut vm, 1, req(0x1000_0000)),
            Err(MappingError::NotMappable)
        );
        assert_eq!(
            process.map_file(&fs, &mut vm, fd, req(layout::USER_STACK - PAGE_SIZE)),
            Err(MappingError::Overlap)
        );
        assert!(process.map_file(&fs, &mut vm, fd, req(0x1000_0000)).is_ok());
    }
}
