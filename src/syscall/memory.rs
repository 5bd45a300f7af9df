//! Memory Mapping System Calls

use super::handler::{Current, Outcome};
use crate::console::Console;
use crate::filesys::FileSystem;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, MapRequest, VirtAddr};
use crate::trap::TrapFrame;

/// mmap(addr, length, writable, fd, offset) -> addr, NULL on failure
pub(super) fn mmap<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
{
    let req = MapRequest {
        addr: VirtAddr::from_arg(frame.arg(0)),
        length: frame.arg(1) as usize,
        writable: frame.arg(2) != 0,
        offset: frame.arg(4) as i64,
    };
    let fd = frame.arg(3) as i32;
    let addr = cur
        .process
        .map_file(kernel.fs(), cur.vm, fd, req)
        .inspect_err(|err| log::debug!("mmap({}, fd {}): {}", req.addr, fd, err))?;
    Ok(Some(addr.as_u64()))
}

/// munmap(addr)
///
/// An address that does not start a mapping is ignored.
pub(super) fn munmap<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
{
    let addr = VirtAddr::from_arg(frame.arg(0));
    if !cur.process.maps_mut().unmap(kernel.fs(), cur.vm, addr) {
        log::debug!("munmap({}): no mapping starts here", addr);
    }
    Ok(None)
}
