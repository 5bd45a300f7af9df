//! Process System Calls
//!
//! halt, fork, exec and wait. exit is handled by the dispatcher directly
//! through `Kernel::terminate`.

use super::handler::{Current, Outcome, SyscallError};
use super::validate::read_user_str;
use crate::console::Console;
use crate::filesys::FileSystem;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, VirtAddr};
use crate::process::Lifecycle;
use crate::trap::TrapFrame;

/// halt()
pub(super) fn halt<F, V, L: Lifecycle<F>>(cur: &mut Current<'_, F, V, L>) {
    log::info!("{} requested power off", cur.lifecycle.name());
    cur.lifecycle.power_off();
}

/// fork(name) -> child pid in the parent
///
/// The child starts with a copy of the caller's descriptor table. If the
/// lifecycle cannot create the child, the copy is closed again.
pub(super) fn fork<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
    L: Lifecycle<S::File>,
{
    let name = read_user_str(cur.vm, VirtAddr::from_arg(frame.arg(0)))?;
    let fds = cur.process.fds().inherit(kernel.fs())?;
    match cur.lifecycle.fork(&name, frame, fds) {
        Ok(pid) => {
            log::debug!("fork({:?}) = {}", name, pid);
            Ok(Some(pid as i64 as u64))
        }
        Err(mut fds) => {
            log::warn!("fork({:?}) failed", name);
            fds.close_all(kernel.fs());
            Err(SyscallError::ResourceExhausted)
        }
    }
}

/// exec(cmdline)
///
/// The command line is copied into the kernel before the old image's
/// mappings are torn down. On success the lifecycle has rewritten `frame`
/// and nothing is returned.
pub(super) fn exec<S, C, V, L>(
    kernel: &Kernel<S, C>,
    cur: &mut Current<'_, S::File, V, L>,
    frame: &mut TrapFrame,
) -> Result<(), SyscallError>
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
    L: Lifecycle<S::File>,
{
    let cmdline = read_user_str(cur.vm, VirtAddr::from_arg(frame.arg(0)))?;
    cur.process.maps_mut().unmap_all(kernel.fs(), cur.vm);
    let reserved = cur.lifecycle.exec(&cmdline, frame).ok_or(SyscallError::Io)?;
    cur.process.set_reserved(reserved);
    Ok(())
}

/// wait(pid) -> child exit status
pub(super) fn wait<F, V, L: Lifecycle<F>>(cur: &mut Current<'_, F, V, L>, frame: &TrapFrame) -> Outcome {
    let status = cur.lifecycle.wait(frame.arg(0) as i32);
    Ok(Some(status as i64 as u64))
}
