//! File and Console System Calls
//!
//! create, remove, open, filesize, read, write, seek, tell, close, dup2.
//!
//! Every storage call runs inside one `FsLock` critical section. User
//! buffers are validated before the lock is taken and copied in or out
//! after it is released.

use alloc::vec;

use super::handler::{Current, Outcome, SyscallError};
use super::validate::{read_user_str, validate_range, validate_writable_range};
use crate::console::Console;
use crate::fd::{FdEntry, Stream};
use crate::filesys::FileSystem;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, VirtAddr};
use crate::trap::TrapFrame;

fn fd_arg(frame: &TrapFrame, n: usize) -> i32 {
    frame.arg(n) as i32
}

/// create(path, initial_size) -> bool
pub(super) fn create<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
{
    let path = read_user_str(cur.vm, VirtAddr::from_arg(frame.arg(0)))?;
    let size = frame.arg(1) as u32;
    let created = kernel.fs().with(|engine| engine.create(&path, size));
    Ok(Some(created as u64))
}

/// remove(path) -> bool
pub(super) fn remove<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
{
    let path = read_user_str(cur.vm, VirtAddr::from_arg(frame.arg(0)))?;
    let removed = kernel.fs().with(|engine| engine.remove(&path));
    Ok(Some(removed as u64))
}

/// open(path) -> fd
pub(super) fn open<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
{
    let path = read_user_str(cur.vm, VirtAddr::from_arg(frame.arg(0)))?;
    let fd = cur.process.fds_mut().open(kernel.fs(), &path)?;
    log::debug!("open({:?}) = {}", path, fd.as_i32());
    Ok(Some(fd.as_i32() as i64 as u64))
}

/// filesize(fd) -> bytes
pub(super) fn filesize<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
{
    let handle = cur
        .process
        .fds()
        .file(fd_arg(frame, 0))
        .ok_or(SyscallError::InvalidArgument)?;
    let len = kernel
        .fs()
        .with(|engine| handle.lock().length(engine))
        .ok_or(SyscallError::Io)?;
    Ok(Some(len as u64))
}

/// read(fd, buffer, size) -> bytes read
pub(super) fn read<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
{
    let fd = fd_arg(frame, 0);
    let size = frame.arg(2) as u32 as usize;
    let buffer = validate_writable_range(cur.vm, VirtAddr::from_arg(frame.arg(1)), size)?;

    match cur.process.fds().get(fd) {
        Some(FdEntry::Console(Stream::In)) => {
            let mut data = vec![0u8; size];
            let mut count = 0;
            while count < size {
                let c = kernel.console().getc();
                data[count] = c;
                if c == 0 {
                    buffer.copy_out(cur.vm, &data[..=count]);
                    return Ok(Some(count as u64));
                }
                count += 1;
            }
            buffer.copy_out(cur.vm, &data);
            Ok(Some(count as u64))
        }
        Some(FdEntry::Owned(handle)) => {
            let mut data = vec![0u8; size];
            let n = kernel
                .fs()
                .with(|engine| handle.lock().read(engine, &mut data));
            buffer.copy_out(cur.vm, &data[..n]);
            Ok(Some(n as u64))
        }
        Some(FdEntry::Console(Stream::Out)) | None => Err(SyscallError::InvalidArgument),
    }
}

/// write(fd, buffer, size) -> bytes written
pub(super) fn write<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
    V: AddressSpace,
{
    let fd = fd_arg(frame, 0);
    let size = frame.arg(2) as u32 as usize;
    let buffer = validate_range(cur.vm, VirtAddr::from_arg(frame.arg(1)), size)?;

    match cur.process.fds().get(fd) {
        Some(FdEntry::Console(Stream::Out)) => {
            kernel.console().putbuf(&buffer.copy_in(cur.vm));
            Ok(Some(size as u64))
        }
        Some(FdEntry::Owned(handle)) => {
            let data = buffer.copy_in(cur.vm);
            let n = kernel.fs().with(|engine| handle.lock().write(engine, &data));
            Ok(Some(n as u64))
        }
        Some(FdEntry::Console(Stream::In)) | None => Err(SyscallError::InvalidArgument),
    }
}

/// seek(fd, position)
///
/// Console streams and unused descriptors are ignored.
pub(super) fn seek<F, V, L>(cur: &mut Current<'_, F, V, L>, frame: &TrapFrame) -> Outcome {
    if let Some(handle) = cur.process.fds().file(fd_arg(frame, 0)) {
        handle.lock().seek(frame.arg(1) as u32);
    }
    Ok(None)
}

/// tell(fd) -> position, `u32::MAX` for anything but an owned file
pub(super) fn tell<F, V, L>(cur: &mut Current<'_, F, V, L>, frame: &TrapFrame) -> Outcome {
    let pos = cur
        .process
        .fds()
        .file(fd_arg(frame, 0))
        .map_or(u32::MAX, |handle| handle.lock().tell());
    Ok(Some(pos as u64))
}

/// close(fd)
pub(super) fn close<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
{
    cur.process.fds_mut().close(kernel.fs(), fd_arg(frame, 0));
    Ok(None)
}

/// dup2(oldfd, newfd) -> newfd
pub(super) fn dup2<S, C, V, L>(kernel: &Kernel<S, C>, cur: &mut Current<'_, S::File, V, L>, frame: &TrapFrame) -> Outcome
where
    S: FileSystem,
    C: Console,
{
    let fd = cur
        .process
        .fds_mut()
        .dup2(kernel.fs(), fd_arg(frame, 0), fd_arg(frame, 1))?;
    Ok(Some(fd as i64 as u64))
}
