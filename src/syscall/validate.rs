//! System Call Input Validation
//!
//! Every user-supplied address is checked here before a handler touches it.
//!
//! # Security Principles
//! - Validate ALL pointers before use; a failed check terminates the caller
//! - Fail-secure: an address is only accepted if the page table and the
//!   VM resolver both know its page
//! - Prevent common vulnerabilities:
//!   - Kernel memory disclosure (addresses at or above `KERN_BASE`)
//!   - Range wrap-around (checked arithmetic)
//!   - Null pointer dereference (explicit checks)
//!   - TOCTOU races (data is copied into kernel buffers once)

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::handler::SyscallError;
use crate::mm::address::pages_in;
use crate::mm::{AddressSpace, PageFlags, VirtAddr, PAGE_SIZE};

/// Longest path or command line accepted from user space, in bytes,
/// excluding the terminating NUL.
pub const MAX_PATH_LEN: usize = 1024;

/// Check that `ptr` is a user address whose page is known to the VM
/// resolver. Returns the page's flags.
pub fn validate<V: AddressSpace>(vm: &V, ptr: VirtAddr) -> Result<PageFlags, SyscallError> {
    if ptr.is_null() || !ptr.is_user() || !vm.walk(ptr) {
        log::debug!("rejected user pointer {}", ptr);
        return Err(SyscallError::InvalidPointer);
    }
    vm.find_page(ptr).ok_or_else(|| {
        log::debug!("no page record for user pointer {}", ptr);
        SyscallError::InvalidPointer
    })
}

/// As `validate`, and the page must also be writable.
pub fn validate_writable<V: AddressSpace>(vm: &V, ptr: VirtAddr) -> Result<PageFlags, SyscallError> {
    let flags = validate(vm, ptr)?;
    if !flags.contains(PageFlags::WRITABLE) {
        log::debug!("user pointer {} is read-only", ptr);
        return Err(SyscallError::InvalidPointer);
    }
    Ok(flags)
}

/// End of `[ptr, ptr + len)`, rejecting wrap-around.
fn range_end(ptr: VirtAddr, len: usize) -> Result<VirtAddr, SyscallError> {
    ptr.checked_add(len).ok_or(SyscallError::InvalidPointer)
}

/// Validate every page touched by `[ptr, ptr + len)`.
///
/// A zero length still requires `ptr` itself to be valid.
pub fn validate_range<V: AddressSpace>(vm: &V, ptr: VirtAddr, len: usize) -> Result<UserBuffer, SyscallError> {
    validate(vm, ptr)?;
    let end = range_end(ptr, len)?;
    for page in pages_in(ptr..end).skip(1) {
        validate(vm, page)?;
    }
    Ok(UserBuffer { start: ptr, len })
}

/// Validate every page touched by `[ptr, ptr + len)` for writing.
pub fn validate_writable_range<V: AddressSpace>(
    vm: &V,
    ptr: VirtAddr,
    len: usize,
) -> Result<UserBufferMut, SyscallError> {
    validate_writable(vm, ptr)?;
    let end = range_end(ptr, len)?;
    for page in pages_in(ptr..end).skip(1) {
        validate_writable(vm, page)?;
    }
    Ok(UserBufferMut { start: ptr, len })
}

/// Copy a NUL-terminated string out of user space.
///
/// Each page is validated as the string crosses into it. Strings longer than
/// `MAX_PATH_LEN` or not valid UTF-8 are rejected as invalid arguments.
pub fn read_user_str<V: AddressSpace>(vm: &V, ptr: VirtAddr) -> Result<String, SyscallError> {
    let mut bytes = Vec::new();
    let mut cursor = ptr;
    // One extra byte so a string of exactly MAX_PATH_LEN finds its NUL.
    let limit = MAX_PATH_LEN + 1;

    while bytes.len() < limit {
        validate(vm, cursor)?;
        let chunk = (PAGE_SIZE - cursor.page_offset()).min(limit - bytes.len());
        let mut buf = vec![0u8; chunk];
        vm.read_user(cursor, &mut buf);

        if let Some(nul) = buf.iter().position(|&b| b == 0) {
            bytes.extend_from_slice(&buf[..nul]);
            return String::from_utf8(bytes).map_err(|_| SyscallError::InvalidArgument);
        }
        bytes.extend_from_slice(&buf);
        cursor = cursor.checked_add(chunk).ok_or(SyscallError::InvalidPointer)?;
    }
    log::debug!("user string at {} exceeds {} bytes", ptr, MAX_PATH_LEN);
    Err(SyscallError::InvalidArgument)
}

/// A validated, readable user-space buffer.
///
/// Only constructed by `validate_range`.
#[derive(Debug, Clone, Copy)]
pub struct UserBuffer {
    start: VirtAddr,
    len: usize,
}

impl UserBuffer {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the buffer into kernel memory.
    pub fn copy_in<V: AddressSpace>(&self, vm: &V) -> Vec<u8> {
        let mut data = vec![0u8; self.len];
        if self.len > 0 {
            vm.read_user(self.start, &mut data);
        }
        data
    }
}

/// A validated, writable user-space buffer.
///
/// Only constructed by `validate_writable_range`.
#[derive(Debug, Clone, Copy)]
pub struct UserBufferMut {
    start: VirtAddr,
    len: usize,
}

impl UserBufferMut {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `data` to the start of the buffer. At most `len` bytes are
    /// written.
    pub fn copy_out<V: AddressSpace>(&self, vm: &mut V, data: &[u8]) {
        let n = data.len().min(self.len);
        if n > 0 {
            vm.write_user(self.start, &data[..n]);
        }
    }
}
