//! Storage Engine Interface and the Global File-System Lock
//!
//! The on-disk file system is an external collaborator. It is not safe for
//! concurrent use, so the kernel keeps exactly one instance behind one lock
//! and every filesystem-touching syscall goes through it.
//!
//! # Design
//! - `FileSystem` methods take `&mut self`, so a file object can only be
//!   read, written or closed while the caller holds the `FsLock` guard
//! - The guard is released when it goes out of scope, including on early
//!   returns; there is no manual acquire/release pairing to get wrong
//! - The lock is never taken re-entrantly: callers hold it for one bounded
//!   critical section and drop it before touching user memory that may not
//!   be resident

use spin::{Mutex, MutexGuard};

/// The storage engine.
///
/// A `File` is one open file object. It carries no cursor of its own; the
/// descriptor layer keeps the position and uses the positional calls.
pub trait FileSystem: Send {
    /// One open file object. Released by handing it back to `close`.
    type File: Send;

    /// Create `path` with `initial_size` zero bytes. `false` if it exists or
    /// the name is invalid.
    fn create(&mut self, path: &str, initial_size: u32) -> bool;

    /// Remove `path`. Open files keep working until closed.
    fn remove(&mut self, path: &str) -> bool;

    /// Open `path`, `None` if it does not exist.
    fn open(&mut self, path: &str) -> Option<Self::File>;

    /// Open a new, independent file object for the same file.
    fn reopen(&mut self, file: &Self::File) -> Option<Self::File>;

    /// Release a file object.
    fn close(&mut self, file: Self::File);

    /// Read into `buf` starting at byte `offset`. Returns bytes read, 0 at
    /// end of file.
    fn read_at(&mut self, file: &mut Self::File, buf: &mut [u8], offset: u32) -> usize;

    /// Write `buf` starting at byte `offset`. Returns bytes written, which may
    /// be short if the file cannot grow.
    fn write_at(&mut self, file: &mut Self::File, buf: &[u8], offset: u32) -> usize;

    /// Current length in bytes.
    fn length(&mut self, file: &Self::File) -> u32;
}

/// The storage engine together with the lock that serializes all access to
/// it.
pub struct FsLock<S> {
    engine: Mutex<S>,
}

impl<S: FileSystem> FsLock<S> {
    /// Wrap a storage engine.
    pub const fn new(engine: S) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// Acquire the lock. Blocks until the current holder releases it.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.engine.lock()
    }

    /// Run `f` as one critical section.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut engine = self.engine.lock();
        f(&mut engine)
    }

    /// Whether some thread currently holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.engine.is_locked()
    }
}
