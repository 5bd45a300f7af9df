//! Owned File Handles
//!
//! A `FileHandle` is what an owned descriptor slot points at: one storage
//! file object plus the byte cursor. Descriptors created by `dup2` share the
//! same handle (and therefore the same cursor); the handle counts them.
//!
//! # Invariants
//! - `dup_count` is the number of aliases beyond the first owner
//! - The storage object is taken out exactly once, by the close that finds
//!   `dup_count == 0`; afterwards the handle is dead and every I/O call on it
//!   reports nothing transferred

use alloc::sync::Arc;
use spin::Mutex;

use crate::filesys::FileSystem;

/// A handle shared by every descriptor that aliases it.
pub type SharedFile<F> = Arc<Mutex<FileHandle<F>>>;

/// Storage file object, cursor and alias count.
#[derive(Debug)]
pub struct FileHandle<F> {
    file: Option<F>,
    pos: u32,
    dup_count: u32,
}

impl<F> FileHandle<F> {
    /// Wrap a freshly opened file with the cursor at 0.
    pub fn new(file: F) -> Self {
        Self {
            file: Some(file),
            pos: 0,
            dup_count: 0,
        }
    }

    /// Wrap and share in one step.
    pub fn shared(file: F) -> SharedFile<F> {
        Arc::new(Mutex::new(Self::new(file)))
    }

    /// Number of extra descriptors aliasing this handle.
    #[inline]
    pub fn dup_count(&self) -> u32 {
        self.dup_count
    }

    /// Current byte position.
    #[inline]
    pub fn tell(&self) -> u32 {
        self.pos
    }

    /// Move the cursor. Positions past the end are allowed; reads there
    /// return 0 and writes extend the file if the engine permits it.
    #[inline]
    pub fn seek(&mut self, pos: u32) {
        self.pos = pos;
    }

    /// Whether the storage object has not been released yet.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.file.is_some()
    }

    /// Borrow the storage object.
    #[inline]
    pub fn file(&self) -> Option<&F> {
        self.file.as_ref()
    }

    /// Record one more alias.
    #[inline]
    pub(crate) fn add_alias(&mut self) {
        self.dup_count += 1;
    }

    /// Drop one reference.
    ///
    /// Returns the storage object when this was the last reference; the
    /// caller must hand it to `FileSystem::close`.
    pub(crate) fn drop_ref(&mut self) -> Option<F> {
        if self.dup_count > 0 {
            self.dup_count -= 1;
            None
        } else {
            self.file.take()
        }
    }

    /// Take the storage object regardless of remaining aliases.
    pub(crate) fn take_file(&mut self) -> Option<F> {
        self.file.take()
    }

    /// Build the child-side copy of this handle around a reopened file.
    pub(crate) fn fork_with(&self, file: F) -> Self {
        Self {
            file: Some(file),
            pos: self.pos,
            dup_count: self.dup_count,
        }
    }

    /// Read at the cursor and advance it.
    pub fn read<S>(&mut self, engine: &mut S, buf: &mut [u8]) -> usize
    where
        S: FileSystem<File = F>,
    {
        let Some(file) = self.file.as_mut() else {
            return 0;
        };
        let n = engine.read_at(file, buf, self.pos);
        self.pos = self.pos.saturating_add(n as u32);
        n
    }

    /// Write at the cursor and advance it.
    pub fn write<S>(&mut self, engine: &mut S, buf: &[u8]) -> usize
    where
        S: FileSystem<File = F>,
    {
        let Some(file) = self.file.as_mut() else {
            return 0;
        };
        let n = engine.write_at(file, buf, self.pos);
        self.pos = self.pos.saturating_add(n as u32);
        n
    }

    /// File length in bytes, `None` once released.
    pub fn length<S>(&self, engine: &mut S) -> Option<u32>
    where
        S: FileSystem<File = F>,
    {
        self.file.as_ref().map(|file| engine.length(file))
    }
}
