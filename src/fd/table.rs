//! Per-Process File Descriptor Table
//!
//! A fixed-size table of slots addressed by small integers. A slot holds
//! either one of the two console streams or a shared owned file handle.
//!
//! # Design
//! - Slots 0 and 1 hold `Console(In)` and `Console(Out)` at construction
//! - `open` takes the lowest free slot at or above `Fd::FIRST_FREE`, found
//!   through an occupancy bitmap with a lowest-possibly-free word hint
//! - Console streams are reference counted per process; owned handles count
//!   their extra aliases and release the storage object exactly once

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::handle::{FileHandle, SharedFile};
use crate::filesys::{FileSystem, FsLock};

/// Number of slots in a table.
pub const FD_LIMIT: usize = 512;

const WORD_BITS: usize = u64::BITS as usize;
const BITMAP_WORDS: usize = FD_LIMIT / WORD_BITS;

/// A descriptor number known to be inside the table.
///
/// This is a newtype to prevent using arbitrary integers as slot indices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[repr(transparent)]
pub struct Fd(u32);

impl Fd {
    /// Console input at table construction.
    pub const STDIN: Self = Self(0);

    /// Console output at table construction.
    pub const STDOUT: Self = Self(1);

    /// First slot `open` may hand out.
    pub const FIRST_FREE: Self = Self(2);

    /// Validate a raw descriptor number from user space.
    ///
    /// Returns None if the number is negative or past the table.
    #[inline]
    pub const fn new(raw: i32) -> Option<Self> {
        if raw >= 0 && (raw as usize) < FD_LIMIT {
            Some(Self(raw as u32))
        } else {
            None
        }
    }

    /// Get the index value.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The value returned to user space.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

/// One of the two console streams.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stream {
    /// Keyboard / serial input.
    In,
    /// Console output.
    Out,
}

/// What a descriptor slot denotes.
pub enum FdEntry<F> {
    /// A console stream sentinel. Reference counted per process.
    Console(Stream),
    /// An owned file handle, possibly aliased by other slots.
    Owned(SharedFile<F>),
}

impl<F> FdEntry<F> {
    /// The shared handle, if this slot holds a file.
    pub fn file(&self) -> Option<&SharedFile<F>> {
        match self {
            Self::Owned(handle) => Some(handle),
            Self::Console(_) => None,
        }
    }

    /// The stream, if this slot holds a console sentinel.
    pub fn stream(&self) -> Option<Stream> {
        match self {
            Self::Console(stream) => Some(*stream),
            Self::Owned(_) => None,
        }
    }

    fn alias(&self) -> Self {
        match self {
            Self::Console(stream) => Self::Console(*stream),
            Self::Owned(handle) => Self::Owned(Arc::clone(handle)),
        }
    }
}

impl<F> core::fmt::Debug for FdEntry<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Console(stream) => write!(f, "Console({:?})", stream),
            Self::Owned(handle) => write!(f, "Owned(dups={})", handle.lock().dup_count()),
        }
    }
}

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// The descriptor is out of range or its slot is empty.
    BadDescriptor,
    /// Every slot is occupied.
    TableFull,
    /// The storage engine has no such file.
    NotFound,
    /// The storage engine could not produce a new file object.
    Io,
}

impl core::fmt::Display for FdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::TableFull => write!(f, "descriptor table full"),
            Self::NotFound => write!(f, "no such file"),
            Self::Io => write!(f, "storage engine failure"),
        }
    }
}

/// File descriptor table for one process.
pub struct FdTable<F> {
    /// Slot contents.
    slots: Vec<Option<FdEntry<F>>>,
    /// Occupancy bitmap (1 = occupied).
    used: [u64; BITMAP_WORDS],
    /// No bitmap word below this one has a free slot at or above
    /// `Fd::FIRST_FREE`.
    hint: usize,
    /// Slots currently holding `Console(In)`.
    stdin_refs: u32,
    /// Slots currently holding `Console(Out)`.
    stdout_refs: u32,
}

impl<F> FdTable<F> {
    /// Create a table with the console streams installed at 0 and 1.
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.put(Fd::STDIN, FdEntry::Console(Stream::In));
        table.put(Fd::STDOUT, FdEntry::Console(Stream::Out));
        table
    }

    fn empty() -> Self {
        let mut slots = Vec::with_capacity(FD_LIMIT);
        slots.resize_with(FD_LIMIT, || None);
        Self {
            slots,
            used: [0; BITMAP_WORDS],
            hint: 0,
            stdin_refs: 0,
            stdout_refs: 0,
        }
    }

    /// Look up a descriptor.
    #[inline]
    pub fn get(&self, fd: i32) -> Option<&FdEntry<F>> {
        let fd = Fd::new(fd)?;
        self.slots[fd.index()].as_ref()
    }

    /// Look up a descriptor that must name an owned file.
    pub fn file(&self, fd: i32) -> Option<&SharedFile<F>> {
        self.get(fd).and_then(FdEntry::file)
    }

    /// Check if a slot is occupied.
    #[inline]
    pub fn is_open(&self, fd: i32) -> bool {
        self.get(fd).is_some()
    }

    /// Number of occupied slots.
    pub fn open_count(&self) -> usize {
        self.used.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Per-process reference count of a console stream.
    pub fn stream_refs(&self, stream: Stream) -> u32 {
        match stream {
            Stream::In => self.stdin_refs,
            Stream::Out => self.stdout_refs,
        }
    }

    /// Find the lowest free slot at or above `Fd::FIRST_FREE`.
    pub fn find_free(&self) -> Option<Fd> {
        for word in self.hint..BITMAP_WORDS {
            let mut free = !self.used[word];
            if word == 0 {
                free &= !((1u64 << Fd::FIRST_FREE.index()) - 1);
            }
            if free != 0 {
                let index = word * WORD_BITS + free.trailing_zeros() as usize;
                return Some(Fd(index as u32));
            }
        }
        None
    }

    /// Install `entry` at an empty slot.
    fn put(&mut self, fd: Fd, entry: FdEntry<F>) {
        debug_assert!(self.slots[fd.index()].is_none());
        match entry {
            FdEntry::Console(Stream::In) => self.stdin_refs += 1,
            FdEntry::Console(Stream::Out) => self.stdout_refs += 1,
            FdEntry::Owned(_) => {}
        }
        self.slots[fd.index()] = Some(entry);
        self.used[fd.index() / WORD_BITS] |= 1 << (fd.index() % WORD_BITS);
        while self.hint < BITMAP_WORDS && self.used[self.hint] == u64::MAX {
            self.hint += 1;
        }
    }

    /// Clear a slot, returning what it held. Stream counters are adjusted;
    /// owned handles are returned untouched.
    fn take(&mut self, fd: Fd) -> Option<FdEntry<F>> {
        let entry = self.slots[fd.index()].take()?;
        match entry {
            FdEntry::Console(Stream::In) => self.stdin_refs -= 1,
            FdEntry::Console(Stream::Out) => self.stdout_refs -= 1,
            FdEntry::Owned(_) => {}
        }
        let word = fd.index() / WORD_BITS;
        self.used[word] &= !(1 << (fd.index() % WORD_BITS));
        if fd >= Fd::FIRST_FREE {
            self.hint = self.hint.min(word);
        }
        Some(entry)
    }

    /// Install a freshly opened file in the lowest free slot.
    ///
    /// When the table is full the file is given back so the caller can
    /// release it.
    pub fn install(&mut self, file: F) -> Result<Fd, F> {
        match self.find_free() {
            Some(fd) => {
                self.put(fd, FdEntry::Owned(FileHandle::shared(file)));
                Ok(fd)
            }
            None => Err(file),
        }
    }

    /// Drop one reference from a removed slot, releasing the storage object
    /// if it was the last one.
    fn release<S>(fs: &FsLock<S>, entry: FdEntry<F>)
    where
        S: FileSystem<File = F>,
    {
        if let FdEntry::Owned(handle) = entry {
            let last = handle.lock().drop_ref();
            if let Some(file) = last {
                fs.with(|engine| engine.close(file));
            }
        }
    }
}

impl<F: Send> FdTable<F> {
    /// Open `path` and install it.
    ///
    /// The storage open, the slot allocation and, if the table is full, the
    /// release of the just-opened file happen in one critical section.
    pub fn open<S>(&mut self, fs: &FsLock<S>, path: &str) -> Result<Fd, FdError>
    where
        S: FileSystem<File = F>,
    {
        fs.with(|engine| {
            let file = engine.open(path).ok_or(FdError::NotFound)?;
            self.install(file).map_err(|file| {
                log::warn!("open({:?}): descriptor table full", path);
                engine.close(file);
                FdError::TableFull
            })
        })
    }

    /// Close a descriptor.
    ///
    /// Out-of-range and unused descriptors are ignored. The slot is always
    /// cleared; the storage object is released only when no alias remains.
    pub fn close<S>(&mut self, fs: &FsLock<S>, fd: i32)
    where
        S: FileSystem<File = F>,
    {
        let Some(fd) = Fd::new(fd) else {
            return;
        };
        if let Some(entry) = self.take(fd) {
            Self::release(fs, entry);
        }
    }

    /// Make `newfd` an alias of `oldfd`, closing whatever `newfd` held.
    ///
    /// Equal descriptors return `newfd` untouched, whether or not it is open.
    pub fn dup2<S>(&mut self, fs: &FsLock<S>, oldfd: i32, newfd: i32) -> Result<i32, FdError>
    where
        S: FileSystem<File = F>,
    {
        if oldfd == newfd {
            return Ok(newfd);
        }
        let old = Fd::new(oldfd).ok_or(FdError::BadDescriptor)?;
        let new = Fd::new(newfd).ok_or(FdError::BadDescriptor)?;
        let alias = self.slots[old.index()]
            .as_ref()
            .ok_or(FdError::BadDescriptor)?
            .alias();

        // Count the new alias before closing `new`, so that closing a slot
        // which already aliases `old` can never release the shared file.
        if let FdEntry::Owned(handle) = &alias {
            handle.lock().add_alias();
        }
        if let Some(previous) = self.take(new) {
            Self::release(fs, previous);
        }
        self.put(new, alias);
        Ok(newfd)
    }

    /// Build the descriptor table a forked child starts with.
    ///
    /// Every owned handle is reopened once; slots that alias each other in
    /// the parent alias the same reopened handle in the child, with the same
    /// cursor and alias count. Console slots are copied as they are.
    pub fn inherit<S>(&self, fs: &FsLock<S>) -> Result<Self, FdError>
    where
        S: FileSystem<File = F>,
    {
        let mut child = Self::empty();
        let mut reopened: BTreeMap<usize, SharedFile<F>> = BTreeMap::new();

        let result = fs.with(|engine| {
            for (index, slot) in self.slots.iter().enumerate() {
                let Some(entry) = slot else {
                    continue;
                };
                let copy = match entry {
                    FdEntry::Console(stream) => FdEntry::Console(*stream),
                    FdEntry::Owned(handle) => {
                        let key = Arc::as_ptr(handle) as usize;
                        if let Some(existing) = reopened.get(&key) {
                            FdEntry::Owned(Arc::clone(existing))
                        } else {
                            let parent = handle.lock();
                            let file = parent
                                .file()
                                .and_then(|file| engine.reopen(file))
                                .ok_or(FdError::Io)?;
                            let shared = Arc::new(spin::Mutex::new(parent.fork_with(file)));
                            reopened.insert(key, Arc::clone(&shared));
                            FdEntry::Owned(shared)
                        }
                    }
                };
                child.put(Fd(index as u32), copy);
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(child),
            Err(err) => {
                // Alias counts were copied from the parent and do not match
                // the partial child, so release each reopened file directly.
                drop(child);
                fs.with(|engine| {
                    for shared in reopened.values() {
                        if let Some(file) = shared.lock().take_file() {
                            engine.close(file);
                        }
                    }
                });
                Err(err)
            }
        }
    }

    /// Close every slot. Used when the process terminates.
    pub fn close_all<S>(&mut self, fs: &FsLock<S>)
    where
        S: FileSystem<File = F>,
    {
        for index in 0..FD_LIMIT {
            if let Some(entry) = self.take(Fd(index as u32)) {
                Self::release(fs, entry);
            }
        }
    }
}

impl<F> Default for FdTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> core::fmt::Debug for FdTable<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(
                self.slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, slot)| slot.as_ref().map(|entry| (i, entry))),
            )
            .finish()
    }
}
