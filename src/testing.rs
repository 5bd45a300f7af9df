//! Fake collaborators for unit tests.
//!
//! In-memory storage engine, address space, console and lifecycle, with
//! enough bookkeeping for tests to check what the syscall layer did to them.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Range;
use std::sync::{Condvar, Mutex};

use crate::console::Console;
use crate::fd::FdTable;
use crate::filesys::FileSystem;
use crate::mm::{AddressSpace, MappingError, PageFlags, VirtAddr, PAGE_SIZE};
use crate::process::{Lifecycle, Pid};
use crate::trap::TrapFrame;

/// Longest file name `MemFs` accepts.
pub const NAME_MAX: usize = 14;

/// An open file object of `MemFs`.
#[derive(Debug)]
pub struct MemFile {
    inode: usize,
}

/// In-memory storage engine. Removed files stay readable through objects
/// that are still open.
#[derive(Debug, Default)]
pub struct MemFs {
    names: BTreeMap<String, usize>,
    inodes: Vec<Vec<u8>>,
    open: usize,
    closes: usize,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `name` holding `contents`, replacing any existing file.
    pub fn create_with(&mut self, name: &str, contents: &[u8]) {
        self.inodes.push(contents.to_vec());
        self.names.insert(name.into(), self.inodes.len() - 1);
    }

    /// Current contents of `name`.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.names.get(name).map(|&inode| self.inodes[inode].clone())
    }

    /// File objects opened and not yet closed.
    pub fn open_files(&self) -> usize {
        self.open
    }

    /// Total number of `close` calls.
    pub fn closes(&self) -> usize {
        self.closes
    }
}

impl FileSystem for MemFs {
    type File = MemFile;

    fn create(&mut self, path: &str, initial_size: u32) -> bool {
        if path.is_empty() || path.len() > NAME_MAX || self.names.contains_key(path) {
            return false;
        }
        self.create_with(path, &vec![0u8; initial_size as usize]);
        true
    }

    fn remove(&mut self, path: &str) -> bool {
        self.names.remove(path).is_some()
    }

    fn open(&mut self, path: &str) -> Option<MemFile> {
        let inode = *self.names.get(path)?;
        self.open += 1;
        Some(MemFile { inode })
    }

    fn reopen(&mut self, file: &MemFile) -> Option<MemFile> {
        self.open += 1;
        Some(MemFile { inode: file.inode })
    }

    fn close(&mut self, _file: MemFile) {
        self.open -= 1;
        self.closes += 1;
    }

    fn read_at(&mut self, file: &mut MemFile, buf: &mut [u8], offset: u32) -> usize {
        let data = &self.inodes[file.inode];
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        n
    }

    fn write_at(&mut self, file: &mut MemFile, buf: &[u8], offset: u32) -> usize {
        let data = &mut self.inodes[file.inode];
        let start = offset as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        buf.len()
    }

    fn length(&mut self, file: &MemFile) -> u32 {
        self.inodes[file.inode].len() as u32
    }
}

/// One page of `FakeVm`. `data` stays empty until the page is written.
struct FakePage {
    flags: PageFlags,
    data: Vec<u8>,
}

/// In-memory address space. Every tracked page is walkable; pages never
/// written read as zero, so large lazy mappings stay cheap.
#[derive(Default)]
pub struct FakeVm {
    pages: BTreeMap<usize, FakePage>,
    fail_reserve: Option<VirtAddr>,
}

impl FakeVm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the page at `va` with `flags`.
    pub fn add_page(&mut self, va: VirtAddr, flags: PageFlags) {
        self.pages.insert(
            va.align_down().as_usize(),
            FakePage {
                flags,
                data: Vec::new(),
            },
        );
    }

    /// Make `[va, va + len)` present user memory.
    pub fn map_user(&mut self, va: VirtAddr, len: usize, writable: bool) {
        let mut flags = PageFlags::PRESENT;
        if writable {
            flags |= PageFlags::WRITABLE;
        }
        let end = VirtAddr::new(va.as_usize() + len);
        for page in crate::mm::address::pages_in(va..end) {
            self.add_page(page, flags);
        }
    }

    /// Make the next `reserve_lazy` at `va` fail.
    pub fn fail_reserve_at(&mut self, va: VirtAddr) {
        self.fail_reserve = Some(va);
    }

    /// Number of tracked pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Store bytes without marking pages dirty.
    pub fn poke(&mut self, va: VirtAddr, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            let addr = va.as_usize() + i;
            let page = self
                .pages
                .get_mut(&(addr & !(PAGE_SIZE - 1)))
                .expect("poke into untracked page");
            if page.data.is_empty() {
                page.data.resize(PAGE_SIZE, 0);
            }
            page.data[addr % PAGE_SIZE] = byte;
        }
    }

    /// Store bytes as a user write would: pages become present and dirty.
    pub fn touch(&mut self, va: VirtAddr, bytes: &[u8]) {
        self.write_user(va, bytes);
    }

    /// Load bytes.
    pub fn peek(&self, va: VirtAddr, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.read_user(va, &mut buf);
        buf
    }
}

impl AddressSpace for FakeVm {
    fn walk(&self, va: VirtAddr) -> bool {
        self.pages.contains_key(&va.align_down().as_usize())
    }

    fn find_page(&self, va: VirtAddr) -> Option<PageFlags> {
        self.pages.get(&va.align_down().as_usize()).map(|page| page.flags)
    }

    fn reserve_lazy(&mut self, va: VirtAddr, flags: PageFlags) -> Result<(), MappingError> {
        if self.fail_reserve == Some(va) {
            self.fail_reserve = None;
            return Err(MappingError::OutOfMemory);
        }
        if self.walk(va) {
            return Err(MappingError::AlreadyMapped);
        }
        self.add_page(va, flags - PageFlags::PRESENT);
        Ok(())
    }

    fn release(&mut self, va: VirtAddr) {
        self.pages.remove(&va.align_down().as_usize());
    }

    fn read_user(&self, va: VirtAddr, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let addr = va.as_usize() + i;
            let page = self
                .pages
                .get(&(addr & !(PAGE_SIZE - 1)))
                .expect("read from untracked page");
            *byte = page.data.get(addr % PAGE_SIZE).copied().unwrap_or(0);
        }
    }

    fn write_user(&mut self, va: VirtAddr, buf: &[u8]) {
        self.poke(va, buf);
        for page in crate::mm::address::pages_in(va..VirtAddr::new(va.as_usize() + buf.len())) {
            if let Some(page) = self.pages.get_mut(&page.as_usize()) {
                page.flags |= PageFlags::PRESENT | PageFlags::DIRTY;
            }
        }
    }
}

/// Console with queued input and recorded output. `getc` blocks until
/// input is fed.
pub struct FakeConsole {
    input: Mutex<VecDeque<u8>>,
    ready: Condvar,
    output: Mutex<Vec<u8>>,
}

impl FakeConsole {
    pub const fn new() -> Self {
        Self {
            input: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            output: Mutex::new(Vec::new()),
        }
    }

    /// Queue keyboard input and wake blocked readers.
    pub fn feed(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes);
        self.ready.notify_all();
    }

    /// Everything written so far.
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }
}

impl Console for FakeConsole {
    fn getc(&self) -> u8 {
        let mut input = self.input.lock().unwrap();
        loop {
            if let Some(c) = input.pop_front() {
                return c;
            }
            input = self.ready.wait(input).unwrap();
        }
    }

    fn putbuf(&self, buf: &[u8]) {
        self.output.lock().unwrap().extend_from_slice(buf);
    }
}

/// Lifecycle that records what it was asked to do.
pub struct FakeLifecycle {
    pub name: String,
    pub powered_off: bool,
    pub next_pid: Pid,
    pub fail_fork: bool,
    /// Child descriptor tables handed over by fork, by pid.
    pub children: BTreeMap<Pid, FdTable<MemFile>>,
    /// Exit statuses `wait` reports, by pid.
    pub statuses: BTreeMap<Pid, i32>,
    /// Reserved ranges a successful exec installs; `None` makes exec fail.
    pub exec_image: Option<Vec<Range<VirtAddr>>>,
    pub execs: Vec<String>,
}

impl FakeLifecycle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            powered_off: false,
            next_pid: 2,
            fail_fork: false,
            children: BTreeMap::new(),
            statuses: BTreeMap::new(),
            exec_image: None,
            execs: Vec::new(),
        }
    }
}

impl Lifecycle<MemFile> for FakeLifecycle {
    fn name(&self) -> &str {
        &self.name
    }

    fn power_off(&mut self) {
        self.powered_off = true;
    }

    fn fork(
        &mut self,
        _name: &str,
        _frame: &TrapFrame,
        fds: FdTable<MemFile>,
    ) -> Result<Pid, FdTable<MemFile>> {
        if self.fail_fork {
            return Err(fds);
        }
        let pid = self.next_pid;
        self.next_pid += 1;
        self.children.insert(pid, fds);
        Ok(pid)
    }

    fn exec(&mut self, cmdline: &str, frame: &mut TrapFrame) -> Option<Vec<Range<VirtAddr>>> {
        self.execs.push(cmdline.into());
        let image = self.exec_image.clone()?;
        frame.rip = 0x40_0000;
        Some(image)
    }

    fn wait(&mut self, pid: Pid) -> i32 {
        self.statuses.remove(&pid).unwrap_or(-1)
    }
}
