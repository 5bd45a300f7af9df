//! File-Backed Memory Mappings
//!
//! High-level API for the mmap/munmap system calls.
//!
//! # Design
//! - A region is a page-aligned range backed by its own reopened file
//!   object, so it outlives the descriptor it was created from
//! - Every covered page is registered with the VM resolver as a lazy page;
//!   nothing is read from the file until the page is first touched
//! - A page's file offset is derived from the region start in 64-bit
//!   arithmetic; no per-page state is kept
//! - Regions are keyed by start address; munmap matches the start exactly
//!
//! # Security Properties
//! - All preconditions are checked before any state is committed
//! - Regions never overlap each other, reserved ranges, or pages the VM
//!   resolver already tracks
//! - Write-back never grows the file and never touches offsets the file
//!   cannot address

use alloc::collections::BTreeMap;
use alloc::vec;
use core::ops::Range;

use super::address::{layout, overlaps, page_round_up, pages_in, VirtAddr, PAGE_SIZE};
use super::paging::{AddressSpace, MappingError, PageFlags};
use crate::fd::SharedFile;
use crate::filesys::{FileSystem, FsLock};

/// Arguments of one mmap request, straight from the trap frame.
#[derive(Debug, Clone, Copy)]
pub struct MapRequest {
    pub addr: VirtAddr,
    pub length: usize,
    pub writable: bool,
    pub offset: i64,
}

/// One page of a mapping and where its contents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPage {
    /// Page-aligned user address.
    pub va: VirtAddr,
    /// File offset of the first byte of the page. May lie past what a
    /// 32-bit file offset can reach; such pages have no file bytes.
    pub offset: u64,
    /// Bytes populated from the file.
    pub read_bytes: usize,
    /// Bytes zero-filled after them.
    pub zero_bytes: usize,
}

/// Page geometry of a region: where it sits and which file bytes it covers.
#[derive(Debug, Clone, Copy)]
struct Extent {
    start: VirtAddr,
    pages: usize,
    offset: u32,
    /// File length when the region was created.
    file_len: u32,
}

impl Extent {
    fn page(&self, index: usize) -> MappedPage {
        let offset = u64::from(self.offset) + index as u64 * PAGE_SIZE as u64;
        let read_bytes = u64::from(self.file_len)
            .saturating_sub(offset)
            .min(PAGE_SIZE as u64) as usize;
        MappedPage {
            va: VirtAddr::new(self.start.as_usize() + index * PAGE_SIZE),
            offset,
            read_bytes,
            zero_bytes: PAGE_SIZE - read_bytes,
        }
    }

    fn index_of(&self, va: VirtAddr) -> Option<usize> {
        let index = va.align_down().as_usize().checked_sub(self.start.as_usize())? / PAGE_SIZE;
        (index < self.pages).then_some(index)
    }

    fn iter(self) -> impl Iterator<Item = MappedPage> {
        (0..self.pages).map(move |index| self.page(index))
    }
}

/// File offset and byte count to write back for a dirty page at `offset`,
/// given the file's current length. `None` if the page holds no byte the
/// file already has.
fn writeback_span(offset: u64, file_len: u32) -> Option<(u32, usize)> {
    let at = u32::try_from(offset).ok()?;
    let n = file_len.checked_sub(at)?.min(PAGE_SIZE as u32);
    (n > 0).then_some((at, n as usize))
}

/// A mapped file region.
#[derive(Debug)]
pub struct MemoryMapRegion<F> {
    extent: Extent,
    file: F,
    writable: bool,
}

impl<F> MemoryMapRegion<F> {
    /// First mapped address.
    #[inline]
    pub fn start(&self) -> VirtAddr {
        self.extent.start
    }

    /// Mapped length in bytes, a whole number of pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.extent.pages * PAGE_SIZE
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.extent.pages == 0
    }

    /// Address range covered.
    #[inline]
    pub fn range(&self) -> Range<VirtAddr> {
        self.start()..VirtAddr::new(self.start().as_usize() + self.len())
    }

    /// File offset mapped at `start`.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.extent.offset
    }

    #[inline]
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Whether the last page reads as zero past end-of-file.
    pub fn zero_tail(&self) -> bool {
        self.extent.pages > 0 && self.extent.page(self.extent.pages - 1).zero_bytes > 0
    }

    /// Per-page layout, in address order.
    pub fn pages(&self) -> impl Iterator<Item = MappedPage> {
        self.extent.iter()
    }

    fn page(&self, va: VirtAddr) -> Option<MappedPage> {
        self.extent.index_of(va).map(|index| self.extent.page(index))
    }
}

/// The set of mappings of one process.
#[derive(Debug)]
pub struct MapTable<F> {
    regions: BTreeMap<usize, MemoryMapRegion<F>>,
}

impl<F> MapTable<F> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
        }
    }

    /// Number of live regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The region starting exactly at `addr`.
    pub fn region_at(&self, addr: VirtAddr) -> Option<&MemoryMapRegion<F>> {
        self.regions.get(&addr.as_usize())
    }

    /// The region containing `va`.
    pub fn region_containing(&self, va: VirtAddr) -> Option<&MemoryMapRegion<F>> {
        self.regions
            .range(..=va.as_usize())
            .next_back()
            .map(|(_, region)| region)
            .filter(|region| va < region.range().end)
    }

    fn region_containing_mut(&mut self, va: VirtAddr) -> Option<&mut MemoryMapRegion<F>> {
        self.regions
            .range_mut(..=va.as_usize())
            .next_back()
            .map(|(_, region)| region)
            .filter(|region| va < region.range().end)
    }

    /// Whether `range` intersects any region.
    pub fn intersects(&self, range: &Range<VirtAddr>) -> bool {
        // Only the last region starting before `range.end` can reach into it
        // from below; regions never overlap each other.
        self.regions
            .range(..range.end.as_usize())
            .next_back()
            .is_some_and(|(_, region)| overlaps(&region.range(), range))
    }

    /// Check every precondition of `map` that does not need the file.
    fn check_request<V: AddressSpace>(
        &self,
        vm: &V,
        reserved: &[Range<VirtAddr>],
        req: &MapRequest,
    ) -> Result<Range<VirtAddr>, MappingError> {
        if req.addr.is_null() {
            return Err(MappingError::OutOfRange);
        }
        if !req.addr.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        if req.offset < 0 || req.offset as usize % PAGE_SIZE != 0 {
            return Err(MappingError::MisalignedAddress);
        }
        if req.offset > u32::MAX as i64 {
            return Err(MappingError::OutOfRange);
        }
        if req.length == 0 {
            return Err(MappingError::EmptyRange);
        }

        let span = page_round_up(req.length).ok_or(MappingError::OutOfRange)?;
        let end = req.addr.checked_add(span).ok_or(MappingError::OutOfRange)?;
        if end.as_usize() > layout::KERN_BASE {
            return Err(MappingError::OutOfRange);
        }
        let range = req.addr..end;

        if reserved.iter().any(|r| overlaps(r, &range)) {
            return Err(MappingError::Overlap);
        }
        if self.intersects(&range) {
            return Err(MappingError::Overlap);
        }
        if pages_in(range.clone()).any(|va| vm.find_page(va).is_some()) {
            return Err(MappingError::Overlap);
        }
        Ok(range)
    }
}

impl<F: Send> MapTable<F> {
    /// Map `req.length` bytes of the file behind `handle`, starting at file
    /// offset `req.offset`, at `req.addr`.
    ///
    /// Nothing is committed unless every check passes and every page is
    /// registered with the VM resolver.
    pub fn map<S, V>(
        &mut self,
        fs: &FsLock<S>,
        vm: &mut V,
        reserved: &[Range<VirtAddr>],
        handle: &SharedFile<F>,
        req: MapRequest,
    ) -> Result<VirtAddr, MappingError>
    where
        S: FileSystem<File = F>,
        V: AddressSpace,
    {
        let range = self.check_request(vm, reserved, &req)?;
        let offset = u32::try_from(req.offset).map_err(|_| MappingError::OutOfRange)?;

        let (file, file_len) = fs.with(|engine| {
            let source = handle.lock();
            let original = source.file().ok_or(MappingError::NotMappable)?;
            let file_len = engine.length(original);
            if file_len == 0 {
                return Err(MappingError::NotMappable);
            }
            let file = engine.reopen(original).ok_or(MappingError::OutOfMemory)?;
            Ok((file, file_len))
        })?;

        let mut flags = PageFlags::FILE_BACKED;
        if req.writable {
            flags |= PageFlags::WRITABLE;
        }
        for va in pages_in(range.clone()) {
            if let Err(err) = vm.reserve_lazy(va, flags) {
                log::warn!("mmap {}: lazy page {} rejected: {}", req.addr, va, err);
                for undo in pages_in(range.start..va) {
                    vm.release(undo);
                }
                fs.with(|engine| engine.close(file));
                return Err(err);
            }
        }

        let extent = Extent {
            start: req.addr,
            pages: (range.end.as_usize() - range.start.as_usize()) / PAGE_SIZE,
            offset,
            file_len,
        };
        log::debug!(
            "mmap {}..{} offset={} writable={} pages={}",
            range.start,
            range.end,
            offset,
            req.writable,
            extent.pages
        );
        self.regions.insert(
            req.addr.as_usize(),
            MemoryMapRegion {
                extent,
                file,
                writable: req.writable,
            },
        );
        Ok(req.addr)
    }

    /// Populate one page frame of a mapping on first access.
    ///
    /// Reads the page's file bytes and zero-fills the rest of `frame`.
    pub fn page_in<S>(
        &mut self,
        fs: &FsLock<S>,
        va: VirtAddr,
        frame: &mut [u8; PAGE_SIZE],
    ) -> Result<(), MappingError>
    where
        S: FileSystem<File = F>,
    {
        let region = self
            .region_containing_mut(va)
            .ok_or(MappingError::NotMapped)?;
        let page = region.page(va).ok_or(MappingError::NotMapped)?;

        // Only pages below the file length carry file bytes, and those
        // offsets always fit.
        let read = match u32::try_from(page.offset) {
            Ok(at) if page.read_bytes > 0 => fs.with(|engine| {
                engine.read_at(&mut region.file, &mut frame[..page.read_bytes], at)
            }),
            _ => 0,
        };
        frame[read..].fill(0);
        Ok(())
    }

    /// Remove the region starting exactly at `addr`.
    ///
    /// Returns false, changing nothing, if no region starts there.
    pub fn unmap<S, V>(&mut self, fs: &FsLock<S>, vm: &mut V, addr: VirtAddr) -> bool
    where
        S: FileSystem<File = F>,
        V: AddressSpace,
    {
        match self.regions.remove(&addr.as_usize()) {
            Some(region) => {
                Self::teardown(fs, vm, region);
                true
            }
            None => false,
        }
    }

    /// Remove every region. Used on exec and process exit.
    pub fn unmap_all<S, V>(&mut self, fs: &FsLock<S>, vm: &mut V)
    where
        S: FileSystem<File = F>,
        V: AddressSpace,
    {
        while let Some((_, region)) = self.regions.pop_first() {
            Self::teardown(fs, vm, region);
        }
    }

    /// Write back dirty pages, close the file and release every page.
    ///
    /// Dirty pages are resident, so reading them under the lock cannot fault
    /// back into `page_in`.
    fn teardown<S, V>(fs: &FsLock<S>, vm: &mut V, region: MemoryMapRegion<F>)
    where
        S: FileSystem<File = F>,
        V: AddressSpace,
    {
        let MemoryMapRegion {
            extent,
            mut file,
            writable,
        } = region;

        let written = fs.with(|engine| {
            let mut written = 0usize;
            if writable {
                let file_len = engine.length(&file);
                let mut contents = vec![0u8; PAGE_SIZE];
                for page in extent.iter() {
                    let is_dirty = vm
                        .find_page(page.va)
                        .is_some_and(|flags| flags.contains(PageFlags::DIRTY));
                    if !is_dirty {
                        continue;
                    }
                    if let Some((at, n)) = writeback_span(page.offset, file_len) {
                        vm.read_user(page.va, &mut contents[..n]);
                        engine.write_at(&mut file, &contents[..n], at);
                        written += 1;
                    }
                }
            }
            engine.close(file);
            written
        });

        for page in extent.iter() {
            vm.release(page.va);
        }
        log::debug!("munmap: {} pages, {} written back", extent.pages, written);
    }
}

impl<F> Default for MapTable<F> {
    fn default() -> Self {
        Self::new()
    }
}
