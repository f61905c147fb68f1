//! # User Address Space
//!
//! An address space consists of up to two general-purpose regions (the
//! program's text and data) plus the fixed-size stack window directly below
//! [`USERSTACK`]. Each of the three has its own [`PageTable`].
//!
//! ## Lifecycle
//!
//! ```text
//! new ─► define_region ×2 ─► prepare_load ─► (copy program) ─► complete_load ─► define_stack
//!                                │                                                    │
//!                                └──── on failure ────► destroy ◄──── on exit ─────────┘
//! ```
//!
//! - [`prepare_load`](AddressSpace::prepare_load) backs every page with a
//!   zeroed frame.
//! - [`complete_load`](AddressSpace::complete_load) freezes the first region
//!   (text): from then on it is mapped read-only.
//! - [`destroy`](AddressSpace::destroy) gives every frame back, tolerating
//!   tables that were only partially populated.
//! - [`duplicate`](AddressSpace::duplicate) builds an independent copy for a
//!   forked child; no frames are shared.

use crate::page_table::PageTable;
use crate::region::{Region, RegionFlags};
use crate::VmError;
use kernel_alloc::{BootMemory, FrameAllocator, FrameMemory};
use kernel_info::memory::{MAX_REGIONS, USERSTACK};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_sync::InterruptControl;
use kernel_tlb::{LocalTlb, Tlb};
use log::{debug, warn};

/// One of the three parts of an address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SegmentId {
    /// The first region defined; read-only once loading completes.
    Text,
    /// The second region defined.
    Data,
    /// The fixed user stack window.
    Stack,
}

impl SegmentId {
    /// All segments, in the order they are populated.
    pub const ALL: [Self; 3] = [Self::Text, Self::Data, Self::Stack];

    const fn slot(self) -> usize {
        match self {
            Self::Text => 0,
            Self::Data => 1,
            Self::Stack => 2,
        }
    }
}

/// Where a user virtual address lives.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Location {
    pub segment: SegmentId,
    /// Page index within the segment.
    pub index: usize,
}

#[derive(Default)]
pub struct AddressSpace {
    regions: [Option<Region>; MAX_REGIONS],
    tables: [Option<PageTable>; 3],
    loaded: bool,
}

impl AddressSpace {
    /// An address space with no regions and no page tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the next general-purpose region.
    ///
    /// The range is rounded down to a page boundary at the start and up to
    /// whole pages at the end. The first region becomes [`SegmentId::Text`],
    /// the second [`SegmentId::Data`]. Permissions are recorded only.
    ///
    /// # Errors
    /// - [`VmError::TooManyRegions`] once both regions are defined.
    /// - [`VmError::InvalidRegion`] for a range covering no pages or one reaching into
    ///   kernel space.
    pub fn define_region(
        &mut self,
        vaddr: VirtualAddress,
        size: u32,
        flags: RegionFlags,
    ) -> Result<SegmentId, VmError> {
        let region = Region::from_request(vaddr, size, flags)?;
        let Some(slot) = self.regions.iter().position(Option::is_none) else {
            warn!("vm: too many regions, rejecting {region:?}");
            return Err(VmError::TooManyRegions);
        };
        self.regions[slot] = Some(region);

        let segment = if slot == 0 { SegmentId::Text } else { SegmentId::Data };
        debug!("vm: defined {segment:?} {region:?}");
        Ok(segment)
    }

    /// The region of `segment`, if defined. The stack is always defined.
    #[must_use]
    pub fn region(&self, segment: SegmentId) -> Option<Region> {
        match segment {
            SegmentId::Text => self.regions[0],
            SegmentId::Data => self.regions[1],
            SegmentId::Stack => Some(Region::stack()),
        }
    }

    /// The page table of `segment`, once [`prepare_load`](Self::prepare_load)
    /// has created it.
    #[must_use]
    pub fn page_table(&self, segment: SegmentId) -> Option<&PageTable> {
        self.tables[segment.slot()].as_ref()
    }

    /// Whether [`complete_load`](Self::complete_load) has run.
    #[inline]
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether stores to `segment` are currently allowed.
    #[inline]
    #[must_use]
    pub fn is_writable(&self, segment: SegmentId) -> bool {
        !(segment == SegmentId::Text && self.loaded)
    }

    /// Back every page of every defined region and of the stack with a
    /// zeroed frame.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if a frame cannot be allocated. Frames
    /// allocated so far stay in the page tables; [`destroy`](Self::destroy)
    /// releases them.
    pub fn prepare_load<M>(&mut self, alloc: &FrameAllocator<M>) -> Result<(), VmError>
    where
        M: BootMemory + FrameMemory,
    {
        for segment in SegmentId::ALL {
            let Some(region) = self.region(segment) else {
                continue;
            };
            let table = self.tables[segment.slot()]
                .get_or_insert_with(|| PageTable::new(region.first(), region.pages()));
            table.populate(alloc).inspect_err(|e| {
                warn!("vm: prepare_load of {segment:?} failed: {e}");
            })?;
        }
        debug!("vm: prepared {} pages", self.populated());
        Ok(())
    }

    /// Mark loading as finished and drop every translation from the TLB so
    /// the read-only text mapping takes effect.
    pub fn complete_load<T: Tlb, I: InterruptControl>(&mut self, tlb: &mut LocalTlb<T, I>) {
        self.loaded = true;
        tlb.activate();
        debug!("vm: load complete");
    }

    /// The initial user stack pointer.
    ///
    /// # Panics
    /// If the stack has no page table yet, i.e. before
    /// [`prepare_load`](Self::prepare_load).
    #[must_use]
    pub fn define_stack(&self) -> VirtualAddress {
        assert!(
            self.tables[SegmentId::Stack.slot()].is_some(),
            "define_stack before the stack page table exists"
        );
        VirtualAddress::new(USERSTACK)
    }

    /// Release every frame (stack, then data, then text) and the address
    /// space itself. Safe after a partially failed
    /// [`prepare_load`](Self::prepare_load).
    pub fn destroy<M: BootMemory>(mut self, alloc: &FrameAllocator<M>) {
        let mut released = 0;
        for segment in [SegmentId::Stack, SegmentId::Data, SegmentId::Text] {
            if let Some(mut table) = self.tables[segment.slot()].take() {
                released += table.release(alloc);
            }
        }
        debug!("vm: destroyed address space, released {released} frames");
    }

    /// An independent copy with the same regions and a byte-for-byte copy of
    /// every page.
    ///
    /// The copy starts out not loaded: its text stays writable until
    /// [`complete_load`](Self::complete_load) is called on it.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if the copy cannot be backed. The partial
    /// copy is destroyed; `self` is never modified.
    pub fn duplicate<M>(&self, alloc: &FrameAllocator<M>) -> Result<Self, VmError>
    where
        M: BootMemory + FrameMemory,
    {
        let mut copy = Self {
            regions: self.regions,
            tables: [None, None, None],
            loaded: false,
        };
        if let Err(e) = copy.prepare_load(alloc) {
            copy.destroy(alloc);
            return Err(e);
        }

        let mut copied = 0;
        for segment in SegmentId::ALL {
            let (Some(src), Some(dst)) = (self.page_table(segment), copy.page_table(segment)) else {
                continue;
            };
            for index in 0..src.len() {
                if let (Some(from), Some(to)) = (src.frame(index), dst.frame(index)) {
                    alloc.memory().copy_frame(to, from);
                    copied += 1;
                }
            }
        }
        debug!("vm: duplicated address space, copied {copied} pages");
        Ok(copy)
    }

    /// Which segment and page index `va` falls into. Text is checked first,
    /// then data, then the stack.
    #[must_use]
    pub fn locate(&self, va: VirtualAddress) -> Option<Location> {
        let page = va.page();
        SegmentId::ALL.into_iter().find_map(|segment| {
            let index = self.region(segment)?.index_of(page)?;
            Some(Location { segment, index })
        })
    }

    /// The frame backing the page at `location`, if populated.
    #[must_use]
    pub fn frame_at(&self, location: Location) -> Option<PhysicalFrame> {
        self.page_table(location.segment)?.frame(location.index)
    }

    /// Physical address of `va` as seen through the page tables.
    ///
    /// # Errors
    /// [`VmError::AccessViolation`] if `va` is outside all regions or not
    /// backed.
    pub fn translate(&self, va: VirtualAddress) -> Result<PhysicalAddress, VmError> {
        let frame = self
            .locate(va)
            .and_then(|location| self.frame_at(location))
            .ok_or(VmError::unmapped(va))?;
        Ok(frame.join(va.offset()))
    }

    /// Copy `bytes` from the kernel into user memory at `va`.
    ///
    /// Works below the TLB and ignores the read-only rule, as the loader
    /// needs to.
    ///
    /// # Errors
    /// [`VmError::AccessViolation`] if any byte of the range is unmapped;
    /// bytes before the failing page have been written.
    pub fn copy_out<M: FrameMemory>(&self, memory: &M, va: VirtualAddress, bytes: &[u8]) -> Result<(), VmError> {
        self.for_each_chunk(va, bytes.len(), |pa, range| memory.write(pa, &bytes[range]))
    }

    /// Copy user memory at `va` into `buf`.
    ///
    /// # Errors
    /// [`VmError::AccessViolation`] if any byte of the range is unmapped.
    pub fn copy_in<M: FrameMemory>(&self, memory: &M, va: VirtualAddress, buf: &mut [u8]) -> Result<(), VmError> {
        let len = buf.len();
        self.for_each_chunk(va, len, |pa, range| memory.read(pa, &mut buf[range]))
    }

    /// Split `[va, va + len)` at page boundaries and hand each piece's
    /// physical address and buffer range to `f`.
    fn for_each_chunk(
        &self,
        va: VirtualAddress,
        len: usize,
        mut f: impl FnMut(PhysicalAddress, core::ops::Range<usize>),
    ) -> Result<(), VmError> {
        let mut done = 0;
        while done < len {
            let offset = u32::try_from(done).map_err(|_| VmError::unmapped(va))?;
            let at = va.checked_add(offset).ok_or(VmError::unmapped(va))?;
            let pa = self.translate(at)?;
            let chunk = ((PAGE_SIZE - at.offset()) as usize).min(len - done);
            f(pa, done..done + chunk);
            done += chunk;
        }
        Ok(())
    }

    fn populated(&self) -> usize {
        self.tables.iter().flatten().map(PageTable::populated).sum()
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        let leaked = self.populated();
        if leaked > 0 {
            warn!("vm: address space dropped without destroy, leaking {leaked} frames");
        }
    }
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("text", &self.regions[0])
            .field("data", &self.regions[1])
            .field("populated", &self.populated())
            .field("loaded", &self.loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Violation;
    use kernel_alloc::SimulatedRam;
    use kernel_info::memory::STACK_PAGES;
    use kernel_sync::SoftInterrupts;
    use kernel_tlb::SoftTlb;

    const TEXT: u32 = 0x0040_0000;
    const DATA: u32 = 0x1000_0000;

    fn allocator(frames: u32) -> FrameAllocator<SimulatedRam> {
        let alloc = FrameAllocator::new(SimulatedRam::new(frames * PAGE_SIZE, PAGE_SIZE));
        alloc.bootstrap().unwrap();
        alloc
    }

    fn two_regions() -> AddressSpace {
        let mut space = AddressSpace::new();
        let rx = RegionFlags::READ | RegionFlags::EXECUTE;
        let rw = RegionFlags::READ | RegionFlags::WRITE;
        assert_eq!(space.define_region(VirtualAddress::new(TEXT), 0x2800, rx), Ok(SegmentId::Text));
        assert_eq!(space.define_region(VirtualAddress::new(DATA + 0x10), 0x1000, rw), Ok(SegmentId::Data));
        space
    }

    #[test]
    fn third_region_is_rejected() {
        let mut space = two_regions();
        let err = space.define_region(VirtualAddress::new(0x2000_0000), 0x1000, RegionFlags::READ);
        assert_eq!(err, Err(VmError::TooManyRegions));
        assert_eq!(space.region(SegmentId::Data).unwrap().pages(), 2);
    }

    #[test]
    fn prepare_load_backs_every_page_with_zeroes() {
        let alloc = allocator(64);
        let mut space = two_regions();
        alloc.memory().write(PhysicalFrame::from_index(40).base(), &[0x55; 64]);
        space.prepare_load(&alloc).unwrap();

        assert_eq!(space.populated(), 3 + 2 + STACK_PAGES);
        for segment in SegmentId::ALL {
            let table = space.page_table(segment).unwrap();
            for index in 0..table.len() {
                let mut page = [0xffu8; PAGE_SIZE as usize];
                alloc.memory().read(table.frame(index).unwrap().base(), &mut page);
                assert!(page.iter().all(|&b| b == 0), "{segment:?}[{index}] not zeroed");
            }
        }
        space.destroy(&alloc);
    }

    #[test]
    fn destroy_returns_every_frame() {
        let alloc = allocator(64);
        let initial = alloc.snapshot().unwrap();
        let mut space = two_regions();
        space.prepare_load(&alloc).unwrap();
        assert_eq!(space.define_stack(), VirtualAddress::new(USERSTACK));
        space.destroy(&alloc);
        assert_eq!(alloc.snapshot().unwrap(), initial);
    }

    #[test]
    fn failed_prepare_load_is_reclaimed_by_destroy() {
        // 16 frames: 1 image, 1 table, 14 usable; 17 are needed.
        let alloc = allocator(16);
        let initial = alloc.snapshot().unwrap();
        let mut space = two_regions();
        let err = space.prepare_load(&alloc).unwrap_err();
        assert!(matches!(err, VmError::OutOfMemory(_)));
        assert_eq!(alloc.stats().unwrap().free, 0);
        space.destroy(&alloc);
        assert_eq!(alloc.snapshot().unwrap(), initial);
    }

    #[test]
    #[should_panic(expected = "define_stack")]
    fn define_stack_requires_stack_table() {
        let _ = AddressSpace::new().define_stack();
    }

    #[test]
    fn copy_out_and_in_cross_page_boundaries() {
        let alloc = allocator(64);
        let mut space = two_regions();
        space.prepare_load(&alloc).unwrap();

        let va = VirtualAddress::new(TEXT + PAGE_SIZE - 3);
        space.copy_out(alloc.memory(), va, b"boundary").unwrap();
        let mut buf = [0u8; 8];
        space.copy_in(alloc.memory(), va, &mut buf).unwrap();
        assert_eq!(&buf, b"boundary");

        let past = VirtualAddress::new(TEXT + 3 * PAGE_SIZE - 2);
        assert!(matches!(
            space.copy_out(alloc.memory(), past, b"abcd"),
            Err(VmError::AccessViolation { violation: Violation::Unmapped, .. })
        ));
        space.destroy(&alloc);
    }

    /// Page-sized pattern unique to `(segment, index)`.
    fn pattern(segment: SegmentId, index: usize, salt: u8) -> Vec<u8> {
        let seed = u8::try_from(segment.slot() * 16 + index).unwrap() ^ salt;
        (0..PAGE_SIZE).map(|i| seed.wrapping_add(i as u8)).collect()
    }

    fn pages(space: &AddressSpace) -> Vec<(SegmentId, usize, VirtualAddress)> {
        SegmentId::ALL
            .into_iter()
            .flat_map(|segment| {
                let table = space.page_table(segment).unwrap();
                (0..table.len()).map(move |i| (segment, i, table.first().add_pages(i).unwrap().base()))
            })
            .collect()
    }

    #[test]
    fn duplicate_is_independent() {
        let alloc = allocator(64);
        let mut parent = two_regions();
        parent.prepare_load(&alloc).unwrap();
        for (segment, index, va) in pages(&parent) {
            parent.copy_out(alloc.memory(), va, &pattern(segment, index, 0)).unwrap();
        }

        let child = parent.duplicate(&alloc).unwrap();
        let mut page = vec![0u8; PAGE_SIZE as usize];
        for (segment, index, va) in pages(&child) {
            child.copy_in(alloc.memory(), va, &mut page).unwrap();
            assert_eq!(page, pattern(segment, index, 0), "{segment:?}[{index}]");
            assert_ne!(parent.translate(va), child.translate(va));
        }

        for (segment, index, va) in pages(&parent) {
            parent.copy_out(alloc.memory(), va, &pattern(segment, index, 0xa5)).unwrap();
        }
        for (segment, index, va) in pages(&child) {
            child.copy_in(alloc.memory(), va, &mut page).unwrap();
            assert_eq!(page, pattern(segment, index, 0), "{segment:?}[{index}] changed with the parent");
        }

        child.destroy(&alloc);
        parent.destroy(&alloc);
    }

    #[test]
    fn duplicate_of_loaded_space_starts_unloaded() {
        let irq = SoftInterrupts::new();
        let mut tlb = LocalTlb::new(SoftTlb::with_slots(4, 1), &irq);
        let alloc = allocator(64);
        let mut parent = two_regions();
        parent.prepare_load(&alloc).unwrap();
        parent.complete_load(&mut tlb);

        let mut child = parent.duplicate(&alloc).unwrap();
        assert!(parent.is_loaded());
        assert!(!child.is_loaded());
        assert!(child.is_writable(SegmentId::Text));

        child.complete_load(&mut tlb);
        assert!(!child.is_writable(SegmentId::Text));
        child.destroy(&alloc);
        parent.destroy(&alloc);
    }

    #[test]
    fn failed_duplicate_leaves_no_trace() {
        // 1 image + 1 table + 17 for the parent; not enough for a second copy.
        let alloc = allocator(24);
        let mut parent = two_regions();
        parent.prepare_load(&alloc).unwrap();
        let before = alloc.snapshot().unwrap();

        let err = parent.duplicate(&alloc).unwrap_err();
        assert_eq!(err.class(), crate::ErrorClass::OutOfMemory);
        assert_eq!(alloc.snapshot().unwrap(), before);
        parent.destroy(&alloc);
    }

    #[test]
    fn complete_load_freezes_text_and_flushes_tlb() {
        let irq = SoftInterrupts::new();
        let mut tlb = LocalTlb::new(SoftTlb::with_slots(4, 1), &irq);
        let alloc = allocator(64);
        let mut space = two_regions();
        space.prepare_load(&alloc).unwrap();

        let page = VirtualAddress::new(TEXT).page();
        tlb.install(page, space.translate(page.base()).unwrap().frame(), true);
        assert!(space.is_writable(SegmentId::Text));

        space.complete_load(&mut tlb);
        assert!(space.is_loaded());
        assert!(!space.is_writable(SegmentId::Text));
        assert!(space.is_writable(SegmentId::Data));
        assert_eq!(tlb.tlb().valid_count(), 0);
        space.destroy(&alloc);
    }

    #[test]
    fn locate_checks_text_data_stack() {
        let space = two_regions();
        let loc = |va| space.locate(VirtualAddress::new(va));
        assert_eq!(loc(TEXT + 0x2fff), Some(Location { segment: SegmentId::Text, index: 2 }));
        assert_eq!(loc(TEXT + 0x3000), None);
        assert_eq!(loc(DATA + 0x1fff), Some(Location { segment: SegmentId::Data, index: 1 }));
        assert_eq!(loc(USERSTACK - 1), Some(Location { segment: SegmentId::Stack, index: 11 }));
        assert_eq!(loc(USERSTACK - 12 * PAGE_SIZE - 1), None);
        assert_eq!(loc(0), None);
    }
}
