//! # Per-Region Page Table
//!
//! One entry per virtual page of a region, indexed by the page's offset from
//! the region's first page. Each populated entry owns exactly one frame.
//!
//! An entry is `None` until [`PageTable::populate`] backs it, so a table left
//! half-populated by an allocation failure can still be released precisely.

use alloc::vec::Vec;
use core::fmt;
use kernel_alloc::{AllocError, BootMemory, FrameAllocator, FrameMemory, FrameRun};
use kernel_memory_addresses::{PhysicalFrame, VirtualPage};
use log::trace;

pub struct PageTable {
    first: VirtualPage,
    entries: Vec<Option<FrameRun>>,
}

impl PageTable {
    /// An empty table for `pages` pages starting at `first`.
    #[must_use]
    pub fn new(first: VirtualPage, pages: usize) -> Self {
        let mut entries = Vec::with_capacity(pages);
        entries.resize_with(pages, || None);
        Self { first, entries }
    }

    #[inline]
    #[must_use]
    pub const fn first(&self) -> VirtualPage {
        self.first
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frame backing the `index`-th page, if it has been populated.
    #[inline]
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<PhysicalFrame> {
        self.entries.get(index)?.as_ref().map(FrameRun::first)
    }

    /// Number of entries currently backed by a frame.
    #[must_use]
    pub fn populated(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// `(page, frame)` for every entry, in page order.
    pub fn iter(&self) -> impl Iterator<Item = (VirtualPage, Option<PhysicalFrame>)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            let page = self.first.add_pages(i)?;
            Some((page, e.as_ref().map(FrameRun::first)))
        })
    }

    /// Back every empty entry with one freshly zeroed frame.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] as soon as one allocation fails. Entries
    /// populated before the failure keep their frames.
    pub fn populate<M>(&mut self, alloc: &FrameAllocator<M>) -> Result<(), AllocError>
    where
        M: BootMemory + FrameMemory,
    {
        for entry in self.entries.iter_mut().filter(|e| e.is_none()) {
            *entry = Some(alloc.allocate_zeroed()?);
        }
        Ok(())
    }

    /// Release every populated entry's frame. Returns the number released.
    pub fn release<M: BootMemory>(&mut self, alloc: &FrameAllocator<M>) -> usize {
        let mut released = 0;
        for run in self.entries.iter_mut().filter_map(Option::take) {
            // A rejected release is already logged by the allocator.
            if alloc.release(run).is_ok() {
                released += 1;
            }
        }
        trace!("vm: released {released} frames of table at {}", self.first);
        released
    }
}

impl fmt::Display for PageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (page, frame)) in self.iter().enumerate() {
            match frame {
                Some(frame) => writeln!(f, "  [{i:>3}] {page} -> {frame}")?,
                None => writeln!(f, "  [{i:>3}] {page} -> (none)")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTable")
            .field("first", &self.first)
            .field("pages", &self.entries.len())
            .field("populated", &self.populated())
            .finish()
    }
}
