use crate::VmError;
use core::fmt;
use kernel_info::memory::{STACK_BASE, STACK_PAGES, USERSPACE_END};
use kernel_memory_addresses::{PAGE_FRAME, PAGE_SIZE, VirtualAddress, VirtualPage, pages_for};

bitflags::bitflags! {
    /// Permissions requested for a region.
    ///
    /// Recorded for bookkeeping; the fault handler only enforces the
    /// read-only rule for the first region after loading.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct RegionFlags: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

/// A page-aligned, contiguous range of user virtual pages.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Region {
    first: VirtualPage,
    pages: usize,
    flags: RegionFlags,
}

impl Region {
    /// Round `[vaddr, vaddr + size)` out to whole pages. The in-page offset
    /// of `vaddr` counts towards the size, so an unaligned request of zero
    /// bytes still covers the page it starts in.
    ///
    /// # Errors
    /// [`VmError::InvalidRegion`] if the rounded region has no pages or
    /// reaches into kernel space.
    pub fn from_request(vaddr: VirtualAddress, size: u32, flags: RegionFlags) -> Result<Self, VmError> {
        let invalid = VmError::InvalidRegion { base: vaddr, size };
        let end = vaddr.as_u32().checked_add(size).ok_or(invalid)?;
        if end > USERSPACE_END {
            return Err(invalid);
        }

        let base = vaddr.as_u32() & PAGE_FRAME;
        let pages = pages_for(end - base) as usize;
        if pages == 0 {
            return Err(invalid);
        }
        Ok(Self {
            first: VirtualPage::containing_address(vaddr),
            pages,
            flags,
        })
    }

    /// The fixed user stack window directly below [`USERSTACK`](kernel_info::memory::USERSTACK).
    #[must_use]
    pub const fn stack() -> Self {
        Self {
            first: VirtualPage::containing_address(VirtualAddress::new(STACK_BASE)),
            pages: STACK_PAGES,
            flags: RegionFlags::READ.union(RegionFlags::WRITE),
        }
    }

    #[inline]
    #[must_use]
    pub const fn first(&self) -> VirtualPage {
        self.first
    }

    #[inline]
    #[must_use]
    pub const fn pages(&self) -> usize {
        self.pages
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// Lowest address of the region.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.first.base()
    }

    /// Size in bytes.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn size(&self) -> u32 {
        self.pages as u32 * PAGE_SIZE
    }

    /// Index of `page` within the region, if it lies inside.
    #[inline]
    #[must_use]
    pub fn index_of(&self, page: VirtualPage) -> Option<usize> {
        page.pages_since(self.first).filter(|&i| i < self.pages)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, page: VirtualPage) -> bool {
        self.index_of(page).is_some()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region({}..{:#010x}, {} pages, {:?})",
            self.base(),
            u64::from(self.base().as_u32()) + u64::from(self.size()),
            self.pages,
            self.flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_out_to_pages() {
        let r = Region::from_request(VirtualAddress::new(0x0040_0ff0), 0x20, RegionFlags::READ).unwrap();
        assert_eq!(r.base(), VirtualAddress::new(0x0040_0000));
        assert_eq!(r.pages(), 2);
        assert_eq!(r.size(), 0x2000);

        let r = Region::from_request(VirtualAddress::new(0x1000_0000), 0x1000, RegionFlags::all()).unwrap();
        assert_eq!(r.pages(), 1);
    }

    #[test]
    fn rejects_empty_and_kernel_ranges() {
        let flags = RegionFlags::READ;
        assert_eq!(
            Region::from_request(VirtualAddress::new(0x1000), 0, flags),
            Err(VmError::InvalidRegion {
                base: VirtualAddress::new(0x1000),
                size: 0
            })
        );
        assert!(Region::from_request(VirtualAddress::new(0x7fff_f000), 0x2000, flags).is_err());
        assert!(Region::from_request(VirtualAddress::new(0xffff_f000), 0x2000, flags).is_err());
        assert!(Region::from_request(VirtualAddress::new(0x7fff_f000), 0x1000, flags).is_ok());
    }

    #[test]
    fn unaligned_empty_request_covers_its_page() {
        let r = Region::from_request(VirtualAddress::new(0x0040_0010), 0, RegionFlags::READ).unwrap();
        assert_eq!(r.base(), VirtualAddress::new(0x0040_0000));
        assert_eq!(r.pages(), 1);
        assert_eq!(r.flags(), RegionFlags::READ);
    }

    #[test]
    fn membership() {
        let r = Region::from_request(VirtualAddress::new(0x0040_0000), 0x3000, RegionFlags::READ).unwrap();
        assert_eq!(r.index_of(VirtualAddress::new(0x0040_2fff).page()), Some(2));
        assert_eq!(r.index_of(VirtualAddress::new(0x0040_3000).page()), None);
        assert_eq!(r.index_of(VirtualAddress::new(0x003f_f000).page()), None);
    }

    #[test]
    fn stack_window() {
        let s = Region::stack();
        assert_eq!(s.base().as_u32() + s.size(), 0x8000_0000);
        assert_eq!(s.pages(), 12);
        assert!(s.contains(VirtualAddress::new(0x7fff_fffc).page()));
    }
}
