use crate::{PAGE_FRAME, PAGE_SHIFT, PAGE_SIZE, VirtualAddress};
use core::fmt;

/// Page-aligned base of a virtual page.
///
/// ### Invariants
/// - The low [`PAGE_SHIFT`] bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u32);

impl VirtualPage {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(addr.as_u32() & PAGE_FRAME)
    }

    /// Page with the given virtual page number.
    #[inline]
    #[must_use]
    pub const fn from_number(vpn: u32) -> Self {
        debug_assert!(vpn < (1 << (32 - PAGE_SHIFT)));
        Self(vpn << PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0)
    }

    /// Virtual page number.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0 >> PAGE_SHIFT
    }

    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> VirtualAddress {
        debug_assert!(offset < PAGE_SIZE);
        VirtualAddress::new(self.0 | offset)
    }

    /// The page `count` pages above this one, or `None` on wrap-around.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn add_pages(self, count: usize) -> Option<Self> {
        if count >= (1 << (32 - PAGE_SHIFT)) {
            return None;
        }
        match self.0.checked_add((count as u32) << PAGE_SHIFT) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Number of pages from `earlier` up to `self`, or `None` if `earlier`
    /// lies above `self`.
    #[inline]
    #[must_use]
    pub const fn pages_since(self, earlier: Self) -> Option<usize> {
        if self.0 < earlier.0 {
            None
        } else {
            Some(((self.0 - earlier.0) >> PAGE_SHIFT) as usize)
        }
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.base(), f)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:08X})", self.0)
    }
}

impl From<VirtualPage> for VirtualAddress {
    fn from(value: VirtualPage) -> Self {
        value.base()
    }
}
