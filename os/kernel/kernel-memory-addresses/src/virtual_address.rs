use crate::{KSEG0_BASE, KSEG1_BASE, PAGE_SIZE, PhysicalAddress, VirtualPage};
use core::fmt;
use core::ops::Add;

/// Virtual memory address.
///
/// Does not say which address space it belongs to; it only carries the
/// *kind* of address at the type level.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x0040_1234);
/// let (vp, off) = va.split();
/// assert_eq!(vp.join(off), va);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualPage {
        VirtualPage::containing_address(self)
    }

    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 & (PAGE_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn split(self) -> (VirtualPage, u32) {
        (self.page(), self.offset())
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Physical address behind a direct-mapped kernel address, or `None` if
    /// this address lies outside the direct-mapped segment.
    #[inline]
    #[must_use]
    pub const fn kseg0_to_physical(self) -> Option<PhysicalAddress> {
        if self.0 >= KSEG0_BASE && self.0 < KSEG1_BASE {
            Some(PhysicalAddress::new(self.0 - KSEG0_BASE))
        } else {
            None
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<VirtualAddress> for u32 {
    #[inline]
    fn from(a: VirtualAddress) -> Self {
        a.as_u32()
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
