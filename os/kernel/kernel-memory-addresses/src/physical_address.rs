use crate::{KSEG0_BASE, KSEG1_BASE, PAGE_SIZE, PhysicalFrame, VirtualAddress};
use core::fmt;
use core::ops::Add;

/// Physical memory address.
///
/// Carries physical intent so it cannot be handed to code expecting a
/// virtual address by accident.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0002_0042);
/// let (frame, off) = pa.split();
/// assert_eq!(frame.join(off), pa);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
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

    /// The frame containing this address.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalFrame {
        PhysicalFrame::containing_address(self)
    }

    /// Byte offset inside the containing frame.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 & (PAGE_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn split(self) -> (PhysicalFrame, u32) {
        (self.frame(), self.offset())
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.offset() == 0
    }

    /// Kernel virtual address of this byte in the direct-mapped segment.
    ///
    /// Only the first 512 MiB of physical memory are reachable this way;
    /// that bound is debug-asserted.
    #[inline]
    #[must_use]
    pub const fn to_kseg0(self) -> VirtualAddress {
        debug_assert!(self.0 < KSEG1_BASE - KSEG0_BASE);
        VirtualAddress::new(self.0 + KSEG0_BASE)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:08X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for PhysicalAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u32 {
    #[inline]
    fn from(a: PhysicalAddress) -> Self {
        a.as_u32()
    }
}

impl Add<u32> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
