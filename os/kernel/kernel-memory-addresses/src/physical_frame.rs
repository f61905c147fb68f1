use crate::{PAGE_FRAME, PAGE_SHIFT, PAGE_SIZE, PhysicalAddress};
use core::fmt;

/// Page-aligned base of a physical frame.
///
/// Frames are also identified by their **index**, i.e. `base / PAGE_SIZE`,
/// which is how the coremap addresses them.
///
/// ### Invariants
/// - The low [`PAGE_SHIFT`] bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalFrame(u32);

impl PhysicalFrame {
    /// Frame that contains `addr` (aligns down to a frame boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: PhysicalAddress) -> Self {
        Self(addr.as_u32() & PAGE_FRAME)
    }

    /// Frame with the given index.
    ///
    /// ### Debug assertions
    /// - Asserts the resulting base fits into 32 bits.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_index(index: usize) -> Self {
        debug_assert!(index < (1 << (32 - PAGE_SHIFT)));
        Self((index as u32) << PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> PhysicalAddress {
        debug_assert!(offset < PAGE_SIZE);
        PhysicalAddress::new(self.0 | offset)
    }

    /// The frame directly following this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + PAGE_SIZE)
    }
}

impl fmt::Display for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.base(), f)
    }
}

impl fmt::Debug for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalFrame(#{} @ 0x{:08X})", self.index(), self.0)
    }
}

impl From<PhysicalFrame> for PhysicalAddress {
    fn from(value: PhysicalFrame) -> Self {
        value.base()
    }
}
