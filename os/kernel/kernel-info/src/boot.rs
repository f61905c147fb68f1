//! # Kernel Boot Information

use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};

/// Physical RAM extent reported by the boot code.
///
/// Everything below [`first_free`](Self::first_free) is already in use (kernel
/// image, boot-time stolen pages); everything from there up to
/// [`end`](Self::end) is available to the frame allocator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RamExtent {
    /// First physical address not yet consumed by the kernel.
    pub first_free: PhysicalAddress,
    /// One past the last installed physical address.
    pub end: PhysicalAddress,
}

impl RamExtent {
    /// Total number of frames in installed RAM, starting at physical address 0.
    #[inline]
    #[must_use]
    pub const fn total_frames(&self) -> usize {
        (self.end.as_u32() / PAGE_SIZE) as usize
    }

    /// Number of frames below [`first_free`](Self::first_free), rounding a
    /// partially used frame up.
    #[inline]
    #[must_use]
    pub const fn used_frames(&self) -> usize {
        self.first_free.as_u32().div_ceil(PAGE_SIZE) as usize
    }
}
