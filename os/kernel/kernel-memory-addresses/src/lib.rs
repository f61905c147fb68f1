//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the 32-bit addresses handled by the virtual
//! memory subsystem.
//!
//! ## Overview
//!
//! The machine has a single page size of 4 KiB and a software-managed TLB, so
//! the kernel juggles three kinds of numbers all day long: user virtual
//! addresses, physical addresses, and kernel virtual addresses in the
//! direct-mapped segment. This crate keeps them apart at compile time:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | A byte address in a (user or kernel) virtual address space. |
//! | [`VirtualPage`] | The page-aligned base of a virtual page. |
//! | [`PhysicalAddress`] | A byte address in physical RAM. |
//! | [`PhysicalFrame`] | The page-aligned base of a physical frame. |
//!
//! ## Direct-mapped kernel segment
//!
//! Physical memory is visible to the kernel through the unmapped, cached
//! segment starting at [`KSEG0_BASE`]: physical address `pa` is reachable at
//! kernel virtual address `KSEG0_BASE + pa`. See [`PhysicalAddress::to_kseg0`]
//! and [`VirtualAddress::kseg0_to_physical`].
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0040_1234);
//! let (page, offset) = va.split();
//! assert_eq!(page.base().as_u32(), 0x0040_1000);
//! assert_eq!(offset, 0x234);
//! assert_eq!(page.join(offset), va);
//!
//! let frame = PhysicalFrame::from_index(3);
//! assert_eq!(frame.base().as_u32(), 3 * PAGE_SIZE);
//! assert_eq!(frame.base().to_kseg0().as_u32(), 0x8000_3000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod physical_address;
mod physical_frame;
mod virtual_address;
mod virtual_page;

pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_frame::PhysicalFrame;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// `log2(PAGE_SIZE)`, i.e. the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the page-number bits of an address.
pub const PAGE_FRAME: u32 = !(PAGE_SIZE - 1);

/// Base of the direct-mapped kernel segment.
pub const KSEG0_BASE: u32 = 0x8000_0000;

/// Base of the mapped kernel segment that follows the direct map.
pub const KSEG1_BASE: u32 = 0xa000_0000;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(1 << PAGE_SHIFT == PAGE_SIZE);
};

/// Align `x` down to the nearest page boundary.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(0), 0);
/// assert_eq!(align_down(4095), 0);
/// assert_eq!(align_down(4097), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u32) -> u32 {
    x & PAGE_FRAME
}

/// Align `x` up to the nearest page boundary, or `None` if that overflows.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(1), Some(4096));
/// assert_eq!(align_up(4096), Some(4096));
/// assert_eq!(align_up(u32::MAX), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u32) -> Option<u32> {
    match x.checked_add(PAGE_SIZE - 1) {
        Some(v) => Some(v & PAGE_FRAME),
        None => None,
    }
}

/// Number of pages needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u32) -> u32 {
    bytes.div_ceil(PAGE_SIZE)
}
