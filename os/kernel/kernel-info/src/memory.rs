//! # Memory Layout

pub use kernel_memory_addresses::{KSEG0_BASE, KSEG1_BASE, PAGE_FRAME, PAGE_SHIFT, PAGE_SIZE};

/// First address above user space; also the initial user stack pointer.
pub const USERSTACK: u32 = 0x8000_0000;

/// End of the user VA range after which kernel space begins.
pub const USERSPACE_END: u32 = USERSTACK;

/// Number of pages in the fixed-size user stack (48 KiB).
pub const STACK_PAGES: usize = 12;

/// Lowest address of the user stack window.
#[allow(clippy::cast_possible_truncation)]
pub const STACK_BASE: u32 = USERSTACK - (STACK_PAGES as u32) * PAGE_SIZE;

/// Number of slots in the hardware TLB.
pub const NUM_TLB: usize = 64;

/// Number of general-purpose regions an address space may define.
pub const MAX_REGIONS: usize = 2;

const _: () = {
    assert!(USERSTACK.is_multiple_of(PAGE_SIZE));
    assert!(STACK_PAGES > 0);
    assert!(STACK_BASE < USERSTACK);
    assert!(USERSTACK <= KSEG0_BASE);
    assert!(NUM_TLB > 0);
};
