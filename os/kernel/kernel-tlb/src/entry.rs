//! # TLB entry layout
//!
//! | Register | Bits   | Field |
//! |----------|--------|-------|
//! | `EntryHi`| 31..12 | virtual page number |
//! |          | 11..6  | address-space id (unused, always 0) |
//! | `EntryLo`| 31..12 | physical frame number |
//! |          | 11     | `NOCACHE` |
//! |          | 10     | `DIRTY` (write enable) |
//! |          | 9      | `VALID` |
//! |          | 8      | `GLOBAL` |

use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::{PAGE_SHIFT, PhysicalAddress, PhysicalFrame, VirtualPage};

/// High word of a TLB entry: the tag that is matched against.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct EntryHi {
    #[bits(6)]
    __: u8,
    /// Address-space id. The kernel flushes on switch instead of tagging.
    #[bits(6)]
    pub pid: u8,
    /// Virtual page number.
    #[bits(20)]
    pub vpn: u32,
}

/// Low word of a TLB entry: the translation and its permission bits.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct EntryLo {
    #[bits(8)]
    __: u8,
    /// Match regardless of address-space id.
    pub global: bool,
    /// Entry participates in translation.
    pub valid: bool,
    /// Stores are permitted; without it a store raises a modify exception.
    pub dirty: bool,
    /// Bypass the cache.
    pub nocache: bool,
    /// Physical frame number.
    #[bits(20)]
    pub pfn: u32,
}

/// One TLB slot.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct TlbEntry {
    pub hi: EntryHi,
    pub lo: EntryLo,
}

/// First page number of the direct-mapped kernel segment. Invalid entries are
/// tagged with pages from there on, which user translations never use, and
/// each slot gets a distinct tag so no two entries ever match the same page.
const INVALID_VPN_BASE: u32 = 0x8_0000;

impl TlbEntry {
    /// The canonical invalid entry for `slot`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn invalid(slot: usize) -> Self {
        Self {
            hi: EntryHi::new().with_vpn(INVALID_VPN_BASE + slot as u32),
            lo: EntryLo::new(),
        }
    }

    /// A valid translation of `page` to `frame`, writable if `writable`.
    #[inline]
    #[must_use]
    pub const fn mapping(page: VirtualPage, frame: PhysicalFrame, writable: bool) -> Self {
        Self {
            hi: EntryHi::new().with_vpn(page.number()),
            lo: EntryLo::new()
                .with_pfn(frame.base().as_u32() >> PAGE_SHIFT)
                .with_valid(true)
                .with_dirty(writable),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.lo.valid()
    }

    #[inline]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.lo.dirty()
    }

    #[inline]
    #[must_use]
    pub const fn page(&self) -> VirtualPage {
        VirtualPage::from_number(self.hi.vpn())
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalFrame {
        PhysicalFrame::containing_address(PhysicalAddress::new(self.lo.pfn() << PAGE_SHIFT))
    }
}

impl fmt::Debug for TlbEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(
                f,
                "TlbEntry({} -> {}{})",
                self.page(),
                self.frame(),
                if self.is_writable() { " rw" } else { " ro" }
            )
        } else {
            write!(f, "TlbEntry(invalid, hi={:#010x})", self.hi.into_bits())
        }
    }
}
