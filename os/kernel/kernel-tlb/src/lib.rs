//! # Software-Managed TLB
//!
//! The target CPU has no hardware page-table walker: every translation the
//! MMU uses lives in a small, fully associative TLB that the kernel fills by
//! hand from its fault handler. This crate models that hardware and the
//! kernel's maintenance of it.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  LocalTlb            (per-core maintenance)         │
//! │    • activate: invalidate every slot                │
//! │    • install: first invalid slot, else random evict │
//! │    • shootdown: unsupported, panics                 │
//! └─────────────────┬───────────────────────────────────┘
//!                   │  interrupts disabled via IrqGuard
//! ┌─────────────────▼───────────────────────────────────┐
//! │  Tlb trait           (raw slot access)              │
//! │    • read / write one slot                          │
//! │    • pick a random slot                             │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │  SoftTlb             (seeded software model)        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Entry format
//!
//! A slot holds an [`EntryHi`] (virtual page number and address-space id) and
//! an [`EntryLo`] (physical frame number plus `VALID`, `DIRTY`, `NOCACHE`,
//! `GLOBAL`). `DIRTY` doubles as the write-enable bit: a store through an
//! entry without it raises a "modify" exception.
//!
//! ## Concurrency
//!
//! A TLB belongs to exactly one core. [`LocalTlb`] performs every
//! read-modify-write with the core's interrupts disabled; nothing protects a
//! TLB against other cores, and cross-core shootdown is deliberately
//! unsupported.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod entry;
mod local;
mod policy;
mod soft;

pub use crate::entry::{EntryHi, EntryLo, TlbEntry};
pub use crate::local::LocalTlb;
pub use crate::policy::{SlotChoice, select_slot};
pub use crate::soft::SoftTlb;

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress, VirtualPage};

/// Kind of memory access presented to the MMU.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Load,
    Store,
}

/// Exception raised by the MMU when a translation cannot be completed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TlbException {
    /// No valid entry for a load.
    LoadMiss(VirtualAddress),
    /// No valid entry for a store.
    StoreMiss(VirtualAddress),
    /// A store hit a valid entry without the `DIRTY` (write-enable) bit.
    Modify(VirtualAddress),
}

impl TlbException {
    /// The address whose translation failed.
    #[must_use]
    pub const fn address(self) -> VirtualAddress {
        match self {
            Self::LoadMiss(va) | Self::StoreMiss(va) | Self::Modify(va) => va,
        }
    }
}

/// Raw access to one core's hardware TLB.
///
/// Callers are responsible for disabling interrupts around read-modify-write
/// sequences; see [`LocalTlb`].
pub trait Tlb {
    /// Number of slots.
    fn slots(&self) -> usize;

    /// Read one slot.
    fn read(&self, slot: usize) -> TlbEntry;

    /// Overwrite one slot.
    fn write(&mut self, slot: usize, entry: TlbEntry);

    /// Pick a slot uniformly at random.
    fn random_slot(&mut self) -> usize;

    /// Slot holding a valid entry for `page`, if any.
    fn probe(&self, page: VirtualPage) -> Option<usize> {
        (0..self.slots()).find(|&slot| {
            let e = self.read(slot);
            e.is_valid() && e.page() == page
        })
    }

    /// Translate `va` the way the MMU would.
    ///
    /// # Errors
    /// Returns the exception the hardware would raise.
    fn translate(&self, va: VirtualAddress, access: Access) -> Result<PhysicalAddress, TlbException> {
        let (page, offset) = va.split();
        let Some(slot) = self.probe(page) else {
            return Err(match access {
                Access::Load => TlbException::LoadMiss(va),
                Access::Store => TlbException::StoreMiss(va),
            });
        };
        let entry = self.read(slot);
        if access == Access::Store && !entry.is_writable() {
            return Err(TlbException::Modify(va));
        }
        Ok(entry.frame().join(offset))
    }
}

impl<T: Tlb + ?Sized> Tlb for &mut T {
    fn slots(&self) -> usize {
        (**self).slots()
    }

    fn read(&self, slot: usize) -> TlbEntry {
        (**self).read(slot)
    }

    fn write(&mut self, slot: usize, entry: TlbEntry) {
        (**self).write(slot, entry);
    }

    fn random_slot(&mut self) -> usize {
        (**self).random_slot()
    }
}
