use crate::{Tlb, TlbEntry};
use alloc::vec::Vec;
use kernel_info::memory::NUM_TLB;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Software model of one core's TLB.
///
/// Random slot selection is driven by a seeded [`SmallRng`], so eviction
/// sequences are reproducible for a given seed.
pub struct SoftTlb {
    entries: Vec<TlbEntry>,
    rng: SmallRng,
}

impl SoftTlb {
    /// A TLB with the machine's [`NUM_TLB`] slots, all invalid.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_slots(NUM_TLB, seed)
    }

    /// A TLB with `slots` slots, all invalid.
    ///
    /// # Panics
    /// If `slots` is zero.
    #[must_use]
    pub fn with_slots(slots: usize, seed: u64) -> Self {
        assert!(slots > 0, "a TLB needs at least one slot");
        Self {
            entries: (0..slots).map(TlbEntry::invalid).collect(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Number of slots currently holding a valid entry.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }
}

impl Tlb for SoftTlb {
    fn slots(&self) -> usize {
        self.entries.len()
    }

    fn read(&self, slot: usize) -> TlbEntry {
        self.entries[slot]
    }

    fn write(&mut self, slot: usize, entry: TlbEntry) {
        self.entries[slot] = entry;
    }

    fn random_slot(&mut self) -> usize {
        self.rng.gen_range(0..self.entries.len())
    }
}
