use crate::Tlb;

/// Where [`select_slot`] decided a new entry goes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotChoice {
    /// The slot held no valid entry.
    Vacant(usize),
    /// Every slot was valid; this one was picked at random and is evicted.
    Evict(usize),
}

impl SlotChoice {
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        match self {
            Self::Vacant(slot) | Self::Evict(slot) => slot,
        }
    }
}

/// Insertion policy: the first slot without a valid entry, otherwise a slot
/// chosen uniformly at random via [`Tlb::random_slot`].
///
/// Must be called with interrupts disabled if the result is used to write.
pub fn select_slot<T: Tlb + ?Sized>(tlb: &mut T) -> SlotChoice {
    (0..tlb.slots())
        .find(|&slot| !tlb.read(slot).is_valid())
        .map_or_else(|| SlotChoice::Evict(tlb.random_slot()), SlotChoice::Vacant)
}
