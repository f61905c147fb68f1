use crate::{Access, SlotChoice, Tlb, TlbEntry, TlbException, select_slot};
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress, VirtualPage};
use kernel_sync::{InterruptControl, IrqGuard};
use log::{debug, trace};

/// One core's TLB together with that core's interrupt control.
///
/// Every operation that touches the TLB runs with local interrupts disabled
/// so that an interrupt handler on this core cannot interleave with the
/// read-modify-write of a slot.
pub struct LocalTlb<T: Tlb, I: InterruptControl> {
    tlb: T,
    irq: I,
}

impl<T: Tlb, I: InterruptControl> LocalTlb<T, I> {
    pub const fn new(tlb: T, irq: I) -> Self {
        Self { tlb, irq }
    }

    #[inline]
    #[must_use]
    pub const fn tlb(&self) -> &T {
        &self.tlb
    }

    #[inline]
    pub const fn tlb_mut(&mut self) -> &mut T {
        &mut self.tlb
    }

    #[inline]
    #[must_use]
    pub const fn irq(&self) -> &I {
        &self.irq
    }

    /// Invalidate every slot.
    ///
    /// Called whenever the running address space changes so the next
    /// address space never sees the previous one's translations.
    pub fn activate(&mut self) {
        let _irq = IrqGuard::new(&self.irq);
        for slot in 0..self.tlb.slots() {
            self.tlb.write(slot, TlbEntry::invalid(slot));
        }
        trace!("tlb: invalidated {} slots", self.tlb.slots());
    }

    /// Nothing to do; translations are dropped on the next [`activate`](Self::activate).
    #[allow(clippy::unused_self)]
    pub const fn deactivate(&self) {}

    /// Install a translation of `page` to `frame`.
    ///
    /// Uses the first invalid slot, or evicts a random one when all slots are
    /// valid. A stale entry for the same page is replaced in place so no two
    /// slots ever match the same page.
    pub fn install(&mut self, page: VirtualPage, frame: PhysicalFrame, writable: bool) -> SlotChoice {
        let entry = TlbEntry::mapping(page, frame, writable);

        let _irq = IrqGuard::new(&self.irq);
        let choice = self
            .tlb
            .probe(page)
            .map_or_else(|| select_slot(&mut self.tlb), SlotChoice::Vacant);
        self.tlb.write(choice.slot(), entry);

        debug!(
            "tlb: {page} -> {frame} ({}) in slot {} ({})",
            if writable { "rw" } else { "ro" },
            choice.slot(),
            if matches!(choice, SlotChoice::Evict(_)) { "evicted" } else { "vacant" },
        );
        choice
    }

    /// Translate `va` through this core's TLB.
    ///
    /// # Errors
    /// The exception the MMU would raise.
    pub fn translate(&self, va: VirtualAddress, access: Access) -> Result<PhysicalAddress, TlbException> {
        self.tlb.translate(va, access)
    }

    /// Propagate a full invalidation to other cores.
    ///
    /// # Panics
    /// Always: cross-core shootdown is not supported.
    #[allow(clippy::unused_self)]
    pub fn shootdown_all(&self) -> ! {
        panic!("tlb: tried to do tlb shootdown (all)");
    }

    /// Propagate the invalidation of `page` to other cores.
    ///
    /// # Panics
    /// Always: cross-core shootdown is not supported.
    #[allow(clippy::unused_self)]
    pub fn shootdown(&self, page: VirtualPage) -> ! {
        panic!("tlb: tried to do tlb shootdown ({page})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SoftTlb;
    use kernel_sync::SoftInterrupts;

    /// Records whether interrupts were off on every slot write.
    struct SpyTlb<'a> {
        inner: SoftTlb,
        irq: &'a SoftInterrupts,
        writes_with_irq_on: usize,
        writes: usize,
    }

    impl Tlb for SpyTlb<'_> {
        fn slots(&self) -> usize {
            self.inner.slots()
        }

        fn read(&self, slot: usize) -> TlbEntry {
            self.inner.read(slot)
        }

        fn write(&mut self, slot: usize, entry: TlbEntry) {
            self.writes += 1;
            if self.irq.enabled() {
                self.writes_with_irq_on += 1;
            }
            self.inner.write(slot, entry);
        }

        fn random_slot(&mut self) -> usize {
            self.inner.random_slot()
        }
    }

    fn page(n: u32) -> VirtualPage {
        VirtualPage::from_number(0x400 + n)
    }

    #[test]
    fn install_fills_vacant_slots_then_evicts() {
        let irq = SoftInterrupts::new();
        let mut local = LocalTlb::new(SoftTlb::with_slots(4, 11), &irq);
        for n in 0..4 {
            let choice = local.install(page(n), PhysicalFrame::from_index(n as usize), true);
            assert_eq!(choice, SlotChoice::Vacant(n as usize));
        }
        let choice = local.install(page(9), PhysicalFrame::from_index(9), true);
        assert!(matches!(choice, SlotChoice::Evict(s) if s < 4));
        assert_eq!(local.tlb().valid_count(), 4);
        assert!(local.tlb().probe(page(9)).is_some());
    }

    #[test]
    fn reinstall_of_same_page_reuses_slot() {
        let irq = SoftInterrupts::new();
        let mut local = LocalTlb::new(SoftTlb::with_slots(4, 0), &irq);
        local.install(page(1), PhysicalFrame::from_index(1), false);
        let choice = local.install(page(1), PhysicalFrame::from_index(1), true);
        assert_eq!(choice, SlotChoice::Vacant(0));
        assert_eq!(local.tlb().valid_count(), 1);
        assert!(local.tlb().read(0).is_writable());
    }

    #[test]
    fn activate_invalidates_everything() {
        let irq = SoftInterrupts::new();
        let mut local = LocalTlb::new(SoftTlb::with_slots(8, 0), &irq);
        for n in 0..8 {
            local.install(page(n), PhysicalFrame::from_index(1), true);
        }
        local.activate();
        assert_eq!(local.tlb().valid_count(), 0);
        let va = page(3).base();
        assert_eq!(local.translate(va, Access::Load), Err(TlbException::LoadMiss(va)));
    }

    #[test]
    fn tlb_writes_happen_with_interrupts_disabled() {
        let irq = SoftInterrupts::new();
        let spy = SpyTlb {
            inner: SoftTlb::with_slots(2, 5),
            irq: &irq,
            writes_with_irq_on: 0,
            writes: 0,
        };
        let mut local = LocalTlb::new(spy, &irq);
        local.activate();
        for n in 0..5 {
            local.install(page(n), PhysicalFrame::from_index(2), n % 2 == 0);
        }
        assert!(irq.enabled(), "interrupts must be restored afterwards");
        assert_eq!(local.tlb().writes, 2 + 5);
        assert_eq!(local.tlb().writes_with_irq_on, 0);
    }

    #[test]
    #[should_panic(expected = "tlb shootdown")]
    fn shootdown_is_fatal() {
        let irq = SoftInterrupts::new();
        let local = LocalTlb::new(SoftTlb::with_slots(2, 0), &irq);
        local.shootdown(page(0));
    }

    #[test]
    #[should_panic(expected = "tlb shootdown")]
    fn shootdown_all_is_fatal() {
        let irq = SoftInterrupts::new();
        let local = LocalTlb::new(SoftTlb::with_slots(2, 0), &irq);
        local.shootdown_all();
    }
}
