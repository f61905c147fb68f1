//! # TLB Fault Handling
//!
//! Every user access that misses the TLB traps into [`vm_fault`]. The
//! handler is stateless across faults:
//!
//! 1. A read-only violation is fatal to the faulting context.
//! 2. Without an address space there is nothing to resolve against; the
//!    caller must treat this as a kernel fault instead of retrying.
//! 3. The address is classified as text, data, stack or unmapped.
//! 4. The frame is looked up in that segment's page table.
//! 5. A translation is installed with interrupts disabled: read-only for
//!    text once loading has completed, writable otherwise.

use crate::address_space::{AddressSpace, Location, SegmentId};
use crate::{VmError, Violation};
use kernel_memory_addresses::{PhysicalFrame, VirtualAddress, VirtualPage};
use kernel_sync::InterruptControl;
use kernel_tlb::{LocalTlb, SlotChoice, Tlb, TlbException};
use log::{debug, trace};

/// What kind of access faulted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum FaultKind {
    /// A load missed the TLB.
    Read = 0,
    /// A store missed the TLB.
    Write = 1,
    /// A store hit a read-only entry.
    ReadOnly = 2,
}

impl TryFrom<u32> for FaultKind {
    type Error = VmError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            2 => Ok(Self::ReadOnly),
            other => Err(VmError::UnsupportedFault(other)),
        }
    }
}

impl From<TlbException> for FaultKind {
    fn from(e: TlbException) -> Self {
        match e {
            TlbException::LoadMiss(_) => Self::Read,
            TlbException::StoreMiss(_) => Self::Write,
            TlbException::Modify(_) => Self::ReadOnly,
        }
    }
}

/// The translation installed for a resolved fault.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub segment: SegmentId,
    pub page: VirtualPage,
    pub frame: PhysicalFrame,
    pub writable: bool,
    pub slot: SlotChoice,
}

/// Resolve a TLB fault at `address` against `space` and install the
/// translation into `tlb`.
///
/// # Errors
/// - [`VmError::AccessViolation`] for a read-only violation, for an address
///   outside every segment, and for a store miss on text after loading.
/// - [`VmError::KernelFault`] if there is no address space.
///
/// # Panics
/// If `space` does not have both regions defined and populated; faulting on a
/// half-built address space is a kernel bug.
pub fn vm_fault<T, I>(
    kind: FaultKind,
    address: VirtualAddress,
    space: Option<&AddressSpace>,
    tlb: &mut LocalTlb<T, I>,
) -> Result<Resolution, VmError>
where
    T: Tlb,
    I: InterruptControl,
{
    let page = address.page();
    debug!("vm: {kind:?} fault at {address}");

    if kind == FaultKind::ReadOnly {
        return Err(VmError::AccessViolation {
            address,
            violation: Violation::ReadOnly,
        });
    }

    let Some(space) = space else {
        return Err(VmError::KernelFault(address));
    };

    assert!(
        space.region(SegmentId::Text).is_some() && space.region(SegmentId::Data).is_some(),
        "vm: fault on an address space without both regions"
    );

    let Some(location @ Location { segment, .. }) = space.locate(address) else {
        return Err(VmError::unmapped(address));
    };

    if let Some(table) = space.page_table(segment) {
        trace!("vm: {segment:?} page table\n{table}");
    }
    let Some(frame) = space.frame_at(location) else {
        panic!("vm: fault on {segment:?} page {page} before prepare_load");
    };

    let writable = space.is_writable(segment);
    if kind == FaultKind::Write && !writable {
        return Err(VmError::AccessViolation {
            address,
            violation: Violation::ReadOnly,
        });
    }

    let slot = tlb.install(page, frame, writable);
    Ok(Resolution {
        segment,
        page,
        frame,
        writable,
        slot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegionFlags;
    use kernel_alloc::{FrameAllocator, SimulatedRam};
    use kernel_info::memory::USERSTACK;
    use kernel_memory_addresses::PAGE_SIZE;
    use kernel_sync::SoftInterrupts;
    use kernel_tlb::{Access, SoftTlb};

    const TEXT: u32 = 0x0040_0000;
    const DATA: u32 = 0x1000_0000;

    struct Machine {
        alloc: FrameAllocator<SimulatedRam>,
        irq: SoftInterrupts,
    }

    impl Machine {
        fn new() -> Self {
            let alloc = FrameAllocator::new(SimulatedRam::new(128 * PAGE_SIZE, PAGE_SIZE));
            alloc.bootstrap().unwrap();
            Self {
                alloc,
                irq: SoftInterrupts::new(),
            }
        }

        fn space(&self) -> AddressSpace {
            let mut space = AddressSpace::new();
            space
                .define_region(VirtualAddress::new(TEXT), 2 * PAGE_SIZE, RegionFlags::READ | RegionFlags::EXECUTE)
                .unwrap();
            space
                .define_region(VirtualAddress::new(DATA), PAGE_SIZE, RegionFlags::READ | RegionFlags::WRITE)
                .unwrap();
            space.prepare_load(&self.alloc).unwrap();
            space
        }

        fn tlb(&self, slots: usize) -> LocalTlb<SoftTlb, &SoftInterrupts> {
            LocalTlb::new(SoftTlb::with_slots(slots, 9), &self.irq)
        }
    }

    #[test]
    fn fault_codes() {
        assert_eq!(FaultKind::try_from(1), Ok(FaultKind::Write));
        assert_eq!(FaultKind::try_from(3), Err(VmError::UnsupportedFault(3)));
        let va = VirtualAddress::new(0x1234);
        assert_eq!(FaultKind::from(TlbException::Modify(va)), FaultKind::ReadOnly);
        assert_eq!(FaultKind::from(TlbException::StoreMiss(va)), FaultKind::Write);
    }

    #[test]
    fn read_fault_installs_translation() {
        let m = Machine::new();
        let space = m.space();
        let mut tlb = m.tlb(8);

        let va = VirtualAddress::new(TEXT + PAGE_SIZE + 0x10);
        assert!(tlb.translate(va, Access::Load).is_err());

        let r = vm_fault(FaultKind::Read, va, Some(&space), &mut tlb).unwrap();
        assert_eq!(r.segment, SegmentId::Text);
        assert_eq!(r.slot, SlotChoice::Vacant(0));
        assert!(r.writable);
        assert_eq!(tlb.translate(va, Access::Load), space.translate(va).map_err(|_| TlbException::LoadMiss(va)));

        space.destroy(&m.alloc);
    }

    #[test]
    fn text_is_writable_until_load_completes() {
        let m = Machine::new();
        let mut space = m.space();
        let mut tlb = m.tlb(8);
        let va = VirtualAddress::new(TEXT + 4);

        let r = vm_fault(FaultKind::Write, va, Some(&space), &mut tlb).unwrap();
        assert!(r.writable);
        assert!(tlb.translate(va, Access::Store).is_ok());

        space.complete_load(&mut tlb);

        let err = vm_fault(FaultKind::Write, va, Some(&space), &mut tlb).unwrap_err();
        assert_eq!(
            err,
            VmError::AccessViolation {
                address: va,
                violation: Violation::ReadOnly
            }
        );

        let r = vm_fault(FaultKind::Read, va, Some(&space), &mut tlb).unwrap();
        assert!(!r.writable);
        assert_eq!(tlb.translate(va, Access::Store), Err(TlbException::Modify(va)));

        let data = VirtualAddress::new(DATA);
        assert!(vm_fault(FaultKind::Write, data, Some(&space), &mut tlb).unwrap().writable);
        space.destroy(&m.alloc);
    }

    #[test]
    fn duplicated_text_accepts_writes_until_loaded() {
        let m = Machine::new();
        let mut parent = m.space();
        let mut tlb = m.tlb(8);
        parent.complete_load(&mut tlb);
        let va = VirtualAddress::new(TEXT + 8);

        let child = parent.duplicate(&m.alloc).unwrap();
        assert!(!child.is_loaded());
        let r = vm_fault(FaultKind::Write, va, Some(&child), &mut tlb).unwrap();
        assert!(r.writable);
        assert_eq!(Some(r.frame), child.page_table(SegmentId::Text).unwrap().frame(0));

        tlb.activate();
        assert!(vm_fault(FaultKind::Write, va, Some(&parent), &mut tlb).is_err());

        child.destroy(&m.alloc);
        parent.destroy(&m.alloc);
    }

    #[test]
    fn read_only_violation_is_fatal() {
        let m = Machine::new();
        let space = m.space();
        let mut tlb = m.tlb(8);
        let err = vm_fault(FaultKind::ReadOnly, VirtualAddress::new(TEXT), Some(&space), &mut tlb).unwrap_err();
        assert_eq!(err.class(), crate::ErrorClass::AccessViolation);
        space.destroy(&m.alloc);
    }

    #[test]
    fn missing_address_space_is_a_kernel_fault() {
        let m = Machine::new();
        let mut tlb = m.tlb(8);
        let va = VirtualAddress::new(TEXT);
        assert_eq!(vm_fault(FaultKind::Read, va, None, &mut tlb), Err(VmError::KernelFault(va)));
        assert_eq!(tlb.tlb().valid_count(), 0);
    }

    #[test]
    fn stack_faults_resolve() {
        let m = Machine::new();
        let space = m.space();
        let mut tlb = m.tlb(8);
        let va = VirtualAddress::new(USERSTACK - 4);
        let r = vm_fault(FaultKind::Write, va, Some(&space), &mut tlb).unwrap();
        assert_eq!(r.segment, SegmentId::Stack);
        assert_eq!(Some(r.frame), space.page_table(SegmentId::Stack).unwrap().frame(11));
        space.destroy(&m.alloc);
    }

    #[test]
    fn full_tlb_evicts() {
        let m = Machine::new();
        let space = m.space();
        let mut tlb = m.tlb(2);
        for va in [TEXT, TEXT + PAGE_SIZE] {
            vm_fault(FaultKind::Read, VirtualAddress::new(va), Some(&space), &mut tlb).unwrap();
        }
        let r = vm_fault(FaultKind::Read, VirtualAddress::new(DATA), Some(&space), &mut tlb).unwrap();
        assert!(matches!(r.slot, SlotChoice::Evict(_)));
        assert_eq!(tlb.tlb().valid_count(), 2);
        space.destroy(&m.alloc);
    }

    #[test]
    #[should_panic(expected = "both regions")]
    fn half_built_address_space_panics() {
        let m = Machine::new();
        let mut space = AddressSpace::new();
        space
            .define_region(VirtualAddress::new(TEXT), PAGE_SIZE, RegionFlags::READ)
            .unwrap();
        let mut tlb = m.tlb(2);
        let _ = vm_fault(FaultKind::Read, VirtualAddress::new(TEXT), Some(&space), &mut tlb);
    }
}
