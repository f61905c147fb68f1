//! # Per-Core Context
//!
//! Each simulated core owns its TLB and interrupt state and knows which
//! process it is running. User memory accesses go through [`Cpu::load`] and
//! [`Cpu::store`], which behave like the MMU: translate through the TLB and
//! trap into the fault handler on a miss.

use crate::boot::Kernel;
use crate::proc::Process;
use crate::trap;
use kernel_alloc::FrameMemory;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_sync::SoftInterrupts;
use kernel_tlb::{Access, LocalTlb, SoftTlb};
use kernel_vmem::{Violation, VmError};
use log::trace;
use std::sync::Arc;

pub type CoreTlb = LocalTlb<SoftTlb, SoftInterrupts>;

pub struct Cpu {
    id: usize,
    tlb: CoreTlb,
    current: Option<Arc<Process>>,
}

impl Cpu {
    #[must_use]
    pub fn new(id: usize, tlb_seed: u64) -> Self {
        Self {
            id,
            tlb: LocalTlb::new(SoftTlb::new(tlb_seed), SoftInterrupts::new()),
            current: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// The process running on this core.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> Option<&Arc<Process>> {
        self.current.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn tlb(&self) -> &CoreTlb {
        &self.tlb
    }

    #[inline]
    pub const fn tlb_mut(&mut self) -> &mut CoreTlb {
        &mut self.tlb
    }

    /// Split borrow of the running process and the TLB, for the fault path.
    pub(crate) fn parts(&mut self) -> (Option<&Arc<Process>>, &mut CoreTlb) {
        (self.current.as_ref(), &mut self.tlb)
    }

    /// Switch to `next` (or to no process).
    pub fn switch_to(&mut self, next: Option<Arc<Process>>) {
        self.deactivate();
        self.current = next;
        self.activate();
        trace!(
            "cpu{}: running {:?}",
            self.id,
            self.current.as_ref().map(|p| p.pid())
        );
    }

    /// Make the running process's address space the one the TLB serves.
    ///
    /// Kernel-only contexts have no address space; nothing is flushed then.
    pub fn activate(&mut self) {
        if self.current.as_ref().is_some_and(|p| p.has_address_space()) {
            self.tlb.activate();
        }
    }

    pub const fn deactivate(&self) {
        self.tlb.deactivate();
    }

    /// Read user memory at `va` as the running process would.
    ///
    /// # Errors
    /// The [`VmError`] of a fault that could not be resolved.
    pub fn load(&mut self, kernel: &Kernel, va: VirtualAddress, buf: &mut [u8]) -> Result<(), VmError> {
        let len = buf.len();
        self.for_each_page(va, len, Access::Load, |pa, range| {
            kernel.frames().memory().read(pa, &mut buf[range]);
        })
    }

    /// Write user memory at `va` as the running process would.
    ///
    /// # Errors
    /// The [`VmError`] of a fault that could not be resolved, e.g. a store to
    /// text after loading.
    pub fn store(&mut self, kernel: &Kernel, va: VirtualAddress, bytes: &[u8]) -> Result<(), VmError> {
        self.for_each_page(va, bytes.len(), Access::Store, |pa, range| {
            kernel.frames().memory().write(pa, &bytes[range]);
        })
    }

    fn for_each_page(
        &mut self,
        va: VirtualAddress,
        len: usize,
        access: Access,
        mut f: impl FnMut(PhysicalAddress, core::ops::Range<usize>),
    ) -> Result<(), VmError> {
        let mut done = 0;
        while done < len {
            let Some(at) = u32::try_from(done).ok().and_then(|d| va.checked_add(d)) else {
                return Err(VmError::AccessViolation {
                    address: va,
                    violation: Violation::Unmapped,
                });
            };
            let pa = self.translate(at, access)?;
            let chunk = ((PAGE_SIZE - at.offset()) as usize).min(len - done);
            f(pa, done..done + chunk);
            done += chunk;
        }
        Ok(())
    }

    /// Translate through the TLB, trapping into the fault handler once on a
    /// miss.
    fn translate(&mut self, va: VirtualAddress, access: Access) -> Result<PhysicalAddress, VmError> {
        match self.tlb.translate(va, access) {
            Ok(pa) => return Ok(pa),
            Err(exception) => {
                trap::tlb_exception(self, exception)?;
            }
        }
        match self.tlb.translate(va, access) {
            Ok(pa) => Ok(pa),
            Err(exception) => panic!("cpu{}: {exception:?} right after resolving the fault", self.id),
        }
    }
}
