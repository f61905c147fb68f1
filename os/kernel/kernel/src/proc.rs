//! # Processes
//!
//! Only what the virtual memory subsystem needs from a process: an id, a
//! name, and the slot holding its current address space.

use kernel_sync::{InterruptControl, SpinLock, SpinLockGuard};
use kernel_vmem::AddressSpace;
use std::sync::atomic::{AtomicU32, Ordering};

pub type Pid = u32;

pub struct Process {
    pid: Pid,
    name: String,
    space: SpinLock<Option<AddressSpace>>,
}

impl Process {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        static NEXT_PID: AtomicU32 = AtomicU32::new(1);
        Self {
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            space: SpinLock::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lock and borrow the address space slot.
    pub fn address_space(&self) -> SpinLockGuard<'_, Option<AddressSpace>> {
        self.space.lock()
    }

    /// Replace the address space, returning the previous one. The slot is
    /// swapped with local interrupts disabled through `irq`.
    ///
    /// Setting `None` detaches the address space: from then on nobody can
    /// activate it or fault against it, so it can be destroyed safely.
    pub fn set_address_space<C>(&self, space: Option<AddressSpace>, irq: &C) -> Option<AddressSpace>
    where
        C: InterruptControl + ?Sized,
    {
        core::mem::replace(&mut *self.space.lock_irq(irq), space)
    }

    #[must_use]
    pub fn has_address_space(&self) -> bool {
        self.space.lock().is_some()
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
