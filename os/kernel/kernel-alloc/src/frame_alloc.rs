//! # Physical Frame Allocator
//!
//! Two allocation paths share one entry point:
//!
//! 1. **Before bootstrap** requests are forwarded to the boot memory's
//!    "steal" bump allocator under its own lock. Stolen frames are never
//!    reclaimed; once the frame table exists they show up as
//!    [`FrameState::Reserved`].
//! 2. **After bootstrap** requests are served by a first-fit scan of the
//!    frame table, performed entirely under the frame-table lock.
//!
//! The switch between the two is the frame table's [`SyncOnceCell`]: it is
//! written exactly once by [`FrameAllocator::bootstrap`] and only read
//! afterwards.

use crate::coremap::{FrameState, FrameStats, FrameTable};
use crate::phys_memory::{BootMemory, FrameMemory};
use crate::{AllocError, FreeError};
use alloc::vec::Vec;
use core::fmt;
use core::mem::size_of;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_sync::{SpinLock, SyncOnceCell};
use log::{error, info, trace, warn};

/// A run of physically contiguous frames returned by
/// [`FrameAllocator::allocate`].
///
/// The handle is move-only: giving it back via [`FrameAllocator::release`]
/// consumes it, so a run cannot be released twice through safe code.
#[must_use = "dropping a FrameRun leaks its frames"]
#[derive(Eq, PartialEq)]
pub struct FrameRun {
    first: PhysicalFrame,
    frames: usize,
}

impl FrameRun {
    const fn new(first: PhysicalFrame, frames: usize) -> Self {
        Self { first, frames }
    }

    #[inline]
    #[must_use]
    pub const fn first(&self) -> PhysicalFrame {
        self.first
    }

    /// Number of frames in the run.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.frames
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Physical address of the first byte.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.first.base()
    }

    /// The `index`-th frame of the run.
    #[inline]
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<PhysicalFrame> {
        (index < self.frames).then(|| PhysicalFrame::from_index(self.first.index() + index))
    }

    pub fn frames(&self) -> impl Iterator<Item = PhysicalFrame> + '_ {
        (self.first.index()..self.first.index() + self.frames).map(PhysicalFrame::from_index)
    }
}

impl fmt::Debug for FrameRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameRun({}, {} frames)", self.first, self.frames)
    }
}

/// The physical frame allocator.
///
/// One value is constructed at boot and shared by reference with every
/// subsystem that needs frames.
pub struct FrameAllocator<M> {
    memory: M,
    steal_lock: SpinLock<()>,
    table: SyncOnceCell<SpinLock<FrameTable>>,
}

impl<M> FrameAllocator<M> {
    /// An allocator that serves requests from `memory`'s steal path until
    /// [`bootstrap`](Self::bootstrap) is called.
    pub const fn new(memory: M) -> Self {
        Self {
            memory,
            steal_lock: SpinLock::new(()),
            table: SyncOnceCell::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.memory
    }

    /// Whether the frame table exists. Never goes back to `false`.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.table.is_initialized()
    }

    /// Frame-table summary, or `None` before bootstrap.
    #[must_use]
    pub fn stats(&self) -> Option<FrameStats> {
        self.table.get().map(|table| table.lock().stats())
    }

    /// Copy of every frame's state, or `None` before bootstrap.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<FrameState>> {
        self.table.get().map(|table| table.lock().states().to_vec())
    }
}

impl<M: BootMemory> FrameAllocator<M> {
    /// Build the frame table.
    ///
    /// The table's own storage is stolen from boot memory first; every frame
    /// below the resulting first free address (kernel image, earlier steals,
    /// the table) is recorded as reserved. Runs once.
    ///
    /// # Errors
    /// - [`AllocError::AlreadyBootstrapped`] on a second call.
    /// - [`AllocError::OutOfMemory`] if the table does not fit into RAM.
    pub fn bootstrap(&self) -> Result<FrameStats, AllocError> {
        let _steal = self.steal_lock.lock();
        if self.is_ready() {
            return Err(AllocError::AlreadyBootstrapped);
        }

        let total = self.memory.ram_extent().total_frames();
        let metadata = (total * size_of::<FrameState>()).div_ceil(PAGE_SIZE as usize);
        self.memory
            .steal(metadata)
            .ok_or(AllocError::OutOfMemory { frames: metadata })?;

        let extent = self.memory.ram_extent();
        let table = FrameTable::new(total, extent.used_frames());
        let stats = table.stats();
        self.table
            .set(SpinLock::new(table))
            .map_err(|_| AllocError::AlreadyBootstrapped)?;

        info!(
            "coremap: {} frames of RAM up to {}, {} reserved (incl. {metadata} for the table), {} free",
            stats.total, extent.end, stats.reserved, stats.free
        );
        Ok(stats)
    }

    /// Allocate `n` physically contiguous frames.
    ///
    /// Frames are not zeroed.
    ///
    /// # Errors
    /// - [`AllocError::ZeroFrames`] if `n` is zero.
    /// - [`AllocError::OutOfMemory`] if no run of `n` free frames exists;
    ///   the frame table is left unchanged.
    pub fn allocate(&self, n: usize) -> Result<FrameRun, AllocError> {
        if n == 0 {
            return Err(AllocError::ZeroFrames);
        }

        if let Some(table) = self.table.get() {
            return Self::allocate_from(table, n);
        }

        let steal = self.steal_lock.lock();
        // Bootstrap may have completed while we waited for the lock.
        if let Some(table) = self.table.get() {
            drop(steal);
            return Self::allocate_from(table, n);
        }
        let base = self.memory.steal(n).ok_or_else(|| {
            warn!("coremap: out of boot memory stealing {n} frames");
            AllocError::OutOfMemory { frames: n }
        })?;
        trace!("coremap: stole {n} frames at {base} before bootstrap");
        Ok(FrameRun::new(PhysicalFrame::containing_address(base), n))
    }

    fn allocate_from(table: &SpinLock<FrameTable>, n: usize) -> Result<FrameRun, AllocError> {
        let head = table.lock().allocate(n).ok_or_else(|| {
            warn!("coremap: out of memory allocating {n} frames");
            AllocError::OutOfMemory { frames: n }
        })?;
        let run = FrameRun::new(PhysicalFrame::from_index(head), n);
        trace!("coremap: allocated {run:?}");
        Ok(run)
    }

    /// Give a run back.
    ///
    /// A rejected release is logged and otherwise ignored; the frame table is
    /// not modified.
    ///
    /// # Errors
    /// - [`FreeError::NotReady`] before bootstrap (stolen memory is never
    ///   returned).
    /// - [`FreeError::NotAllocationBase`] / [`FreeError::LengthMismatch`] /
    ///   [`FreeError::OutOfRange`] if `run` does not match a live allocation,
    ///   e.g. because it was stolen before bootstrap.
    pub fn release(&self, run: FrameRun) -> Result<(), FreeError> {
        let result = match self.table.get() {
            None => Err(FreeError::NotReady),
            Some(table) => table.lock().release(run.first.index(), run.frames),
        };
        match result {
            Ok(()) => trace!("coremap: released {run:?}"),
            Err(e) => error!("coremap: rejected release of {run:?}: {e}"),
        }
        result
    }

    /// Allocate `n` contiguous frames for kernel use and return their
    /// direct-mapped kernel virtual address.
    ///
    /// # Errors
    /// As [`allocate`](Self::allocate).
    pub fn alloc_kpages(&self, n: usize) -> Result<VirtualAddress, AllocError> {
        let run = self.allocate(n)?;
        Ok(run.base().to_kseg0())
    }

    /// Release the kernel pages starting at `va`, which must be an address
    /// returned by [`alloc_kpages`](Self::alloc_kpages).
    ///
    /// # Errors
    /// - [`FreeError::NotDirectMapped`] if `va` is not a direct-mapped address.
    /// - Otherwise as [`release`](Self::release); freeing a page from the
    ///   middle of a run is rejected.
    pub fn free_kpages(&self, va: VirtualAddress) -> Result<(), FreeError> {
        let result = self.free_kpages_inner(va);
        if let Err(e) = result {
            error!("coremap: rejected free_kpages({va}): {e}");
        }
        result
    }

    fn free_kpages_inner(&self, va: VirtualAddress) -> Result<(), FreeError> {
        let pa = va.kseg0_to_physical().ok_or(FreeError::NotDirectMapped(va))?;
        if !pa.is_page_aligned() {
            return Err(FreeError::NotAllocationBase(pa));
        }
        let table = self.table.get().ok_or(FreeError::NotReady)?;
        let frames = table.lock().release_head(pa.frame().index())?;
        trace!("coremap: freed {frames} kernel pages at {va}");
        Ok(())
    }
}

impl<M: BootMemory + FrameMemory> FrameAllocator<M> {
    /// Allocate one frame and fill it with zeros.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if no frame is free.
    pub fn allocate_zeroed(&self) -> Result<FrameRun, AllocError> {
        let run = self.allocate(1)?;
        self.memory.zero_frame(run.first());
        Ok(run)
    }
}
