//! # Kernel synchronization primitives
//!
//! - [`SpinLock`]: test-and-test-and-set lock used for the coremap and the
//!   boot-time steal path.
//! - [`SyncOnceCell`]: write-once cell; doubles as a one-way readiness flag.
//! - [`irq`]: interrupt control abstraction ([`InterruptControl`]) with an
//!   RAII [`IrqGuard`] and a software implementation for hosted builds.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::{InterruptControl, InterruptState, IrqGuard, SoftInterrupts};
pub use spin_lock::{IrqSpinLockGuard, SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
