//! # User Virtual Memory
//!
//! Per-process address spaces for a CPU without a hardware page-table
//! walker, and the fault handler that feeds their translations into the
//! software-managed TLB.
//!
//! ## What you get
//! - [`AddressSpace`]: up to two regions plus a fixed stack, each backed by
//!   an explicit [`PageTable`].
//! - [`Region`] and [`RegionFlags`]: page-rounded virtual ranges.
//! - [`vm_fault`]: the single fault-resolution entry point for the trap path.
//! - [`VmError`]: one error type with an [`ErrorClass`] and an errno.
//!
//! ## User Address Space Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Text (region 1)                │  read-only after load
//!             ├─────────────────────────────────┤
//!             │  Data (region 2)                │
//!             ├─────────────────────────────────┤
//!             │           ...                   │  unmapped: faults are fatal
//! STACK_BASE  ├─────────────────────────────────┤
//!             │  Stack (12 pages)               │
//! USERSTACK   ├─────────────────────────────────┤  0x8000_0000
//!             │  Kernel (direct-mapped)         │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Three structures must agree: the frame table (owned by the allocator),
//! the page tables (owned by an address space) and the TLB (owned by a
//! core). Page tables only ever hold frames the allocator handed out, and
//! the TLB is flushed whenever the running address space changes or its text
//! becomes read-only, so the TLB never holds a translation the page tables
//! do not.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod address_space;
mod error;
mod fault;
mod page_table;
mod region;

pub use crate::address_space::{AddressSpace, Location, SegmentId};
pub use crate::error::{ErrorClass, Violation, VmError, errno};
pub use crate::fault::{FaultKind, Resolution, vm_fault};
pub use crate::page_table::PageTable;
pub use crate::region::{Region, RegionFlags};
