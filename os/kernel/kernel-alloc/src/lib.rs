//! # Physical Memory Allocation
//!
//! The physical side of the virtual memory subsystem: the coremap that tracks
//! every frame of installed RAM and the allocator built on top of it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              FrameAllocator                         │
//! │    • boot-time steal path (before bootstrap)        │
//! │    • first-fit contiguous runs (after bootstrap)    │
//! │    • kernel pages in the direct-mapped segment      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │  one SpinLock around the whole table
//! ┌─────────────────▼───────────────────────────────────┐
//! │              FrameTable (coremap)                   │
//! │    • one FrameState per frame                       │
//! │    • Free / Reserved / Head{frames} / Tail{head}    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        BootMemory + FrameMemory                     │
//! │    • RAM extent, steal N frames                     │
//! │    • zero / copy / read / write frames              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. The kernel constructs one [`FrameAllocator`] around its physical memory.
//! 2. Early allocations are stolen from boot memory and are never returned.
//! 3. [`FrameAllocator::bootstrap`] builds the frame table once; everything
//!    consumed so far is marked reserved.
//! 4. From then on [`FrameAllocator::allocate`] and
//!    [`FrameAllocator::release`] go through the frame table.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{FrameAllocator, SimulatedRam};
//!
//! let alloc = FrameAllocator::new(SimulatedRam::new(1 << 20, 0x4000));
//! alloc.bootstrap().unwrap();
//!
//! let run = alloc.allocate(4).unwrap();
//! assert_eq!(run.len(), 4);
//! alloc.release(run).unwrap();
//! ```
//!
//! ## Concurrency
//!
//! Allocation and release hold the frame-table lock for the complete scan or
//! update, so concurrent callers are serialized and two live runs never
//! overlap. The boot steal path has a separate lock.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod coremap;
mod error;
mod frame_alloc;
pub mod phys_memory;

pub use crate::coremap::{FrameState, FrameStats};
pub use crate::error::{AllocError, FreeError};
pub use crate::frame_alloc::{FrameAllocator, FrameRun};
pub use crate::phys_memory::{BootMemory, FrameMemory, SimulatedRam};
