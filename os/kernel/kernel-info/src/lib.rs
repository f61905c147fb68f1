//! # Kernel Memory Layout and Boot Interface
//!
//! This crate is the single source of truth for the constants that shape the
//! virtual-memory subsystem and for the record the boot path hands to the
//! frame allocator.
//!
//! ## Architecture
//!
//! ### Memory Layout ([`memory`])
//! * **Page geometry**: page size and page-frame mask, re-exported from
//!   `kernel-memory-addresses`
//! * **User address space**: top of user space and the fixed stack window
//! * **TLB geometry**: number of hardware TLB slots
//!
//! ### Boot Information ([`boot`])
//! * **RAM extent**: first free and last physical address as reported by the
//!   firmware/boot code ([`RamExtent`](boot::RamExtent))
//!
//! ## Virtual Address Space Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  invalid (null page region)     │
//!             ├─────────────────────────────────┤
//!             │  region 1 (text)                │
//!             │  region 2 (data + bss)          │
//!             │             ...                 │
//! STACK_BASE  ├─────────────────────────────────┤ USERSTACK - STACK_PAGES * PAGE_SIZE
//!             │  user stack (STACK_PAGES pages) │
//! USERSTACK   ├─────────────────────────────────┤ 0x8000_0000
//!             │  kseg0: direct-mapped physical  │
//!             │  memory (kernel only)           │
//! KSEG1_BASE  ├─────────────────────────────────┤ 0xa000_0000
//!             │  kseg1 / kseg2 (kernel only)    │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Compile-Time Constants
//!
//! All layout constants are `const` values with compile-time assertions that
//! reject inconsistent configurations (e.g. a stack that does not fit below
//! the kernel segment).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
