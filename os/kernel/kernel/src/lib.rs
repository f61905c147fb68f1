//! # Kernel
//!
//! The simulated machine that drives the virtual memory subsystem: boot
//! configuration, one context per core, processes, the trap path, and the
//! system calls that create and destroy address spaces.
//!
//! ```text
//!  BootConfig ──► Kernel::boot ──► FrameAllocator<SimulatedRam>
//!                      │
//!          ┌───────────┴───────────┐
//!        Cpu 0                   Cpu 1          (LocalTlb each)
//!          │ load/store            │
//!          ▼ TLB miss              ▼
//!     trap::tlb_fault ──► vm_fault(current process's AddressSpace)
//! ```

#![deny(unsafe_code)]

pub mod boot;
pub mod config;
pub mod cpu;
pub mod exec;
pub mod logger;
pub mod proc;
pub mod syscall;
pub mod trap;

pub use crate::boot::{BootError, Kernel};
pub use crate::config::{BootConfig, ConfigError};
pub use crate::cpu::Cpu;
pub use crate::proc::{Pid, Process};
