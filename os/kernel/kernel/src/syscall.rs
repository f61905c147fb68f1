//! # Process System Calls
//!
//! The two calls that create and tear down address spaces outside of
//! program loading.

use crate::boot::Kernel;
use crate::cpu::Cpu;
use crate::proc::Process;
use kernel_vmem::VmError;
use log::{debug, info};
use std::sync::Arc;

/// Fork the process running on `cpu`.
///
/// The child receives an independent copy of the parent's address space and
/// is returned ready to run; it is not scheduled on any core.
///
/// # Errors
/// [`VmError::OutOfMemory`] if the copy cannot be backed. The parent is
/// unaffected and no frames are leaked.
///
/// # Panics
/// If `cpu` runs no process, or a process without an address space.
pub fn sys_fork(kernel: &Kernel, cpu: &mut Cpu) -> Result<Arc<Process>, VmError> {
    let Some(parent) = cpu.current().cloned() else {
        panic!("fork: cpu{} runs no process", cpu.id());
    };

    let space = {
        let guard = parent.address_space();
        let Some(space) = guard.as_ref() else {
            panic!("fork: {parent:?} has no address space");
        };
        space.duplicate(kernel.frames())?
    };

    let child = Process::new(parent.name());
    child.set_address_space(Some(space), cpu.tlb().irq());
    cpu.activate();

    info!("fork: pid {} -> pid {}", parent.pid(), child.pid());
    Ok(Arc::new(child))
}

/// Terminate the process running on `cpu` and release its address space.
///
/// The address space is detached from the process before it is destroyed,
/// so no other core can fault against it while its frames are freed.
///
/// # Panics
/// If `cpu` runs no process.
pub fn sys_exit(kernel: &Kernel, cpu: &mut Cpu, status: i32) {
    let Some(process) = cpu.current().cloned() else {
        panic!("exit: cpu{} runs no process", cpu.id());
    };

    cpu.deactivate();
    if let Some(space) = process.set_address_space(None, cpu.tlb().irq()) {
        space.destroy(kernel.frames());
    }
    cpu.switch_to(None);

    info!("exit: pid {} with status {status}", process.pid());
    debug!("exit: {}", kernel.stats());
}
