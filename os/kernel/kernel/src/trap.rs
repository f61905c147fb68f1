//! # Trap Path
//!
//! Entry points from the (simulated) exception vector into the virtual
//! memory subsystem.

use crate::cpu::Cpu;
use kernel_memory_addresses::VirtualAddress;
use kernel_tlb::TlbException;
use kernel_vmem::{ErrorClass, FaultKind, Resolution, VmError, vm_fault};
use log::{debug, warn};

/// Handle a TLB exception raised by the MMU on `cpu`.
///
/// # Errors
/// See [`tlb_fault`].
pub fn tlb_exception(cpu: &mut Cpu, exception: TlbException) -> Result<Resolution, VmError> {
    tlb_fault(cpu, FaultKind::from(exception) as u32, exception.address())
}

/// Resolve a TLB fault given as a raw fault code and faulting address.
///
/// # Errors
/// - [`VmError::UnsupportedFault`] for an unknown fault code.
/// - [`VmError::AccessViolation`]; the faulting process must be terminated.
///
/// # Panics
/// If there is no process or no address space to resolve against. Such a
/// fault comes from the kernel itself and would otherwise fault forever.
pub fn tlb_fault(cpu: &mut Cpu, code: u32, address: VirtualAddress) -> Result<Resolution, VmError> {
    let kind = FaultKind::try_from(code)?;
    let cpu_id = cpu.id();
    let (current, tlb) = cpu.parts();

    let result = match current {
        None => vm_fault(kind, address, None, tlb),
        Some(process) => {
            let space = process.address_space();
            vm_fault(kind, address, space.as_ref(), tlb)
        }
    };

    match &result {
        Ok(r) => debug!("cpu{cpu_id}: resolved {kind:?} fault at {address} via {:?}", r.segment),
        Err(e) if e.class() == ErrorClass::ProgrammingError => {
            panic!("cpu{cpu_id}: kernel fault: {e}");
        }
        Err(e) => warn!("cpu{cpu_id}: unresolved {kind:?} fault at {address}: {e}"),
    }
    result
}
