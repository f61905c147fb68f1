//! # Program Loading
//!
//! Builds a fresh address space from an in-memory program image and installs
//! it into the process running on a core. The image format is deliberately
//! minimal: a list of segments with their load address, size in memory, and
//! initial contents.

use crate::boot::Kernel;
use crate::cpu::Cpu;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{AddressSpace, RegionFlags, VmError};
use log::{debug, info, warn};

/// One loadable segment of a program image.
#[derive(Copy, Clone, Debug)]
pub struct Segment<'a> {
    pub vaddr: VirtualAddress,
    /// Size in memory; anything past `bytes` is zero-filled.
    pub mem_size: u32,
    pub bytes: &'a [u8],
    pub flags: RegionFlags,
}

#[derive(Copy, Clone, Debug)]
pub struct Image<'a> {
    pub entry: VirtualAddress,
    /// Text first, then data.
    pub segments: &'a [Segment<'a>],
}

/// Where execution of a loaded program begins.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub pc: VirtualAddress,
    pub sp: VirtualAddress,
}

/// Load `image` into the process running on `cpu`, replacing (and
/// destroying) its previous address space.
///
/// # Errors
/// - [`VmError::InvalidRegion`] if a segment carries more bytes than its
///   size in memory, or is otherwise rejected by the address space.
/// - [`VmError::TooManyRegions`] for more than two segments.
/// - [`VmError::OutOfMemory`] if the segments cannot be backed.
///
/// On error the new address space is destroyed and the process keeps its
/// previous one.
///
/// # Panics
/// If `cpu` runs no process.
pub fn load_image(kernel: &Kernel, cpu: &mut Cpu, image: &Image<'_>) -> Result<Entry, VmError> {
    let Some(process) = cpu.current().cloned() else {
        panic!("exec: cpu{} runs no process", cpu.id());
    };

    let mut space = AddressSpace::new();
    if let Err(e) = populate(kernel, &mut space, image) {
        warn!("exec: loading pid {} failed: {e}", process.pid());
        space.destroy(kernel.frames());
        return Err(e);
    }

    space.complete_load(cpu.tlb_mut());
    let sp = space.define_stack();

    cpu.deactivate();
    if let Some(old) = process.set_address_space(Some(space), cpu.tlb().irq()) {
        old.destroy(kernel.frames());
    }
    cpu.activate();

    info!("exec: pid {} entry {} stack {sp}", process.pid(), image.entry);
    Ok(Entry { pc: image.entry, sp })
}

fn populate(kernel: &Kernel, space: &mut AddressSpace, image: &Image<'_>) -> Result<(), VmError> {
    for segment in image.segments {
        if segment.bytes.len() > segment.mem_size as usize {
            return Err(VmError::InvalidRegion {
                base: segment.vaddr,
                size: segment.mem_size,
            });
        }
        let id = space.define_region(segment.vaddr, segment.mem_size, segment.flags)?;
        if let Some(region) = space.region(id) {
            debug!("exec: {id:?} at {} ({} pages, {:?})", region.base(), region.pages(), region.flags());
        }
    }

    space.prepare_load(kernel.frames())?;

    for segment in image.segments {
        space.copy_out(kernel.frames().memory(), segment.vaddr, segment.bytes)?;
        debug!("exec: {} bytes at {}", segment.bytes.len(), segment.vaddr);
    }
    Ok(())
}
