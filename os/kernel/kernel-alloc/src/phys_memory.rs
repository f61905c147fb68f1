//! # Physical Memory Access
//!
//! The allocator never touches RAM by itself; it goes through two traits the
//! surrounding kernel (or a test) supplies:
//!
//! - [`BootMemory`]: the boot-time RAM extent query and the raw "steal N
//!   frames" bump allocator that works before the frame table exists.
//! - [`FrameMemory`]: byte access to physical frames, as the kernel would do
//!   through the direct-mapped segment (`KSEG0_BASE + pa`).
//!
//! [`SimulatedRam`] implements both on top of a plain byte buffer so the
//! whole virtual memory subsystem can run hosted.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_info::boot::RamExtent;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalFrame, align_down, align_up};
use kernel_sync::SpinLock;
use log::trace;

/// Boot-time view of physical memory.
pub trait BootMemory {
    /// Installed RAM and the first address not yet consumed.
    fn ram_extent(&self) -> RamExtent;

    /// Permanently take `frames` page-aligned frames off the top of the
    /// consumed prefix. `None` if RAM is exhausted.
    ///
    /// Stolen memory is never given back.
    fn steal(&self, frames: usize) -> Option<PhysicalAddress>;
}

/// Byte-level access to physical frames.
///
/// Addresses must lie inside installed RAM; anything else is a kernel bug
/// and panics.
pub trait FrameMemory {
    /// Fill `frame` with zero bytes.
    fn zero_frame(&self, frame: PhysicalFrame);

    /// Copy the contents of frame `src` into frame `dst`.
    fn copy_frame(&self, dst: PhysicalFrame, src: PhysicalFrame);

    /// Read `buf.len()` bytes starting at `pa`.
    fn read(&self, pa: PhysicalAddress, buf: &mut [u8]);

    /// Write `bytes` starting at `pa`.
    fn write(&self, pa: PhysicalAddress, bytes: &[u8]);
}

impl<M: BootMemory + ?Sized> BootMemory for &M {
    fn ram_extent(&self) -> RamExtent {
        (**self).ram_extent()
    }

    fn steal(&self, frames: usize) -> Option<PhysicalAddress> {
        (**self).steal(frames)
    }
}

impl<M: FrameMemory + ?Sized> FrameMemory for &M {
    fn zero_frame(&self, frame: PhysicalFrame) {
        (**self).zero_frame(frame);
    }

    fn copy_frame(&self, dst: PhysicalFrame, src: PhysicalFrame) {
        (**self).copy_frame(dst, src);
    }

    fn read(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        (**self).read(pa, buf);
    }

    fn write(&self, pa: PhysicalAddress, bytes: &[u8]) {
        (**self).write(pa, bytes);
    }
}

/// Installed RAM simulated by a byte buffer.
///
/// The buffer starts at physical address 0. The first `kernel_image` bytes
/// count as already consumed by the kernel image.
pub struct SimulatedRam {
    bytes: SpinLock<Vec<u8>>,
    first_free: AtomicU32,
    end: u32,
}

impl SimulatedRam {
    /// RAM of `size` bytes (rounded down to whole frames) with the first
    /// `kernel_image` bytes already in use.
    ///
    /// # Panics
    /// If the kernel image does not fit into RAM.
    #[must_use]
    pub fn new(size: u32, kernel_image: u32) -> Self {
        let end = align_down(size);
        assert!(kernel_image <= end, "kernel image larger than RAM");
        Self {
            bytes: SpinLock::new(vec![0; end as usize]),
            first_free: AtomicU32::new(kernel_image),
            end,
        }
    }

    /// Installed RAM in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.end
    }

    fn range(&self, pa: PhysicalAddress, len: usize) -> core::ops::Range<usize> {
        let start = pa.as_u32() as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.end as usize);
        match end {
            Some(end) => start..end,
            None => panic!("physical access {pa}+{len:#x} outside RAM"),
        }
    }
}

impl BootMemory for SimulatedRam {
    fn ram_extent(&self) -> RamExtent {
        RamExtent {
            first_free: PhysicalAddress::new(self.first_free.load(Ordering::Acquire)),
            end: PhysicalAddress::new(self.end),
        }
    }

    fn steal(&self, frames: usize) -> Option<PhysicalAddress> {
        let size = u32::try_from(frames).ok()?.checked_mul(PAGE_SIZE)?;
        let end = self.end;
        let prev = self
            .first_free
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |first| {
                align_up(first)?.checked_add(size).filter(|&next| next <= end)
            })
            .ok()?;
        let base = align_up(prev)?;
        trace!("ram: stole {frames} frames at {base:#010x}");
        Some(PhysicalAddress::new(base))
    }
}

impl FrameMemory for SimulatedRam {
    fn zero_frame(&self, frame: PhysicalFrame) {
        let range = self.range(frame.base(), PAGE_SIZE as usize);
        self.bytes.lock()[range].fill(0);
    }

    fn copy_frame(&self, dst: PhysicalFrame, src: PhysicalFrame) {
        let src = self.range(src.base(), PAGE_SIZE as usize);
        let dst = self.range(dst.base(), PAGE_SIZE as usize);
        self.bytes.lock().copy_within(src, dst.start);
    }

    fn read(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        let range = self.range(pa, buf.len());
        buf.copy_from_slice(&self.bytes.lock()[range]);
    }

    fn write(&self, pa: PhysicalAddress, bytes: &[u8]) {
        let range = self.range(pa, bytes.len());
        self.bytes.lock()[range].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steal_is_page_aligned_and_bounded() {
        let ram = SimulatedRam::new(8 * PAGE_SIZE, 0x1800);
        assert_eq!(ram.steal(2), Some(PhysicalAddress::new(0x2000)));
        assert_eq!(ram.ram_extent().first_free, PhysicalAddress::new(0x4000));
        assert_eq!(ram.steal(5), None);
        assert_eq!(ram.steal(4), Some(PhysicalAddress::new(0x4000)));
        assert_eq!(ram.steal(1), None);
        assert_eq!(ram.ram_extent().used_frames(), 8);
    }

    #[test]
    fn frame_access() {
        let ram = SimulatedRam::new(4 * PAGE_SIZE, 0);
        let a = PhysicalFrame::from_index(1);
        let b = PhysicalFrame::from_index(3);
        ram.write(a.join(0x10), b"hello");
        ram.copy_frame(b, a);

        let mut buf = [0u8; 5];
        ram.read(b.join(0x10), &mut buf);
        assert_eq!(&buf, b"hello");

        ram.zero_frame(a);
        ram.read(a.join(0x10), &mut buf);
        assert_eq!(buf, [0; 5]);
    }

    #[test]
    #[should_panic(expected = "outside RAM")]
    fn access_past_end_panics() {
        let ram = SimulatedRam::new(2 * PAGE_SIZE, 0);
        ram.write(PhysicalAddress::new(2 * PAGE_SIZE - 2), b"abc");
    }
}
