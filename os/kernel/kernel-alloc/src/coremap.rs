//! # Coremap
//!
//! One [`FrameState`] per physical frame of installed RAM, indexed by frame
//! number. The table is sized once at bootstrap and never resized.
//!
//! A multi-frame allocation is recorded explicitly: its first frame is a
//! [`FrameState::Head`] carrying the run length, every following frame is a
//! [`FrameState::Tail`] pointing back at the head. Frames consumed before the
//! table existed (kernel image, boot-time steals, the table's own storage)
//! are [`FrameState::Reserved`] and never become free.

use crate::FreeError;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use kernel_memory_addresses::PhysicalFrame;
use log::trace;

/// Allocation state of one physical frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FrameState {
    #[default]
    Free,
    /// In use since before the frame table existed; not owned by any run.
    Reserved,
    /// First frame of a run of `frames` frames.
    Head { frames: usize },
    /// Non-first frame of the run starting at frame index `head`.
    Tail { head: usize },
}

impl FrameState {
    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Summary of the frame table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub total: usize,
    pub reserved: usize,
    pub allocated: usize,
    pub free: usize,
    /// Length of the longest run of consecutive free frames; the largest
    /// request that can currently succeed.
    pub largest_free_run: usize,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames: {} reserved, {} allocated, {} free (largest run {})",
            self.total, self.reserved, self.allocated, self.free, self.largest_free_run
        )
    }
}

/// The frame table itself. Not synchronized; the allocator wraps it in a lock.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameTable {
    frames: Vec<FrameState>,
}

impl FrameTable {
    /// A table for `total` frames whose first `reserved` frames are in use.
    #[must_use]
    pub fn new(total: usize, reserved: usize) -> Self {
        let reserved = reserved.min(total);
        let mut frames = vec![FrameState::Free; total];
        frames[..reserved].fill(FrameState::Reserved);
        Self { frames }
    }

    /// Number of frames tracked.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn state(&self, index: usize) -> Option<FrameState> {
        self.frames.get(index).copied()
    }

    #[inline]
    #[must_use]
    pub fn states(&self) -> &[FrameState] {
        &self.frames
    }

    /// First-fit search for `n` consecutive free frames.
    ///
    /// Walks frames in index order, extending a candidate run while frames
    /// are free. Hitting a used frame abandons the candidate and resumes
    /// after that frame.
    #[must_use]
    pub fn find_run(&self, n: usize) -> Option<usize> {
        if n == 0 || n > self.frames.len() {
            return None;
        }

        let mut start = 0;
        let mut run = 0;
        for (index, state) in self.frames.iter().enumerate() {
            if state.is_free() {
                if run == 0 {
                    start = index;
                }
                run += 1;
                if run == n {
                    return Some(start);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    /// Find and claim `n` consecutive free frames; returns the first index.
    ///
    /// On failure the table is left untouched.
    pub fn allocate(&mut self, n: usize) -> Option<usize> {
        let head = self.find_run(n)?;
        self.frames[head] = FrameState::Head { frames: n };
        self.frames[head + 1..head + n].fill(FrameState::Tail { head });
        trace!("coremap: claimed frames {head}..{}", head + n);
        Some(head)
    }

    /// Free the run starting at `head`, which must span exactly `frames`.
    ///
    /// # Errors
    /// See [`release_head`](Self::release_head); additionally
    /// [`FreeError::LengthMismatch`] if the recorded length differs.
    pub fn release(&mut self, head: usize, frames: usize) -> Result<(), FreeError> {
        let recorded = self.head_len(head)?;
        if recorded != frames {
            return Err(FreeError::LengthMismatch {
                base: PhysicalFrame::from_index(head).base(),
                recorded,
                requested: frames,
            });
        }
        self.clear_run(head, recorded);
        Ok(())
    }

    /// Free the run starting at `head`, whatever its length. Returns the
    /// number of frames released.
    ///
    /// # Errors
    /// - [`FreeError::OutOfRange`] if `head` is past the end of RAM.
    /// - [`FreeError::NotAllocationBase`] if `head` is free, reserved, or
    ///   the middle of a run.
    pub fn release_head(&mut self, head: usize) -> Result<usize, FreeError> {
        let frames = self.head_len(head)?;
        self.clear_run(head, frames);
        Ok(frames)
    }

    fn head_len(&self, head: usize) -> Result<usize, FreeError> {
        let base = PhysicalFrame::from_index(head).base();
        match self.frames.get(head) {
            None => Err(FreeError::OutOfRange(base)),
            Some(FrameState::Head { frames }) => Ok(*frames),
            Some(_) => Err(FreeError::NotAllocationBase(base)),
        }
    }

    fn clear_run(&mut self, head: usize, frames: usize) {
        debug_assert!(
            self.frames[head + 1..head + frames]
                .iter()
                .all(|s| *s == FrameState::Tail { head }),
            "run at frame {head} is corrupt"
        );
        self.frames[head..head + frames].fill(FrameState::Free);
        trace!("coremap: released frames {head}..{}", head + frames);
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        let mut stats = FrameStats {
            total: self.frames.len(),
            ..FrameStats::default()
        };
        let mut run = 0;
        for state in &self.frames {
            match state {
                FrameState::Free => {
                    stats.free += 1;
                    run += 1;
                    stats.largest_free_run = stats.largest_free_run.max(run);
                    continue;
                }
                FrameState::Reserved => stats.reserved += 1,
                FrameState::Head { .. } | FrameState::Tail { .. } => stats.allocated += 1,
            }
            run = 0;
        }
        stats
    }
}
