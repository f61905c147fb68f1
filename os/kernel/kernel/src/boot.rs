//! # Kernel Context
//!
//! The machine-wide state constructed once at boot and shared by reference
//! with every core: the configuration and the frame allocator.

use crate::config::{BootConfig, ConfigError};
use crate::cpu::Cpu;
use kernel_alloc::{AllocError, FrameAllocator, FrameStats, SimulatedRam};
use log::info;

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot bootstrap the frame table: {0}")]
    Alloc(#[from] AllocError),
}

pub struct Kernel {
    config: BootConfig,
    frames: FrameAllocator<SimulatedRam>,
}

impl Kernel {
    /// Bring up RAM and the frame allocator.
    ///
    /// # Errors
    /// [`BootError`] if the configuration is inconsistent or the frame
    /// table does not fit into RAM.
    pub fn boot(config: BootConfig) -> Result<Self, BootError> {
        config.validate()?;
        let ram = SimulatedRam::new(config.ram_bytes, config.kernel_image_bytes);
        let frames = FrameAllocator::new(ram);
        let stats = frames.bootstrap()?;
        info!(
            "boot: {} KiB RAM, {} cores, {stats}",
            config.ram_bytes / 1024,
            config.cores
        );
        Ok(Self { config, frames })
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &BootConfig {
        &self.config
    }

    /// The machine's frame allocator.
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> &FrameAllocator<SimulatedRam> {
        &self.frames
    }

    /// Frame-table summary.
    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.frames.stats().unwrap_or_default()
    }

    /// The per-core context of core `id`, with an empty TLB.
    ///
    /// # Panics
    /// If `id` is not a configured core.
    #[must_use]
    pub fn cpu(&self, id: usize) -> Cpu {
        assert!(id < self.config.cores, "no core {id}");
        Cpu::new(id, self.config.tlb_seed.wrapping_add(id as u64))
    }
}
