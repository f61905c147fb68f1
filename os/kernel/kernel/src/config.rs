//! # Boot Configuration
//!
//! Run-time parameters of the simulated machine. Every value has a default
//! and can be overridden from the environment:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `KERNEL_RAM_KIB` | installed RAM | 4096 |
//! | `KERNEL_IMAGE_KIB` | RAM already used by the kernel image | 512 |
//! | `KERNEL_CORES` | number of cores, each with its own TLB | 2 |
//! | `KERNEL_TLB_SEED` | seed for random TLB eviction | 0 |
//! | `KERNEL_LOG` | `off`, `error`, `warn`, `info`, `debug`, `trace` | `info` |

use core::str::FromStr;
use kernel_memory_addresses::PAGE_SIZE;
use log::LevelFilter;

pub const ENV_RAM_KIB: &str = "KERNEL_RAM_KIB";
pub const ENV_IMAGE_KIB: &str = "KERNEL_IMAGE_KIB";
pub const ENV_CORES: &str = "KERNEL_CORES";
pub const ENV_TLB_SEED: &str = "KERNEL_TLB_SEED";
pub const ENV_LOG: &str = "KERNEL_LOG";

/// Largest RAM the 32-bit direct-mapped segment can reach (512 MiB).
const MAX_RAM_KIB: u32 = 512 * 1024;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Parse { var: &'static str, value: String },
    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BootConfig {
    /// Installed RAM in bytes.
    pub ram_bytes: u32,
    /// Bytes at the bottom of RAM occupied by the kernel image.
    pub kernel_image_bytes: u32,
    pub cores: usize,
    pub tlb_seed: u64,
    pub log_level: LevelFilter,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            ram_bytes: 4 * 1024 * 1024,
            kernel_image_bytes: 512 * 1024,
            cores: 2,
            tlb_seed: 0,
            log_level: LevelFilter::Info,
        }
    }
}

impl BootConfig {
    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    /// A [`ConfigError`] naming the first variable that is malformed or out
    /// of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// # Errors
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(kib) = parse::<u32>(&lookup, ENV_RAM_KIB)? {
            if kib == 0 || kib > MAX_RAM_KIB {
                return Err(ConfigError::OutOfRange {
                    var: ENV_RAM_KIB,
                    reason: "must be between 1 KiB and 512 MiB",
                });
            }
            config.ram_bytes = kib * 1024;
        }
        if let Some(kib) = parse::<u32>(&lookup, ENV_IMAGE_KIB)? {
            config.kernel_image_bytes = kib.checked_mul(1024).ok_or(ConfigError::OutOfRange {
                var: ENV_IMAGE_KIB,
                reason: "too large",
            })?;
        }
        if let Some(cores) = parse::<usize>(&lookup, ENV_CORES)? {
            config.cores = cores;
        }
        if let Some(seed) = parse::<u64>(&lookup, ENV_TLB_SEED)? {
            config.tlb_seed = seed;
        }
        if let Some(level) = parse::<LevelFilter>(&lookup, ENV_LOG)? {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the values against each other.
    ///
    /// # Errors
    /// [`ConfigError::OutOfRange`] if the configuration cannot boot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ram_bytes < 2 * PAGE_SIZE {
            return Err(ConfigError::OutOfRange {
                var: ENV_RAM_KIB,
                reason: "need at least two pages of RAM",
            });
        }
        if self.kernel_image_bytes >= self.ram_bytes {
            return Err(ConfigError::OutOfRange {
                var: ENV_IMAGE_KIB,
                reason: "kernel image does not fit into RAM",
            });
        }
        if self.cores == 0 {
            return Err(ConfigError::OutOfRange {
                var: ENV_CORES,
                reason: "need at least one core",
            });
        }
        Ok(())
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Parse { var, value })
}
