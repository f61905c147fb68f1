use core::fmt;
use kernel_alloc::AllocError;
use kernel_info::memory::MAX_REGIONS;
use kernel_memory_addresses::VirtualAddress;

/// Kernel error numbers surfaced to user space.
pub mod errno {
    pub const EUNIMP: i32 = 2;
    pub const ENOMEM: i32 = 3;
    pub const EFAULT: i32 = 6;
    pub const EINVAL: i32 = 8;
}

/// How a [`VmError`] is to be treated by the caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Resources ran out; recoverable, the caller decides.
    OutOfMemory,
    /// The request itself was malformed or unsupported.
    InvalidArgument,
    /// Fatal to the faulting context, never retried.
    AccessViolation,
    /// A broken kernel invariant; unrecoverable.
    ProgrammingError,
}

/// Why an access was refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Violation {
    /// The address lies outside every region and the stack.
    Unmapped,
    /// A store to a page that is read-only.
    ReadOnly,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unmapped => "not mapped",
            Self::ReadOnly => "page is read-only",
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error(transparent)]
    OutOfMemory(#[from] AllocError),
    #[error("unsupported fault kind {0}")]
    UnsupportedFault(u32),
    #[error("too many regions: at most {MAX_REGIONS} are supported")]
    TooManyRegions,
    #[error("invalid region {base} with size {size:#x}")]
    InvalidRegion { base: VirtualAddress, size: u32 },
    #[error("access violation at {address}: {violation}")]
    AccessViolation {
        address: VirtualAddress,
        violation: Violation,
    },
    #[error("fault at {0} without an address space")]
    KernelFault(VirtualAddress),
}

impl VmError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::OutOfMemory(_) => ErrorClass::OutOfMemory,
            Self::UnsupportedFault(_) | Self::TooManyRegions | Self::InvalidRegion { .. } => {
                ErrorClass::InvalidArgument
            }
            Self::AccessViolation { .. } => ErrorClass::AccessViolation,
            Self::KernelFault(_) => ErrorClass::ProgrammingError,
        }
    }

    /// The error number reported to user space.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::OutOfMemory(_) => errno::ENOMEM,
            Self::UnsupportedFault(_) | Self::InvalidRegion { .. } => errno::EINVAL,
            Self::TooManyRegions => errno::EUNIMP,
            Self::AccessViolation { .. } | Self::KernelFault(_) => errno::EFAULT,
        }
    }

    #[inline]
    pub(crate) const fn unmapped(address: VirtualAddress) -> Self {
        Self::AccessViolation {
            address,
            violation: Violation::Unmapped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy() {
        let va = VirtualAddress::new(0x1000);
        let oom = VmError::from(AllocError::OutOfMemory { frames: 1 });
        assert_eq!((oom.class(), oom.errno()), (ErrorClass::OutOfMemory, errno::ENOMEM));
        assert_eq!(VmError::TooManyRegions.class(), ErrorClass::InvalidArgument);
        assert_eq!(VmError::TooManyRegions.errno(), errno::EUNIMP);
        assert_eq!(VmError::UnsupportedFault(7).errno(), errno::EINVAL);
        assert_eq!(VmError::unmapped(va).class(), ErrorClass::AccessViolation);
        assert_eq!(VmError::KernelFault(va).class(), ErrorClass::ProgrammingError);
        assert_eq!(VmError::KernelFault(va).errno(), errno::EFAULT);
    }
}
