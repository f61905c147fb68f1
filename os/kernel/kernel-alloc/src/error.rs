use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Reasons a frame allocation can fail.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    #[error("cannot allocate zero frames")]
    ZeroFrames,
    #[error("out of memory: no run of {frames} contiguous free frames")]
    OutOfMemory { frames: usize },
    #[error("the frame table is already bootstrapped")]
    AlreadyBootstrapped,
}

/// Reasons a release is rejected. A rejected release leaves the frame table
/// untouched.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FreeError {
    #[error("frames cannot be released before the frame table exists")]
    NotReady,
    #[error("{0} is not the base of a live allocation")]
    NotAllocationBase(PhysicalAddress),
    #[error("allocation at {base} spans {recorded} frames, release asked for {requested}")]
    LengthMismatch {
        base: PhysicalAddress,
        recorded: usize,
        requested: usize,
    },
    #[error("{0} is outside installed RAM")]
    OutOfRange(PhysicalAddress),
    #[error("{0} is not a direct-mapped kernel address")]
    NotDirectMapped(VirtualAddress),
}
