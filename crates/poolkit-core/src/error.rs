//! Typed errors for the checked allocator entry points.
//!
//! The hot path reports failure as a null return only; these errors exist
//! for the `try_` variants, which tests and debugging builds use to
//! distinguish genuine exhaustion from caller-contract violations.

use thiserror::Error;

/// Failure modes of the checked allocate/deallocate variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The operating system refused to supply more page-aligned memory.
    #[error("operating system allocator is out of memory")]
    OutOfMemory,

    /// A request exceeded the partition size this resource was frozen at.
    #[error("requested {requested} bytes from a resource with {partition}-byte partitions")]
    PartitionOverflow {
        /// Bytes the caller asked for.
        requested: usize,
        /// Frozen partition size of the resource.
        partition: usize,
    },

    /// A deallocation size that cannot map back to any size class.
    #[error("{size} bytes does not derive a valid size class")]
    UnknownSizeClass {
        /// The size the caller supplied.
        size: usize,
    },

    /// The process-wide table pool was used before installation.
    #[error("table pool used before TablePool::install")]
    NotInstalled,

    /// A second process-wide table pool installation was attempted.
    #[error("table pool is already installed")]
    AlreadyInstalled,
}
