//! Layered fixed-size pool allocation.
//!
//! The allocator is built from small components, each usable on its own:
//! - [`PagePool`]: page-aligned chunks from the OS, sliced into fixed blocks
//! - [`FreeListStore`]: lock-free free list of equally sized partitions
//! - [`NodeResource`]: one store bound to one pool and one partition size
//! - [`TablePool`]: size-classed selector over a bank of node resources
//! - [`PoolAllocator`]: copyable container-facing allocator handle
//!
//! Allocation requests flow downward (adapter -> node resource / table pool
//! -> store -> page pool -> OS) and deallocation pushes the partition back
//! onto the matching free list. Out-of-memory surfaces as `None` at every
//! layer; caller-contract violations are debug assertions, with `try_`
//! variants returning [`PoolError`] for callers that want a typed check.

#![cfg_attr(feature = "unstable", feature(allocator_api))]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod adapter;
pub mod error;
pub mod free_list;
pub mod node_resource;
pub mod page_pool;
pub mod size_class;
pub mod table_pool;

pub use adapter::PoolAllocator;
pub use error::PoolError;
pub use free_list::FreeListStore;
pub use node_resource::NodeResource;
pub use page_pool::{PagePool, PoolStats};
pub use size_class::{NUM_SIZE_CLASSES, WORD_BYTES, class_bytes, class_index};
pub use table_pool::{InstallGuard, TablePool};
