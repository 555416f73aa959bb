//! Single-size allocator bound to one page pool.
//!
//! A node resource carves the pool's blocks into partitions of one fixed
//! size and serves them through its own free list. The partition size is
//! either supplied up front or inferred from the very first allocation and
//! frozen, which lets node-based containers allocate through a resource
//! without computing their node size at the call site.

use crate::error::PoolError;
use crate::free_list::FreeListStore;
use crate::page_pool::PagePool;

use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

/// Rounds a request up to the pointer width the free-node overlay needs.
fn padded_partition(requested: usize) -> usize {
    requested
        .max(size_of::<*mut u8>())
        .next_multiple_of(align_of::<*mut u8>())
}

/// Fixed-size allocator drawing blocks from one [`PagePool`].
///
/// Shared across threads by reference; the resource holds its pool alive
/// through the [`Arc`], so it can never outlive it.
pub struct NodeResource {
    store: FreeListStore,
    pool: Arc<PagePool>,
    /// Frozen after the first allocation (or at construction).
    partition: OnceLock<usize>,
}

impl NodeResource {
    /// Creates a resource whose partition size is inferred from the first
    /// `allocate` call and then frozen.
    #[must_use]
    pub fn new(pool: Arc<PagePool>) -> Self {
        Self {
            store: FreeListStore::new(),
            pool,
            partition: OnceLock::new(),
        }
    }

    /// Creates a resource with the partition size fixed up front.
    #[must_use]
    pub fn with_partition_size(pool: Arc<PagePool>, partition_size: usize) -> Self {
        let resource = Self::new(pool);
        let frozen = resource.freeze(partition_size);
        debug_assert_eq!(frozen, padded_partition(partition_size));
        resource
    }

    /// The frozen partition size, or `None` before the first allocation.
    #[must_use]
    pub fn partition_size(&self) -> Option<usize> {
        self.partition.get().copied()
    }

    /// The pool this resource draws blocks from.
    #[must_use]
    pub fn pool(&self) -> &Arc<PagePool> {
        &self.pool
    }

    /// Pops one partition of at least `requested_size` bytes.
    ///
    /// The first call freezes the partition size; later calls must request
    /// no more than that (debug-asserted). Returns `None` only if the OS
    /// refuses to supply more memory.
    pub fn allocate(&self, requested_size: usize) -> Option<NonNull<u8>> {
        let partition = self.freeze(requested_size);
        debug_assert!(
            requested_size <= partition,
            "requested {requested_size} bytes from a resource frozen at {partition}"
        );
        self.store.allocate(|| self.pull_block(partition))
    }

    /// Checked [`allocate`](Self::allocate): reports an oversized request
    /// as [`PoolError::PartitionOverflow`] instead of asserting.
    pub fn try_allocate(&self, requested_size: usize) -> Result<NonNull<u8>, PoolError> {
        let partition = self.freeze(requested_size);
        if requested_size > partition {
            return Err(PoolError::PartitionOverflow {
                requested: requested_size,
                partition,
            });
        }
        self.store
            .allocate(|| self.pull_block(partition))
            .ok_or(PoolError::OutOfMemory)
    }

    /// Pushes a partition back onto this resource's free list.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by this resource's `allocate` and
    /// must not be used after this call.
    pub unsafe fn deallocate(&self, block: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.store.deallocate(block) };
    }

    /// Freezes and returns the partition size.
    fn freeze(&self, requested_size: usize) -> usize {
        let partition = *self.partition.get_or_init(|| padded_partition(requested_size));
        debug_assert!(
            partition * 2 <= self.pool.block_size(),
            "partition of {partition} bytes needs a pool block of at least {}",
            partition * 2
        );
        partition
    }

    /// Growth hook: pulls one pool block and registers it as a chunk,
    /// trimmed to the largest exact multiple of the partition size.
    fn pull_block(&self, partition: usize) -> bool {
        let Some(block) = self.pool.allocate() else {
            return false;
        };
        let usable = (self.pool.block_size() / partition) * partition;
        // SAFETY: the block is page-aligned, exclusively ours, and owned by
        // the pool until teardown; `usable` is an exact multiple of
        // `partition` with at least two partitions (enforced in `freeze`).
        unsafe { self.store.add_chunk(block, usable, partition) };
        true
    }
}
