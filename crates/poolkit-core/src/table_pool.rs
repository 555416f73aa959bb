//! Size-classed selector over a bank of node resources.
//!
//! One [`NodeResource`] per size class, all drawing from the same page
//! pool. A request is routed to the smallest class that holds it; requests
//! past the largest class go straight to the OS allocator, and deallocation
//! re-derives the same route from the caller-supplied size (the size is not
//! stored per allocation).

use crate::error::PoolError;
use crate::node_resource::NodeResource;
use crate::page_pool::PagePool;
use crate::size_class::{NUM_SIZE_CLASSES, WORD_BYTES, class_bytes, class_index};

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

/// Process-wide instance, installed at most once.
static GLOBAL: OnceLock<TablePool> = OnceLock::new();

/// Token proving [`TablePool::install`] ran before any global use.
///
/// Constructed only by `install`; holding it at the call site makes the
/// construct-before-use ordering explicit.
#[derive(Debug)]
pub struct InstallGuard {
    _private: (),
}

/// Word-aligned layout for the OS fallback path.
fn os_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.max(1), WORD_BYTES).ok()
}

fn os_allocate(size: usize) -> Option<NonNull<u8>> {
    let layout = os_layout(size)?;
    // SAFETY: layout has non-zero size.
    NonNull::new(unsafe { std::alloc::alloc(layout) })
}

/// # Safety
///
/// `ptr` must come from `os_allocate` with the same `size`.
unsafe fn os_deallocate(ptr: NonNull<u8>, size: usize) {
    let layout = os_layout(size).expect("layout was valid at allocation time");
    // SAFETY: forwarded caller contract; the layout derivation matches
    // os_allocate exactly.
    unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
}

/// Selector routing each request to the smallest class that holds it.
pub struct TablePool {
    classes: [NodeResource; NUM_SIZE_CLASSES],
}

impl TablePool {
    /// Creates a selector backed by `pool`.
    ///
    /// The pool's block size must hold at least two partitions of the
    /// largest class (debug-asserted).
    #[must_use]
    pub fn new(pool: Arc<PagePool>) -> Self {
        debug_assert!(
            pool.block_size() >= 2 * class_bytes(NUM_SIZE_CLASSES - 1),
            "pool blocks of {} bytes cannot hold two partitions of the largest class",
            pool.block_size()
        );
        let classes = std::array::from_fn(|index| {
            NodeResource::with_partition_size(Arc::clone(&pool), class_bytes(index))
        });
        Self { classes }
    }

    /// Installs the process-wide instance.
    ///
    /// Must run after the backing pool exists and before any container
    /// performs its first table allocation. A second call reports
    /// [`PoolError::AlreadyInstalled`] and leaves the first instance in
    /// place.
    pub fn install(pool: Arc<PagePool>) -> Result<InstallGuard, PoolError> {
        let mut fresh = false;
        GLOBAL.get_or_init(|| {
            fresh = true;
            Self::new(pool)
        });
        if fresh {
            Ok(InstallGuard { _private: () })
        } else {
            Err(PoolError::AlreadyInstalled)
        }
    }

    /// The process-wide instance.
    ///
    /// # Panics
    ///
    /// Panics if [`install`](Self::install) has not run; use before
    /// installation is a caller bug, checked in every build.
    #[must_use]
    pub fn global() -> &'static TablePool {
        Self::try_global().expect("table pool used before TablePool::install")
    }

    /// The process-wide instance, or `None` before installation.
    #[must_use]
    pub fn try_global() -> Option<&'static TablePool> {
        GLOBAL.get()
    }

    /// Checked [`global`](Self::global): reports a missing installation as
    /// [`PoolError::NotInstalled`] instead of panicking.
    pub fn checked_global() -> Result<&'static TablePool, PoolError> {
        Self::try_global().ok_or(PoolError::NotInstalled)
    }

    /// Allocates at least `size` bytes from the matching class, or from
    /// the OS when the request exceeds the largest class.
    ///
    /// Returns `None` only on OS exhaustion.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let index = class_index(size);
        if index >= NUM_SIZE_CLASSES {
            return os_allocate(size);
        }
        self.classes[index].allocate(size)
    }

    /// Checked [`allocate`](Self::allocate).
    pub fn try_allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate(size).ok_or(PoolError::OutOfMemory)
    }

    /// Returns `block` to the class derived from `size`.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by this selector's `allocate` with
    /// the same `size`, and must not be used after this call. A mismatched
    /// size routes the block to the wrong free list.
    pub unsafe fn deallocate(&self, block: NonNull<u8>, size: usize) {
        let index = class_index(size);
        if index >= NUM_SIZE_CLASSES {
            // SAFETY: same-route contract; the block came from os_allocate.
            unsafe { os_deallocate(block, size) };
            return;
        }
        // SAFETY: same-route contract; the block came from this class.
        unsafe { self.classes[index].deallocate(block) };
    }

    /// Checked [`deallocate`](Self::deallocate): rejects sizes that cannot
    /// derive a class instead of asserting.
    ///
    /// # Safety
    ///
    /// Same as [`deallocate`](Self::deallocate); the check covers the size
    /// derivation, not block ownership.
    pub unsafe fn try_deallocate(&self, block: NonNull<u8>, size: usize) -> Result<(), PoolError> {
        if size == 0 {
            return Err(PoolError::UnknownSizeClass { size });
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.deallocate(block, size) };
        Ok(())
    }

    /// Partition size serving `size`-byte requests (OS path => the request
    /// itself).
    #[must_use]
    pub fn partition_for(&self, size: usize) -> usize {
        let index = class_index(size);
        if index >= NUM_SIZE_CLASSES {
            size
        } else {
            class_bytes(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_pool() -> TablePool {
        TablePool::new(Arc::new(PagePool::new(16384)))
    }

    #[test]
    fn request_of_twelve_words_lands_on_the_18_word_class() {
        let pool = table_pool();
        let size = 12 * WORD_BYTES; // 96 bytes on 64-bit
        let block = pool.allocate(size).expect("allocation");

        assert_eq!(pool.partition_for(size), 18 * WORD_BYTES);
        assert_eq!(class_index(size), class_index(18 * WORD_BYTES));

        // SAFETY: block came from this selector with this size.
        unsafe { pool.deallocate(block, size) };
    }

    #[test]
    fn partitions_grow_monotonically_with_requests() {
        let pool = table_pool();
        let mut last = 0;
        for words in 1..=450 {
            let partition = pool.partition_for(words * WORD_BYTES);
            assert!(partition >= words * WORD_BYTES);
            assert!(partition >= last);
            last = partition;
        }
    }

    #[test]
    fn oversized_requests_round_trip_through_the_os() {
        let pool = table_pool();
        let size = 1 << 16;
        assert_eq!(class_index(size), NUM_SIZE_CLASSES);

        let block = pool.allocate(size).expect("os allocation");
        // SAFETY: block is valid for `size` bytes.
        unsafe { block.as_ptr().write_bytes(0x5A, size) };
        // SAFETY: block came from the OS path with this size.
        unsafe { pool.deallocate(block, size) };
    }

    #[test]
    fn classes_reuse_freed_partitions() {
        let pool = table_pool();
        let size = 26 * WORD_BYTES;
        let first = pool.allocate(size).expect("allocation");
        // SAFETY: block came from this selector with this size.
        unsafe { pool.deallocate(first, size) };
        let second = pool.allocate(size).expect("reuse");
        assert_eq!(first, second);
        // SAFETY: as above.
        unsafe { pool.deallocate(second, size) };
    }

    #[test]
    fn zero_byte_deallocate_is_a_typed_error() {
        let pool = table_pool();
        let block = pool.allocate(8).expect("allocation");
        // SAFETY: size 0 never reaches a free list.
        let err = unsafe { pool.try_deallocate(block, 0) };
        assert_eq!(err, Err(PoolError::UnknownSizeClass { size: 0 }));
        // SAFETY: block came from this selector with size 8.
        unsafe { pool.deallocate(block, 8) };
    }
}
