//! Container-facing allocator handle.
//!
//! A [`PoolAllocator<T>`] is a cheap, copyable object a container embeds:
//! allocations of the tagged element type `T` go one-at-a-time to the bound
//! [`NodeResource`], while every other allocation (the container's internal
//! bookkeeping tables) goes to the process-wide [`TablePool`].
//! Two adapters compare equal exactly when they reference the same node
//! resource, which is the test containers use to decide whether storage
//! from one allocator instance may be freed through another.

use crate::node_resource::NodeResource;
use crate::table_pool::TablePool;

use std::any::TypeId;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

/// Allocator handle tagged with the container's element type `T`.
pub struct PoolAllocator<T: 'static> {
    node: Arc<NodeResource>,
    _element: PhantomData<fn() -> T>,
}

impl<T: 'static> PoolAllocator<T> {
    /// Creates an adapter forwarding element allocations to `node`.
    #[must_use]
    pub fn new(node: Arc<NodeResource>) -> Self {
        Self {
            node,
            _element: PhantomData,
        }
    }

    /// The node resource serving element allocations.
    #[must_use]
    pub fn node(&self) -> &Arc<NodeResource> {
        &self.node
    }

    /// Allocates `count` values of `U`.
    ///
    /// When `U` is the tagged element type the request goes to the node
    /// resource (`count` must be 1, per the node-allocator contract; debug
    /// asserted); otherwise it is a table allocation and goes to the
    /// process-wide [`TablePool`], which must be installed by then.
    ///
    /// Returns `None` only on OS exhaustion.
    pub fn allocate_for<U: 'static>(&self, count: usize) -> Option<NonNull<u8>> {
        if TypeId::of::<U>() == TypeId::of::<T>() {
            debug_assert_eq!(count, 1, "element allocations are one at a time");
            self.node.allocate(size_of::<U>())
        } else {
            TablePool::global().allocate(count.checked_mul(size_of::<U>())?)
        }
    }

    /// Returns storage obtained from [`allocate_for`](Self::allocate_for).
    ///
    /// # Safety
    ///
    /// `block` must have come from `allocate_for::<U>` with the same
    /// `count` on an adapter equal to this one, and must not be used after
    /// this call.
    pub unsafe fn deallocate_for<U: 'static>(&self, block: NonNull<u8>, count: usize) {
        if TypeId::of::<U>() == TypeId::of::<T>() {
            debug_assert_eq!(count, 1, "element allocations are one at a time");
            // SAFETY: equal adapters share the node resource the block
            // came from.
            unsafe { self.node.deallocate(block) };
        } else {
            // SAFETY: table allocations all share the one global selector;
            // the size re-derives the route taken at allocation time.
            unsafe { TablePool::global().deallocate(block, count * size_of::<U>()) };
        }
    }
}

impl<T: 'static> Clone for PoolAllocator<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _element: PhantomData,
        }
    }
}

/// Equal iff both adapters reference the same node resource. Table
/// allocations are always exchangeable because they share the global
/// selector.
impl<T: 'static> PartialEq for PoolAllocator<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl<T: 'static> Eq for PoolAllocator<T> {}

impl<T: 'static> std::fmt::Debug for PoolAllocator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("node", &Arc::as_ptr(&self.node))
            .field("partition", &self.node.partition_size())
            .finish()
    }
}

#[cfg(feature = "unstable")]
mod allocator_api {
    //! Conformance with the standard allocator trait (nightly).

    use super::PoolAllocator;
    use crate::size_class::WORD_BYTES;
    use crate::table_pool::TablePool;
    use std::alloc::{AllocError, Allocator, Layout};
    use std::ptr::NonNull;

    // Element layouts route to the node resource, everything else to the
    // global table pool. Alignments above the word size are refused;
    // partitions only guarantee word alignment.
    unsafe impl<T: 'static> Allocator for PoolAllocator<T> {
        fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
            if layout.align() > WORD_BYTES {
                return Err(AllocError);
            }
            let block = if layout == Layout::new::<T>() {
                self.node.allocate(layout.size())
            } else {
                TablePool::global().allocate(layout.size())
            }
            .ok_or(AllocError)?;
            Ok(NonNull::slice_from_raw_parts(block, layout.size()))
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            if layout == Layout::new::<T>() {
                // SAFETY: forwarded caller contract.
                unsafe { self.node.deallocate(ptr) };
            } else {
                // SAFETY: forwarded caller contract.
                unsafe { TablePool::global().deallocate(ptr, layout.size()) };
            }
        }
    }
}
