//! Lock-free store of equally sized memory partitions.
//!
//! Free partitions form an intrusive singly linked list: the leading bytes
//! of each free partition are overlaid with a single `next` pointer, so the
//! list costs no memory beyond the partitions themselves. The list head is
//! one atomic word; pop and push are compare-and-swap retry loops, and the
//! only lock in the component guards the "list is empty, grow it" slow path.
//!
//! The head word packs the node address into the low 48 bits and a
//! modification tag into the high 16. Every successful CAS advances the
//! tag, so a thread holding a stale head snapshot cannot complete a pop
//! against a list that was popped and re-pushed behind its back.

use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Overlay written into the leading bytes of every free partition.
#[repr(C)]
struct FreeNode {
    next: *mut FreeNode,
}

const TAG_SHIFT: u32 = 48;
const ADDR_MASK: u64 = (1 << TAG_SHIFT) - 1;

fn pack(node: *mut FreeNode, tag: u16) -> u64 {
    (node as u64 & ADDR_MASK) | (u64::from(tag) << TAG_SHIFT)
}

fn unpack(word: u64) -> (*mut FreeNode, u16) {
    ((word & ADDR_MASK) as *mut FreeNode, (word >> TAG_SHIFT) as u16)
}

/// Lock-free free list of fixed-size partitions carved out of caller
/// supplied chunks.
///
/// The store does not own any memory: chunks registered through
/// [`add_chunk`](Self::add_chunk) must stay valid for the store's lifetime,
/// which is why [`PagePool`](crate::PagePool) keeps every chunk it ever
/// obtained until teardown.
pub struct FreeListStore {
    /// Packed (address, tag) head word. Null address = momentarily empty.
    head: AtomicU64,
    /// Serializes the "discover empty, then grow" transition. Never held
    /// across pop/push.
    grow_lock: Mutex<()>,
}

impl FreeListStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: AtomicU64::new(0),
            grow_lock: Mutex::new(()),
        }
    }

    /// Pops one free partition, invoking `grow` once if the list runs dry.
    ///
    /// `grow` is expected to register fresh capacity via
    /// [`add_chunk`](Self::add_chunk) and report whether it did; a `false`
    /// return surfaces as `None`. Only one thread at a time runs `grow`;
    /// contenders wait on the growth lock, then re-poll the list before
    /// deciding to grow again.
    pub fn allocate<F>(&self, mut grow: F) -> Option<NonNull<u8>>
    where
        F: FnMut() -> bool,
    {
        loop {
            if let Some(block) = self.pop() {
                return Some(block);
            }
            let _guard = self.grow_lock.lock();
            // A contender may have grown the store while this thread waited.
            if let Some(block) = self.pop() {
                return Some(block);
            }
            if !grow() {
                return None;
            }
        }
    }

    /// Pushes a partition back onto the free list.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`allocate`](Self::allocate) on
    /// this exact store and must not be used again until re-allocated. No
    /// ownership validation is performed.
    pub unsafe fn deallocate(&self, block: NonNull<u8>) {
        let node = block.cast::<FreeNode>().as_ptr();
        loop {
            let observed = self.head.load(Ordering::Relaxed);
            let (head, tag) = unpack(observed);
            // SAFETY: the caller owns `block`; it is at least pointer-sized
            // and pointer-aligned because it was carved by `add_chunk`.
            unsafe { (*node).next = head };
            let desired = pack(node, tag.wrapping_add(1));
            if self
                .head
                .compare_exchange_weak(observed, desired, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Splices `chunk_size / partition_size` partitions carved from `base`
    /// onto the front of the free list.
    ///
    /// Safe to race against concurrent [`deallocate`](Self::deallocate)
    /// calls; callers racing `add_chunk` against itself must serialize,
    /// which [`allocate`](Self::allocate) does via the growth lock.
    ///
    /// # Safety
    ///
    /// `base` must point to `chunk_size` writable bytes, pointer-aligned,
    /// not referenced by anything else, and valid for the store's lifetime.
    /// `chunk_size` must be an exact multiple of `partition_size` covering
    /// at least two partitions, and `partition_size` must be a non-zero
    /// multiple of the pointer width.
    pub unsafe fn add_chunk(&self, base: NonNull<u8>, chunk_size: usize, partition_size: usize) {
        debug_assert!(partition_size >= size_of::<FreeNode>());
        debug_assert_eq!(partition_size % align_of::<FreeNode>(), 0);
        debug_assert_eq!(chunk_size % partition_size, 0);
        debug_assert!(chunk_size / partition_size >= 2);

        let count = chunk_size / partition_size;
        let base_ptr = base.as_ptr();

        // Thread a local chain through the partitions, lowest address first.
        let mut chain: *mut FreeNode = std::ptr::null_mut();
        for idx in (0..count).rev() {
            // SAFETY: idx * partition_size stays within the chunk, and the
            // chunk is exclusively ours until the final splice below.
            let node = unsafe { base_ptr.add(idx * partition_size) }.cast::<FreeNode>();
            unsafe { (*node).next = chain };
            chain = node;
        }
        let first = chain;
        // SAFETY: count >= 1, so the last partition is in bounds.
        let last = unsafe { base_ptr.add((count - 1) * partition_size) }.cast::<FreeNode>();

        loop {
            let observed = self.head.load(Ordering::Relaxed);
            let (head, tag) = unpack(observed);
            // SAFETY: `last` is still exclusively ours; it becomes shared
            // only once the CAS publishes the chain.
            unsafe { (*last).next = head };
            let desired = pack(first, tag.wrapping_add(1));
            if self
                .head
                .compare_exchange_weak(observed, desired, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Lock-free fast-path pop.
    fn pop(&self) -> Option<NonNull<u8>> {
        loop {
            let observed = self.head.load(Ordering::Acquire);
            let (node, tag) = unpack(observed);
            let node = NonNull::new(node)?;
            // SAFETY: nodes reachable from the head live in chunk memory
            // that is never released while the store exists. The CAS below
            // only succeeds if no pop/push/splice intervened since the
            // load, so `next` cannot belong to a re-pushed head.
            let next = unsafe { (*node.as_ptr()).next };
            let desired = pack(next, tag.wrapping_add(1));
            if self
                .head
                .compare_exchange_weak(observed, desired, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(node.cast());
            }
        }
    }
}

impl Default for FreeListStore {
    fn default() -> Self {
        Self::new()
    }
}
