//! Page-aligned chunk pool serving fixed-size blocks.
//!
//! The pool is the only component that talks to the operating system
//! allocator. It obtains large page-aligned chunks, slices them into blocks
//! of one fixed size, and serves them through a [`FreeListStore`]. Chunks
//! are recorded in an append-only registry and returned to the OS only at
//! teardown, so block addresses stay valid for the pool's whole lifetime.

use crate::free_list::FreeListStore;

use parking_lot::Mutex;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Fewest blocks a growth step may add.
pub const DEFAULT_MIN_CHUNK_BLOCKS: usize = 2;

/// Most blocks a growth step may add.
pub const DEFAULT_MAX_CHUNK_BLOCKS: usize = 1024;

/// Platform page size, discovered once.
pub fn os_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no memory-safety preconditions.
        let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if raw > 0 { raw as usize } else { 4096 }
    })
}

/// One chunk obtained from the OS, kept for teardown.
struct ChunkRecord {
    base: usize,
    layout: Layout,
}

/// Counter snapshot of a pool's lifetime activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Fixed size of every block this pool serves.
    pub block_size: usize,
    /// Total blocks ever added across all chunks.
    pub blocks_total: usize,
    /// Number of chunks obtained from the OS.
    pub chunks_allocated: usize,
    /// Number of growth events (equals `chunks_allocated` unless the OS
    /// refused a chunk).
    pub grow_events: u64,
    /// Allocations served straight off the free list.
    pub alloc_fastpath: u64,
    /// Allocations that had to grow the pool first.
    pub alloc_slowpath: u64,
    /// Blocks pushed back by callers.
    pub deallocations: u64,
}

/// Fixed-block pool backed by page-aligned OS chunks.
///
/// Shared across threads by reference ([`Arc`](std::sync::Arc) in
/// practice); all operations take `&self`.
///
/// Dropping the pool returns every chunk to the OS. Callers must have
/// returned or abandoned every outstanding block by then; the pool does not
/// track individual live allocations.
pub struct PagePool {
    store: FreeListStore,
    block_size: usize,
    min_chunk_blocks: usize,
    max_chunk_blocks: usize,
    /// Append-only; consulted again only at teardown.
    chunks: Mutex<Vec<ChunkRecord>>,
    blocks_total: AtomicUsize,
    grow_events: AtomicU64,
    alloc_fastpath: AtomicU64,
    alloc_slowpath: AtomicU64,
    deallocations: AtomicU64,
}

impl PagePool {
    /// Creates a pool with the default growth bounds.
    ///
    /// `block_size` must be a non-zero multiple of the platform page size.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self::with_growth_bounds(block_size, DEFAULT_MIN_CHUNK_BLOCKS, DEFAULT_MAX_CHUNK_BLOCKS)
    }

    /// Creates a pool whose growth steps are clamped to
    /// `[min_chunk_blocks, max_chunk_blocks]` blocks per chunk.
    #[must_use]
    pub fn with_growth_bounds(
        block_size: usize,
        min_chunk_blocks: usize,
        max_chunk_blocks: usize,
    ) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        assert_eq!(
            block_size % os_page_size(),
            0,
            "block size must be a multiple of the platform page size"
        );
        assert!(
            min_chunk_blocks >= 2,
            "a chunk must carry at least two blocks"
        );
        assert!(max_chunk_blocks >= min_chunk_blocks);

        Self {
            store: FreeListStore::new(),
            block_size,
            min_chunk_blocks,
            max_chunk_blocks,
            chunks: Mutex::new(Vec::new()),
            blocks_total: AtomicUsize::new(0),
            grow_events: AtomicU64::new(0),
            alloc_fastpath: AtomicU64::new(0),
            alloc_slowpath: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
        }
    }

    /// Fixed size of every block this pool serves.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Pops one block, growing the pool by a fresh chunk if none is free.
    ///
    /// Returns `None` only if the OS refuses to supply another chunk.
    pub fn allocate(&self) -> Option<NonNull<u8>> {
        let mut grew = false;
        let block = self.store.allocate(|| {
            grew = true;
            self.grow()
        });
        if block.is_some() {
            let counter = if grew {
                &self.alloc_slowpath
            } else {
                &self.alloc_fastpath
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        block
    }

    /// Pushes a block back onto the free list.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`allocate`](Self::allocate) on
    /// this exact pool and must not be used after this call. No ownership
    /// validation is performed.
    pub unsafe fn deallocate(&self, block: NonNull<u8>) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        // SAFETY: forwarded caller contract.
        unsafe { self.store.deallocate(block) };
    }

    /// Snapshot of the pool's counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            block_size: self.block_size,
            blocks_total: self.blocks_total.load(Ordering::Relaxed),
            chunks_allocated: self.chunks.lock().len(),
            grow_events: self.grow_events.load(Ordering::Relaxed),
            alloc_fastpath: self.alloc_fastpath.load(Ordering::Relaxed),
            alloc_slowpath: self.alloc_slowpath.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
        }
    }

    /// Obtains one chunk from the OS and registers its blocks.
    ///
    /// Chunk size adapts to the pool's history: the warmer the pool, the
    /// larger the step, clamped to the configured bounds.
    fn grow(&self) -> bool {
        let total = self.blocks_total.load(Ordering::Relaxed);
        let blocks = total.clamp(self.min_chunk_blocks, self.max_chunk_blocks);
        let Some(chunk_bytes) = blocks.checked_mul(self.block_size) else {
            return false;
        };
        let Ok(layout) = Layout::from_size_align(chunk_bytes, os_page_size()) else {
            return false;
        };

        // SAFETY: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc(layout) };
        let Some(base) = NonNull::new(raw) else {
            return false;
        };

        self.chunks.lock().push(ChunkRecord {
            base: base.as_ptr() as usize,
            layout,
        });
        // SAFETY: the chunk is freshly obtained, exclusively ours, page
        // aligned, and lives until Drop; chunk_bytes is an exact multiple
        // of block_size with blocks >= 2.
        unsafe { self.store.add_chunk(base, chunk_bytes, self.block_size) };

        self.blocks_total.fetch_add(blocks, Ordering::Relaxed);
        self.grow_events.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl Drop for PagePool {
    fn drop(&mut self) {
        for chunk in self.chunks.get_mut().drain(..) {
            // SAFETY: `base` was returned by std::alloc::alloc with exactly
            // this layout and is freed once, here.
            unsafe { std::alloc::dealloc(chunk.base as *mut u8, chunk.layout) };
        }
    }
}
