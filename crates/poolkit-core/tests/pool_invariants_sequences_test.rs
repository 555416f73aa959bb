//! Deterministic allocate/free sequences holding the core invariants.
//!
//! Invariant pressure, not a fuzz campaign: bounded xorshift-driven
//! sequences checking no-aliasing, round-trip reuse, and content integrity
//! of live partitions across interleaved frees.

use poolkit_core::{NodeResource, PagePool};
use std::ptr::NonNull;
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

struct Slot {
    block: NonNull<u8>,
    fill: u8,
}

#[test]
fn deterministic_sequences_hold_no_aliasing_and_content_integrity() {
    const SEEDS: [u64; 4] = [1, 2, 3, 4];
    const STEPS: usize = 2_000;
    const SLOTS: usize = 32;
    const PARTITION: usize = 48;

    for seed in SEEDS {
        let pool = Arc::new(PagePool::new(4096));
        let resource = NodeResource::with_partition_size(Arc::clone(&pool), PARTITION);
        let mut rng = XorShift64::new(seed);
        let mut slots: Vec<Option<Slot>> = (0..SLOTS).map(|_| None).collect();
        let mut next_fill = 0_u8;

        for step in 0..STEPS {
            let idx = rng.gen_range_usize(0, SLOTS - 1);
            match slots[idx].take() {
                None => {
                    let block = resource
                        .allocate(PARTITION)
                        .expect("pool grows on demand, OS permitting");
                    let addr = block.as_ptr() as usize;
                    for (other_idx, other) in slots.iter().enumerate() {
                        if let Some(slot) = other {
                            assert_ne!(
                                slot.block.as_ptr() as usize,
                                addr,
                                "seed={seed} step={step}: slot {other_idx} aliases a fresh allocation"
                            );
                        }
                    }

                    next_fill = next_fill.wrapping_add(1);
                    // SAFETY: block is valid for PARTITION bytes and not
                    // aliased by any live slot.
                    unsafe { block.as_ptr().write_bytes(next_fill, PARTITION) };
                    slots[idx] = Some(Slot {
                        block,
                        fill: next_fill,
                    });
                }
                Some(slot) => {
                    // Every byte must still carry the fill written at
                    // allocation time; corruption means aliasing.
                    for offset in 0..PARTITION {
                        // SAFETY: the slot's block is live and valid for
                        // PARTITION bytes.
                        let byte = unsafe { slot.block.as_ptr().add(offset).read() };
                        assert_eq!(
                            byte, slot.fill,
                            "seed={seed} step={step}: byte {offset} corrupted"
                        );
                    }
                    // SAFETY: the block came from this resource and the
                    // slot is cleared before the free.
                    unsafe { resource.deallocate(slot.block) };
                }
            }
        }

        for slot in slots.into_iter().flatten() {
            // SAFETY: remaining blocks are live and unaliased.
            unsafe { resource.deallocate(slot.block) };
        }
    }
}

#[test]
fn growth_events_track_exhaustion_exactly() {
    // Mirror the pool's clamp policy step by step: a growth event must
    // happen exactly when demand first exceeds the blocks provisioned.
    const MIN_CHUNK: usize = 2;
    const MAX_CHUNK: usize = 8;

    let pool = PagePool::with_growth_bounds(4096, MIN_CHUNK, MAX_CHUNK);
    let mut provisioned = 0_usize;
    let mut expected_events = 0_u64;
    let mut held = Vec::new();

    for demand in 1..=40 {
        if demand > provisioned {
            provisioned += provisioned.clamp(MIN_CHUNK, MAX_CHUNK);
            expected_events += 1;
        }
        held.push(pool.allocate().expect("pool grows on demand"));
        let stats = pool.stats();
        assert_eq!(
            stats.grow_events, expected_events,
            "after {demand} allocations"
        );
        assert_eq!(stats.blocks_total, provisioned, "after {demand} allocations");
    }

    for block in held {
        // SAFETY: blocks came from this pool.
        unsafe { pool.deallocate(block) };
    }
}

#[test]
fn round_trip_returns_usable_memory() {
    let pool = Arc::new(PagePool::new(4096));
    let resource = NodeResource::new(pool);

    let first = resource.allocate(128).expect("allocation");
    // SAFETY: block is valid for 128 bytes.
    unsafe { first.as_ptr().write_bytes(0xAB, 128) };
    // SAFETY: block came from this resource.
    unsafe { resource.deallocate(first) };

    let second = resource.allocate(128).expect("reuse");
    // SAFETY: block is valid for 128 bytes; its previous contents are
    // unspecified, so only write.
    unsafe { second.as_ptr().write_bytes(0xCD, 128) };
    // SAFETY: block came from this resource.
    unsafe { resource.deallocate(second) };
}
