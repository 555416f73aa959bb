//! Deterministic allocator workloads.
//!
//! Each scenario builds its own pool hierarchy, runs a bounded workload,
//! checks the invariants it is able to observe, and returns a
//! [`ScenarioReport`]. Workloads are seeded and reproducible.

use crate::error::HarnessError;
use crate::report::{Outcome, ScenarioReport};

use parking_lot::Mutex;
use poolkit_core::{NodeResource, PagePool, TablePool};
use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Shared knobs for the workloads.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioConfig {
    /// Workload seed.
    pub seed: u64,
    /// Operation budget per scenario (per thread for `contention`).
    pub ops: u64,
    /// Worker threads for `contention`.
    pub threads: u64,
    /// Partition size for node-resource workloads.
    pub partition_size: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            ops: 10_000,
            threads: 4,
            partition_size: 64,
        }
    }
}

impl ScenarioConfig {
    fn validate(&self) -> Result<(), HarnessError> {
        if self.ops == 0 {
            return Err(HarnessError::InvalidConfig {
                reason: "ops must be non-zero".to_owned(),
            });
        }
        if self.threads == 0 {
            return Err(HarnessError::InvalidConfig {
                reason: "threads must be non-zero".to_owned(),
            });
        }
        if self.partition_size == 0 || self.partition_size > 2048 {
            return Err(HarnessError::InvalidConfig {
                reason: format!(
                    "partition size {} outside the supported 1..=2048",
                    self.partition_size
                ),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
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
}

/// Alternating allocate/free churn on one node resource.
///
/// Holds a bounded window of live partitions, writes a fill byte into each
/// and verifies it on release; a corrupted fill or a duplicate address
/// fails the scenario.
pub fn run_churn(config: &ScenarioConfig) -> Result<ScenarioReport, HarnessError> {
    config.validate()?;
    const WINDOW: usize = 32;

    let started = Instant::now();
    let pool = Arc::new(PagePool::new(4096));
    let resource = NodeResource::with_partition_size(Arc::clone(&pool), config.partition_size);

    let mut rng = XorShift64::new(config.seed);
    let mut window: Vec<(NonNull<u8>, u8)> = Vec::new();
    let mut seen = HashSet::new();
    let mut live = HashSet::new();
    let mut notes = Vec::new();
    let mut outcome = Outcome::Pass;

    for op in 0..config.ops {
        let fill = (rng.next_u64() & 0xFF) as u8;
        if window.len() < WINDOW && rng.next_u64() % 2 == 0 {
            let Some(block) = resource.allocate(config.partition_size) else {
                outcome = Outcome::Fail;
                notes.push(format!("op {op}: allocation failed"));
                break;
            };
            let addr = block.as_ptr() as usize;
            if !live.insert(addr) {
                outcome = Outcome::Fail;
                notes.push(format!("op {op}: address {addr:#x} handed out twice"));
                break;
            }
            seen.insert(addr);
            // SAFETY: the block is valid for partition_size bytes and not
            // aliased by anything in the window.
            unsafe { block.as_ptr().write_bytes(fill, config.partition_size) };
            window.push((block, fill));
        } else if let Some((block, fill)) = window.pop() {
            let ok = (0..config.partition_size).all(|offset| {
                // SAFETY: the block is live and valid for partition_size
                // bytes.
                unsafe { block.as_ptr().add(offset).read() == fill }
            });
            if !ok {
                outcome = Outcome::Fail;
                notes.push(format!("op {op}: fill corrupted"));
                break;
            }
            live.remove(&(block.as_ptr() as usize));
            // SAFETY: the block came from this resource and left the
            // window first.
            unsafe { resource.deallocate(block) };
        }
    }

    for (block, _) in window {
        live.remove(&(block.as_ptr() as usize));
        // SAFETY: remaining blocks are live and owned by the window.
        unsafe { resource.deallocate(block) };
    }

    let stats = pool.stats();
    Ok(ScenarioReport {
        scenario: "churn".to_owned(),
        seed: config.seed,
        ops: config.ops,
        distinct_addresses: seen.len(),
        grow_events: stats.grow_events,
        blocks_total: stats.blocks_total,
        elapsed_ms: started.elapsed().as_millis() as u64,
        outcome,
        notes,
    })
}

/// Drains the pool repeatedly and checks growth accounting.
///
/// Demand is raised one block at a time; a growth event must occur exactly
/// when demand first exceeds the provisioned block count.
pub fn run_exhaustion(config: &ScenarioConfig) -> Result<ScenarioReport, HarnessError> {
    config.validate()?;

    let started = Instant::now();
    let pool = PagePool::new(4096);
    let mut held = Vec::new();
    let mut notes = Vec::new();
    let mut outcome = Outcome::Pass;
    let mut last_events = 0_u64;

    let demand = config.ops.min(4096);
    for step in 0..demand {
        let provisioned = pool.stats().blocks_total as u64;
        let Some(block) = pool.allocate() else {
            outcome = Outcome::Fail;
            notes.push(format!("step {step}: allocation failed"));
            break;
        };
        held.push(block);

        let events = pool.stats().grow_events;
        let grew = events != last_events;
        let needed = step >= provisioned;
        if grew != needed || events > last_events + 1 {
            outcome = Outcome::Fail;
            notes.push(format!(
                "step {step}: {provisioned} blocks provisioned, grow events {last_events} -> {events}"
            ));
            break;
        }
        last_events = events;
    }

    let stats = pool.stats();
    let distinct: HashSet<usize> = held.iter().map(|b| b.as_ptr() as usize).collect();
    if distinct.len() != held.len() {
        outcome = Outcome::Fail;
        notes.push("duplicate block addresses".to_owned());
    }

    for block in held {
        // SAFETY: every block came from this pool.
        unsafe { pool.deallocate(block) };
    }

    Ok(ScenarioReport {
        scenario: "exhaustion".to_owned(),
        seed: config.seed,
        ops: demand,
        distinct_addresses: distinct.len(),
        grow_events: stats.grow_events,
        blocks_total: stats.blocks_total,
        elapsed_ms: started.elapsed().as_millis() as u64,
        outcome,
        notes,
    })
}

/// Multi-thread churn on one shared node resource.
pub fn run_contention(config: &ScenarioConfig) -> Result<ScenarioReport, HarnessError> {
    config.validate()?;

    let started = Instant::now();
    let pool = Arc::new(PagePool::new(4096));
    let resource = NodeResource::with_partition_size(Arc::clone(&pool), config.partition_size);
    let live = Mutex::new(HashSet::<usize>::new());
    let failures = Mutex::new(Vec::<String>::new());
    let distinct = Mutex::new(HashSet::<usize>::new());

    thread::scope(|scope| {
        for thread_id in 0..config.threads {
            let resource = &resource;
            let live = &live;
            let failures = &failures;
            let distinct = &distinct;
            scope.spawn(move || {
                let mut rng = XorShift64::new(config.seed ^ (thread_id << 32) ^ 0x9E37_79B9);
                let mut held: Vec<NonNull<u8>> = Vec::new();
                for op in 0..config.ops {
                    if held.len() < 8 && rng.next_u64() % 2 == 0 {
                        let Some(block) = resource.allocate(config.partition_size) else {
                            failures
                                .lock()
                                .push(format!("thread {thread_id} op {op}: allocation failed"));
                            return;
                        };
                        let addr = block.as_ptr() as usize;
                        if !live.lock().insert(addr) {
                            failures.lock().push(format!(
                                "thread {thread_id} op {op}: address {addr:#x} live twice"
                            ));
                            return;
                        }
                        distinct.lock().insert(addr);
                        held.push(block);
                    } else if let Some(block) = held.pop() {
                        live.lock().remove(&(block.as_ptr() as usize));
                        // SAFETY: the block came from this resource and was
                        // removed from the live set first.
                        unsafe { resource.deallocate(block) };
                    }
                }
                for block in held {
                    live.lock().remove(&(block.as_ptr() as usize));
                    // SAFETY: as above.
                    unsafe { resource.deallocate(block) };
                }
            });
        }
    });

    let failures = failures.into_inner();
    let stats = pool.stats();
    Ok(ScenarioReport {
        scenario: "contention".to_owned(),
        seed: config.seed,
        ops: config.ops * config.threads,
        distinct_addresses: distinct.into_inner().len(),
        grow_events: stats.grow_events,
        blocks_total: stats.blocks_total,
        elapsed_ms: started.elapsed().as_millis() as u64,
        outcome: if failures.is_empty() {
            Outcome::Pass
        } else {
            Outcome::Fail
        },
        notes: failures,
    })
}

/// Sweeps request sizes across every size class and the OS fallback.
pub fn run_table_sweep(config: &ScenarioConfig) -> Result<ScenarioReport, HarnessError> {
    config.validate()?;

    let started = Instant::now();
    let pool = Arc::new(PagePool::new(16384));
    let table = TablePool::new(Arc::clone(&pool));

    let mut notes = Vec::new();
    let mut outcome = Outcome::Pass;
    let mut seen = HashSet::new();
    let mut ops = 0_u64;
    let mut last_partition = 0;

    let largest_class = poolkit_core::class_bytes(poolkit_core::NUM_SIZE_CLASSES - 1);
    for size in (8..=largest_class + 1024).step_by(8) {
        let partition = table.partition_for(size);
        if partition < size || (size <= largest_class && partition < last_partition) {
            outcome = Outcome::Fail;
            notes.push(format!("size {size}: partition {partition} regressed"));
            break;
        }
        if size <= largest_class {
            last_partition = partition;
        }

        let Some(block) = table.allocate(size) else {
            outcome = Outcome::Fail;
            notes.push(format!("size {size}: allocation failed"));
            break;
        };
        ops += 1;
        seen.insert(block.as_ptr() as usize);
        // SAFETY: the block is valid for at least `size` bytes.
        unsafe { block.as_ptr().write_bytes(0xA5, size) };
        // SAFETY: the block came from this selector with this size.
        unsafe { table.deallocate(block, size) };
        ops += 1;
    }

    let stats = pool.stats();
    Ok(ScenarioReport {
        scenario: "table-sweep".to_owned(),
        seed: config.seed,
        ops,
        distinct_addresses: seen.len(),
        grow_events: stats.grow_events,
        blocks_total: stats.blocks_total,
        elapsed_ms: started.elapsed().as_millis() as u64,
        outcome,
        notes,
    })
}

/// Runs every scenario with one shared configuration.
pub fn run_all(config: &ScenarioConfig) -> Result<Vec<ScenarioReport>, HarnessError> {
    Ok(vec![
        run_churn(config)?,
        run_exhaustion(config)?,
        run_contention(config)?,
        run_table_sweep(config)?,
    ])
}
