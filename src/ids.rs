//! Transaction id generation

use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::OsRng;
use rand::Rng;

use crate::transaction::TxId;

/// Ids stay below 2^53 so JSON consumers that read numbers as doubles keep
/// them exact.
const MAX_SAFE_ID: u64 = 1u64 << 53;

/// Source of fresh transaction ids
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> TxId;
}

/// Random ids from the OS random number generator
#[derive(Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    pub fn new() -> Self {
        RandomIdGenerator
    }
}

impl IdGenerator for RandomIdGenerator {
    fn new_id(&self) -> TxId {
        OsRng.gen_range(1..MAX_SAFE_ID)
    }
}

/// Monotonic ids for deterministic setups and tests
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: TxId) -> Self {
        SequentialIdGenerator {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn new_id(&self) -> TxId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
