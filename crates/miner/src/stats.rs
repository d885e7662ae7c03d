//! Process-wide mining observability.
//!
//! Published after each template build and read by status displays without
//! any lock; all accesses are relaxed since the values are advisory.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct MinerStats {
    last_block_tx: AtomicU64,
    last_block_size: AtomicU64,
    last_block_weight: AtomicU64,
    last_coin_stake_search_interval: AtomicI64,
    staking: AtomicBool,
}

impl MinerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_block(&self, txs: u64, size: u64, weight: u64) {
        self.last_block_tx.store(txs, Ordering::Relaxed);
        self.last_block_size.store(size, Ordering::Relaxed);
        self.last_block_weight.store(weight, Ordering::Relaxed);
    }

    pub fn last_block_tx(&self) -> u64 {
        self.last_block_tx.load(Ordering::Relaxed)
    }

    pub fn last_block_size(&self) -> u64 {
        self.last_block_size.load(Ordering::Relaxed)
    }

    pub fn last_block_weight(&self) -> u64 {
        self.last_block_weight.load(Ordering::Relaxed)
    }

    pub fn set_last_coin_stake_search_interval(&self, interval: i64) {
        self.last_coin_stake_search_interval
            .store(interval, Ordering::Relaxed);
    }

    pub fn last_coin_stake_search_interval(&self) -> i64 {
        self.last_coin_stake_search_interval.load(Ordering::Relaxed)
    }

    pub fn set_staking(&self, staking: bool) {
        self.staking.store(staking, Ordering::Relaxed);
    }

    pub fn staking(&self) -> bool {
        self.staking.load(Ordering::Relaxed)
    }
}
