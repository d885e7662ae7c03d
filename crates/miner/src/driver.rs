//! The staking driver loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use emberd_consensus::ChainParams;
use emberd_log::{log_cat, log_error, log_info, log_warn};
use emberd_mempool::Mempool;

use crate::assembler::BlockAssembler;
use crate::chain::{ChainView, NetworkView};
use crate::options::AssemblerOptions;
use crate::sign::{sign_block, StakingWallet};
use crate::stats::MinerStats;
use crate::work::check_stake;

/// Cooperative cancellation, consulted at every wait point. Sleeps are
/// chopped into short slices so shutdown is honored promptly.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Sleep for `millis`, returning false if cancelled before or during.
    pub fn sleep_ms(&self, millis: u64) -> bool {
        let mut remaining = millis;
        while remaining > 0 {
            if self.is_cancelled() {
                return false;
            }
            let slice = remaining.min(100);
            std::thread::sleep(Duration::from_millis(slice));
            remaining -= slice;
        }
        !self.is_cancelled()
    }
}

#[derive(Clone, Debug)]
pub struct StakerConfig {
    /// Wait for peers and initial sync before staking.
    pub require_peers: bool,
    /// Sleep between failed kernel searches, in milliseconds.
    pub miner_sleep_ms: u64,
}

impl Default for StakerConfig {
    fn default() -> Self {
        Self {
            require_peers: true,
            miner_sleep_ms: 500,
        }
    }
}

/// Stake new blocks until cancelled. Builds a proof-of-stake template,
/// tries to sign it, and submits on success; the template is rebuilt from
/// scratch on every attempt. Returns (ending the thread) only on
/// cancellation or when the wallet cannot provide a coinbase script.
pub fn run_staker<C, N, W>(
    params: &ChainParams,
    options: &AssemblerOptions,
    chain: &C,
    network: &N,
    wallet: &W,
    mempool: &Mutex<Mempool>,
    stats: &MinerStats,
    cancel: &CancelToken,
    config: &StakerConfig,
) where
    C: ChainView,
    N: NetworkView,
    W: StakingWallet,
{
    let coinbase_script = match wallet.reserve_script() {
        Some(script) if !script.is_empty() => script,
        _ => {
            log_error!("staker: no coinbase script available (staking requires a wallet)");
            return;
        }
    };

    let mut last_search_time = chain.adjusted_time();

    while !cancel.is_cancelled() {
        if config.require_peers {
            // Busy-wait for the network to come online so we don't waste
            // time staking on an obsolete chain.
            loop {
                if network.peer_count() > 0 && !network.is_initial_block_download() {
                    break;
                }
                if !cancel.sleep_ms(1_000) {
                    return;
                }
            }
        }

        while !stats.staking() {
            if !cancel.sleep_ms(1_000) {
                return;
            }
        }

        while wallet.is_locked() {
            stats.set_last_coin_stake_search_interval(0);
            if !cancel.sleep_ms(1_000) {
                return;
            }
        }

        if wallet.keypool_empty() {
            log_error!(
                "staker: keypool ran out, refill the keypool before restarting the staking thread"
            );
            return;
        }

        let mut stake_reward = 0;
        let template = {
            let pool = match mempool.lock() {
                Ok(pool) => pool,
                Err(_) => {
                    log_error!("staker: mempool lock poisoned");
                    return;
                }
            };
            BlockAssembler::new(params, options, chain, &pool, stats).create_new_block(
                &coinbase_script,
                true,
                Some(&mut stake_reward),
                true,
            )
        };
        let mut template = match template {
            Ok(template) => template,
            Err(err) => {
                log_error!("staker: template build failed: {err}");
                return;
            }
        };

        if sign_block(
            chain,
            params,
            wallet,
            &mut template.block,
            stake_reward,
            &mut last_search_time,
            stats,
        ) {
            log_cat!("coinstake", "proof-of-stake block signed");
            match check_stake(chain, &template.block) {
                Ok(()) => log_info!("staker: block accepted"),
                Err(err) => log_warn!("staker: {err}"),
            }
            if !cancel.sleep_ms(500) {
                return;
            }
        } else if !cancel.sleep_ms(config.miner_sleep_ms) {
            return;
        }
    }
}
