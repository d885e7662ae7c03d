//! Block template assembly.
//!
//! Transactions are picked in two phases. An optional priority phase fills
//! a byte-budgeted prefix with the highest coin-age-priority transactions
//! regardless of fee. The main phase then walks the mempool in decreasing
//! ancestor feerate, committing each candidate together with its whole
//! unconfirmed ancestor set. Because committing ancestors makes the
//! mempool's cached package feerates stale, a shadow set of "modified"
//! entries tracks the remaining aggregates for every descendant of
//! something already in the block; each round compares the best shadow
//! entry against the next mempool entry and works on whichever package
//! scores higher.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, BTreeSet, HashMap, HashSet};

use emberd_consensus::{
    block_subsidy, proof_of_stake_reward, Amount, ChainParams, BLOCK_LIMITER_TIME, COIN,
    LOCKTIME_MEDIAN_TIME_PAST, MAX_BLOCK_SIGOPS_COST, STANDARD_LOCKTIME_VERIFY_FLAGS,
    WITNESS_SCALE_FACTOR,
};
use emberd_log::log_info;
use emberd_mempool::{FeeRate, Mempool, MempoolEntry, Txid};
use emberd_primitives::{
    block::BlockHeader, merkle::block_merkle_root, merkle::witness_merkle_root, OutPoint,
    Transaction, TxIn, TxOut,
};
use emberd_script::{tx_legacy_sigop_count, Builder, OP_0, OP_RETURN};

use crate::chain::ChainView;
use crate::error::MinerError;
use crate::hash_to_hex;
use crate::options::{AssemblerOptions, BlockLimits};
use crate::stats::MinerStats;
use crate::template::BlockTemplate;
use crate::work::update_time;

/// Magic bytes of the witness commitment output.
const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

/// Coin-age priority above which a transaction rides for free.
fn allow_free(priority: f64) -> bool {
    priority > (COIN as f64) * 144.0 / 250.0
}

/// Shadow of a mempool entry whose cached ancestor aggregates are stale
/// because some ancestors were already committed to the block. Holds the
/// base aggregates minus every committed ancestor's own contribution.
#[derive(Clone, Copy, Debug)]
struct ModifiedEntry {
    txid: Txid,
    size_with_ancestors: u64,
    fees_with_ancestors: Amount,
    sigop_cost_with_ancestors: i64,
}

#[derive(Clone, Copy, Eq, PartialEq)]
struct ModifiedScoreKey {
    fees: Amount,
    size: u64,
    txid: Txid,
}

impl Ord for ModifiedScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_package(self.fees, self.size, other.fees, other.size)
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for ModifiedScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders packages best-first: higher feerate wins; callers add a txid
/// tie-break.
fn compare_package(a_fees: Amount, a_size: u64, b_fees: Amount, b_size: u64) -> Ordering {
    let left = i128::from(a_fees).saturating_mul(b_size as i128);
    let right = i128::from(b_fees).saturating_mul(a_size as i128);
    right.cmp(&left)
}

/// The modified-entry set: lookup by txid, ordered by modified ancestor
/// feerate. A secondary store over the mempool; the mempool itself is
/// never mutated during assembly.
#[derive(Default)]
struct ModifiedTxSet {
    entries: HashMap<Txid, ModifiedEntry>,
    by_score: BTreeSet<ModifiedScoreKey>,
}

impl ModifiedTxSet {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains(&self, txid: &Txid) -> bool {
        self.entries.contains_key(txid)
    }

    fn get(&self, txid: &Txid) -> Option<&ModifiedEntry> {
        self.entries.get(txid)
    }

    fn best(&self) -> Option<&ModifiedEntry> {
        let key = self.by_score.iter().next()?;
        self.entries.get(&key.txid)
    }

    /// Record that `committed` is now in the block: the descendant's
    /// remaining package shrinks by the committed entry's own footprint.
    /// Creates the shadow from the base entry on first sight.
    fn decrement_for_parent(&mut self, base: &MempoolEntry, committed: &MempoolEntry) {
        let mut entry = match self.entries.remove(&base.txid) {
            Some(existing) => {
                self.by_score.remove(&Self::key(&existing));
                existing
            }
            None => ModifiedEntry {
                txid: base.txid,
                size_with_ancestors: base.size_with_ancestors,
                fees_with_ancestors: base.fees_with_ancestors,
                sigop_cost_with_ancestors: base.sigop_cost_with_ancestors,
            },
        };
        entry.size_with_ancestors = entry.size_with_ancestors.saturating_sub(committed.tx_size());
        entry.fees_with_ancestors = entry
            .fees_with_ancestors
            .saturating_sub(committed.modified_fee());
        entry.sigop_cost_with_ancestors -= committed.sigop_cost;
        self.by_score.insert(Self::key(&entry));
        self.entries.insert(entry.txid, entry);
    }

    fn remove(&mut self, txid: &Txid) {
        if let Some(entry) = self.entries.remove(txid) {
            self.by_score.remove(&Self::key(&entry));
        }
    }

    fn key(entry: &ModifiedEntry) -> ModifiedScoreKey {
        ModifiedScoreKey {
            fees: entry.fees_with_ancestors,
            size: entry.size_with_ancestors,
            txid: entry.txid,
        }
    }
}

/// Heap entry for the priority phase. Highest priority pops first, ties by
/// txid for deterministic assembly.
struct PriorityCandidate {
    priority: f64,
    txid: Txid,
}

impl PartialEq for PriorityCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriorityCandidate {}

impl Ord for PriorityCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.txid.cmp(&self.txid))
    }
}

impl PartialOrd for PriorityCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct BlockAssembler<'a, C: ChainView> {
    params: &'a ChainParams,
    chain: &'a C,
    mempool: &'a Mempool,
    stats: &'a MinerStats,
    limits: BlockLimits,
    block_priority_size: u64,
    block_version_override: Option<i32>,
    print_priority: bool,
    min_relay_fee: FeeRate,

    template: BlockTemplate,
    in_block: HashSet<Txid>,
    block_size: u64,
    block_weight: u64,
    block_sigops: i64,
    fees: Amount,
    block_tx: u64,
    last_few_txs: u32,
    block_finished: bool,
    include_witness: bool,
    need_size_accounting: bool,
    height: i32,
    lock_time_cutoff: i64,
}

impl<'a, C: ChainView> BlockAssembler<'a, C> {
    pub fn new(
        params: &'a ChainParams,
        options: &AssemblerOptions,
        chain: &'a C,
        mempool: &'a Mempool,
        stats: &'a MinerStats,
    ) -> Self {
        let limits = BlockLimits::resolve(options);
        Self {
            params,
            chain,
            mempool,
            stats,
            limits,
            block_priority_size: options.block_priority_size.min(limits.block_max_size),
            block_version_override: options.block_version,
            print_priority: options.print_priority,
            min_relay_fee: options.min_relay_fee,
            template: BlockTemplate::default(),
            in_block: HashSet::new(),
            block_size: 0,
            block_weight: 0,
            block_sigops: 0,
            fees: 0,
            block_tx: 0,
            last_few_txs: 0,
            block_finished: false,
            include_witness: false,
            need_size_accounting: limits.need_size_accounting,
            height: 0,
            lock_time_cutoff: 0,
        }
    }

    fn reset_block(&mut self) {
        self.in_block.clear();

        // Reserve space for the coinbase.
        self.block_size = 1_000;
        self.block_weight = 4_000;
        self.block_sigops = 400;
        self.include_witness = false;

        // These counters do not include the coinbase.
        self.block_tx = 0;
        self.fees = 0;

        self.last_few_txs = 0;
        self.block_finished = false;
    }

    /// Build a candidate block paying `script_pub_key` (ignored for
    /// proof-of-stake templates, whose coinbase stays empty; the reward is
    /// reported through `stake_reward` for the coinstake builder instead).
    pub fn create_new_block(
        mut self,
        script_pub_key: &[u8],
        proof_of_stake: bool,
        stake_reward: Option<&mut Amount>,
        mine_witness_txs: bool,
    ) -> Result<BlockTemplate, MinerError> {
        self.reset_block();

        // The reward must be returned for proof of stake.
        if proof_of_stake && stake_reward.is_none() {
            return Err(MinerError::MissingStakeReward);
        }

        let adjusted_time = self.chain.adjusted_time();
        let tip = self.chain.tip();
        self.height = tip.height + 1;

        let mut version = self.chain.compute_block_version();
        if self.params.mine_blocks_on_demand {
            if let Some(override_version) = self.block_version_override {
                version = override_version;
            }
        }

        // Slot zero is a placeholder until the coinbase is built at the
        // end; its timestamp bounds priority-phase candidates on PoS.
        let mut placeholder = Transaction::new(adjusted_time as u32);
        placeholder.vin.push(TxIn {
            prevout: OutPoint::null(),
            script_sig: Vec::new(),
            sequence: u32::MAX,
        });
        let coinbase_time = placeholder.time;
        self.template.block.vtx.push(placeholder);
        self.template.tx_fees.push(-1);
        self.template.tx_sigop_costs.push(-1);

        self.template.block.header = BlockHeader {
            version,
            prev_block: tip.hash,
            merkle_root: [0u8; 32],
            time: adjusted_time as u32,
            bits: 0,
            nonce: 0,
        };

        let median_time_past = tip.median_time_past;
        self.lock_time_cutoff =
            if (STANDARD_LOCKTIME_VERIFY_FLAGS & LOCKTIME_MEDIAN_TIME_PAST) != 0 {
                median_time_past
            } else {
                i64::from(self.template.block.header.time)
            };

        self.include_witness = self.chain.is_witness_enabled() && mine_witness_txs;

        self.add_priority_txs(proof_of_stake, coinbase_time);
        self.add_package_txs();

        self.stats
            .publish_block(self.block_tx, self.block_size, self.block_weight);

        // Create the coinbase transaction.
        let mut coinbase = Transaction::new(adjusted_time as u32);
        coinbase.vin.push(TxIn {
            prevout: OutPoint::null(),
            script_sig: Builder::new()
                .push_num(i64::from(self.height))
                .push_opcode(OP_0)
                .into_script(),
            sequence: u32::MAX,
        });
        if proof_of_stake {
            coinbase.vout.push(TxOut {
                value: 0,
                script_pubkey: Vec::new(),
            });
            if let Some(reward) = stake_reward {
                *reward = self.fees
                    + proof_of_stake_reward(self.height, &self.params.consensus);
            }
        } else {
            coinbase.vout.push(TxOut {
                value: self.fees + block_subsidy(self.height, &self.params.consensus),
                script_pubkey: script_pub_key.to_vec(),
            });
        }
        self.template.block.vtx[0] = coinbase;
        self.template.coinbase_commitment = self.generate_coinbase_commitment();
        self.template.tx_fees[0] = -self.fees;
        self.template.tx_sigop_costs[0] = (WITNESS_SCALE_FACTOR as i64)
            * i64::from(tx_legacy_sigop_count(&self.template.block.vtx[0]));

        // Fill in the header.
        if proof_of_stake {
            let mut time = (median_time_past + BLOCK_LIMITER_TIME + 1)
                .max(i64::from(self.template.block.max_transaction_time()));
            time = time.max(self.params.consensus.past_drift(tip.time));
            let header = &mut self.template.block.header;
            header.time = time as u32;
        } else {
            update_time(&mut self.template.block.header, self.chain, &tip);
        }
        self.template.block.header.bits = self.chain.next_work_required(proof_of_stake);
        self.template.block.header.nonce = 0;
        self.template.block.header.merkle_root = block_merkle_root(&self.template.block);

        Ok(self.template)
    }

    /// Witness commitment output, added to the coinbase iff witness
    /// inclusion is on and the block actually carries witness data.
    fn generate_coinbase_commitment(&mut self) -> Vec<u8> {
        if !self.include_witness {
            return Vec::new();
        }
        let any_witness = self
            .template
            .block
            .vtx
            .iter()
            .skip(1)
            .any(|tx| tx.has_witness());
        if !any_witness {
            return Vec::new();
        }

        let witness_root = witness_merkle_root(&self.template.block);
        let witness_nonce = [0u8; 32];
        let commitment = emberd_primitives::hash::sha256d_pair(&witness_root, &witness_nonce);

        let mut script = Vec::with_capacity(38);
        script.push(OP_RETURN);
        script.push(36);
        script.extend_from_slice(&WITNESS_COMMITMENT_HEADER);
        script.extend_from_slice(&commitment);

        let coinbase = &mut self.template.block.vtx[0];
        coinbase.vout.push(TxOut {
            value: 0,
            script_pubkey: script.clone(),
        });
        coinbase.witness = vec![vec![witness_nonce.to_vec()]];
        script
    }

    /// Fast feasibility check on a package's vsize and sigops, run before
    /// the ancestor set is materialized. vsize is a conservative stand-in
    /// for weight here.
    fn test_package(&self, package_size: u64, package_sigops: i64) -> bool {
        if self.block_weight + WITNESS_SCALE_FACTOR * package_size >= self.limits.block_max_weight
        {
            return false;
        }
        if self.block_sigops + package_sigops >= MAX_BLOCK_SIGOPS_COST {
            return false;
        }
        true
    }

    /// Per-transaction checks over the whole package about to be
    /// committed: finality, witness admissibility, and (when bytes are
    /// accounted) serialized size. All-or-nothing.
    fn test_package_transactions(&self, package: &[Txid]) -> bool {
        let mempool = self.mempool;
        let mut potential_size = self.block_size;
        for txid in package {
            let Some(entry) = mempool.get(txid) else {
                return false;
            };
            if !entry.tx.is_final(self.height, self.lock_time_cutoff) {
                return false;
            }
            if !self.include_witness && entry.tx.has_witness() {
                return false;
            }
            if self.need_size_accounting {
                if potential_size + entry.size >= self.limits.block_max_size {
                    return false;
                }
                potential_size += entry.size;
            }
        }
        true
    }

    /// Whether a single transaction still fits the block. Near the caps
    /// this also decides when to stop trying: once the remaining space is
    /// a sliver, only a bounded number of further attempts is allowed
    /// before the block is declared finished.
    fn test_for_block(&mut self, entry: &MempoolEntry) -> bool {
        if self.block_weight + entry.weight >= self.limits.block_max_weight {
            if self.block_weight > self.limits.block_max_weight - 400 || self.last_few_txs > 50 {
                self.block_finished = true;
                return false;
            }
            // Within 4000 weight of full: only look at 50 more txs to
            // fill the remaining space.
            if self.block_weight > self.limits.block_max_weight - 4_000 {
                self.last_few_txs += 1;
            }
            return false;
        }

        if self.need_size_accounting {
            if self.block_size + entry.size >= self.limits.block_max_size {
                if self.block_size > self.limits.block_max_size - 100 || self.last_few_txs > 50 {
                    self.block_finished = true;
                    return false;
                }
                if self.block_size > self.limits.block_max_size - 1_000 {
                    self.last_few_txs += 1;
                }
                return false;
            }
        }

        if self.block_sigops + entry.sigop_cost >= MAX_BLOCK_SIGOPS_COST {
            if self.block_sigops > MAX_BLOCK_SIGOPS_COST - 8 {
                self.block_finished = true;
            }
            return false;
        }

        // Lock times must still be valid at the new height.
        entry.tx.is_final(self.height, self.lock_time_cutoff)
    }

    fn add_to_block(&mut self, entry: &MempoolEntry) {
        self.template.block.vtx.push(entry.tx.clone());
        self.template.tx_fees.push(entry.fee);
        self.template.tx_sigop_costs.push(entry.sigop_cost);
        if self.need_size_accounting {
            self.block_size += entry.size;
        }
        self.block_weight += entry.weight;
        self.block_tx += 1;
        self.block_sigops += entry.sigop_cost;
        self.fees += entry.fee;
        self.in_block.insert(entry.txid);

        if self.print_priority {
            let mut priority = entry.priority(self.height);
            let mut dummy = 0;
            self.mempool.apply_deltas(&entry.txid, &mut priority, &mut dummy);
            let feerate_per_kb = if entry.tx_size() > 0 {
                entry.modified_fee().saturating_mul(1_000) / entry.tx_size() as Amount
            } else {
                0
            };
            log_info!(
                "priority {:.1} fee {}/kB txid {}",
                priority,
                feerate_per_kb,
                hash_to_hex(&entry.txid)
            );
        }
    }

    fn is_still_dependent(&self, txid: &Txid) -> bool {
        self.mempool
            .parents_of(txid)
            .iter()
            .any(|parent| !self.in_block.contains(parent))
    }

    /// Fill the first `block_priority_size` bytes with the highest
    /// coin-age-priority transactions, parents before children, free of
    /// any fee consideration. Byte-budgeted, so size accounting is forced
    /// on for the duration.
    fn add_priority_txs(&mut self, proof_of_stake: bool, block_time: u32) {
        if self.block_priority_size == 0 {
            return;
        }

        let size_accounting = self.need_size_accounting;
        self.need_size_accounting = true;

        let mempool = self.mempool;
        let mut heap: BinaryHeap<PriorityCandidate> = mempool
            .entries()
            .map(|entry| {
                let mut priority = entry.priority(self.height);
                let mut dummy = 0;
                mempool.apply_deltas(&entry.txid, &mut priority, &mut dummy);
                PriorityCandidate {
                    priority,
                    txid: entry.txid,
                }
            })
            .collect();
        let mut wait_priority: HashMap<Txid, f64> = HashMap::new();

        while let Some(candidate) = heap.pop() {
            if self.block_finished {
                break;
            }
            let adjusted_time = self.chain.adjusted_time();

            if self.in_block.contains(&candidate.txid) {
                debug_assert!(false, "priority candidate already in block");
                continue;
            }
            let Some(entry) = mempool.get(&candidate.txid) else {
                continue;
            };

            // Cannot accept witness transactions into a non-witness block.
            if !self.include_witness && entry.tx.has_witness() {
                continue;
            }

            if i64::from(entry.tx.time) > adjusted_time
                || (proof_of_stake && entry.tx.time > block_time)
            {
                continue;
            }

            // Parents first: park entries whose ancestors are not all in
            // the block yet.
            if self.is_still_dependent(&candidate.txid) {
                wait_priority.insert(candidate.txid, candidate.priority);
                continue;
            }

            if self.test_for_block(entry) {
                self.add_to_block(entry);

                if self.block_size >= self.block_priority_size
                    || !allow_free(candidate.priority)
                {
                    break;
                }

                // Unpark any children now that this parent is in.
                for child in mempool.children_of(&candidate.txid) {
                    if let Some(parked) = wait_priority.remove(child) {
                        heap.push(PriorityCandidate {
                            priority: parked,
                            txid: *child,
                        });
                    }
                }
            }
        }
        self.need_size_accounting = size_accounting;
    }

    /// Seed or update shadow entries for every uncommitted descendant of
    /// the just-committed transactions.
    fn update_packages_for_added(&self, added: &[Txid], modified: &mut ModifiedTxSet) {
        let mempool = self.mempool;
        let added_set: HashSet<&Txid> = added.iter().collect();
        for txid in added {
            let Some(committed) = mempool.get(txid) else {
                continue;
            };
            for descendant in mempool.calculate_descendants(txid) {
                if added_set.contains(&descendant) || self.in_block.contains(&descendant) {
                    continue;
                }
                let Some(base) = mempool.get(&descendant) else {
                    continue;
                };
                modified.decrement_for_parent(base, committed);
            }
        }
    }

    /// Main selection loop over the ancestor-feerate order.
    fn add_package_txs(&mut self) {
        let mempool = self.mempool;
        let mut modified = ModifiedTxSet::default();
        let mut failed: HashSet<Txid> = HashSet::new();

        // Descendants of priority-phase picks start out modified.
        let mut already_added: Vec<Txid> = self.in_block.iter().copied().collect();
        already_added.sort();
        self.update_packages_for_added(&already_added, &mut modified);

        let order: Vec<Txid> = mempool.ancestor_score_iter().collect();
        let mut cursor = 0usize;

        while cursor < order.len() || !modified.is_empty() {
            if cursor < order.len() {
                let txid = &order[cursor];
                // Skip entries whose base aggregates are stale (shadowed),
                // already committed, or already rejected this pass.
                if self.in_block.contains(txid)
                    || modified.contains(txid)
                    || failed.contains(txid)
                {
                    cursor += 1;
                    continue;
                }
            }

            // Pick the next package: the best shadow entry or the next
            // mempool entry, whichever scores higher.
            let mut using_modified = false;
            let candidate: Txid;
            if cursor >= order.len() {
                candidate = modified.best().expect("loop invariant").txid;
                using_modified = true;
            } else {
                let from_pool = order[cursor];
                match modified.best() {
                    Some(best) => {
                        let entry = mempool.get(&from_pool).expect("indexed entry");
                        if compare_package(
                            best.fees_with_ancestors,
                            best.size_with_ancestors,
                            entry.fees_with_ancestors,
                            entry.size_with_ancestors,
                        )
                        .then_with(|| best.txid.cmp(&entry.txid))
                            == Ordering::Less
                        {
                            candidate = best.txid;
                            using_modified = true;
                        } else {
                            candidate = from_pool;
                            cursor += 1;
                        }
                    }
                    None => {
                        candidate = from_pool;
                        cursor += 1;
                    }
                }
            }

            assert!(
                !self.in_block.contains(&candidate),
                "in-block entry offered for selection"
            );

            let entry = mempool.get(&candidate).expect("candidate in mempool");
            let (package_size, package_fees, package_sigops) = if using_modified {
                let shadow = modified.get(&candidate).expect("modified candidate");
                (
                    shadow.size_with_ancestors,
                    shadow.fees_with_ancestors,
                    shadow.sigop_cost_with_ancestors,
                )
            } else {
                (
                    entry.size_with_ancestors,
                    entry.fees_with_ancestors,
                    entry.sigop_cost_with_ancestors,
                )
            };

            if package_fees < self.min_relay_fee.fee_for(package_size) {
                // Everything else scores lower; selection is done.
                return;
            }

            if !self.test_package(package_size, package_sigops) {
                if using_modified {
                    // The best shadow entry failed: drop it so the next
                    // best can surface, and remember the failure so the
                    // mempool cursor skips its stale base entry later.
                    modified.remove(&candidate);
                    failed.insert(candidate);
                }
                continue;
            }

            let mut package = mempool.calculate_ancestors(&candidate);
            package.retain(|txid| !self.in_block.contains(txid));
            package.push(candidate);

            if !self.test_package_transactions(&package) {
                if using_modified {
                    modified.remove(&candidate);
                    failed.insert(candidate);
                }
                continue;
            }

            // Commit in a valid order: ancestor count is a topological
            // rank, so sorting by it puts parents first.
            package.sort_by(|a, b| {
                let a_count = mempool.get(a).map(|e| e.count_with_ancestors).unwrap_or(0);
                let b_count = mempool.get(b).map(|e| e.count_with_ancestors).unwrap_or(0);
                a_count.cmp(&b_count).then_with(|| a.cmp(b))
            });
            for txid in &package {
                let entry = mempool.get(txid).expect("package entry");
                self.add_to_block(entry);
                modified.remove(txid);
            }

            self.update_packages_for_added(&package, &mut modified);
        }
    }
}
