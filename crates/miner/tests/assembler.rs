//! End-to-end template assembly scenarios.

use std::sync::Mutex;

use emberd_consensus::{
    block_subsidy, chain_params, proof_of_stake_reward, Amount, ChainParams, Hash256, Network,
    COIN,
};
use emberd_mempool::{FeeRate, Mempool, MempoolEntry, Txid};
use emberd_miner::{
    check_stake, check_work, increment_extra_nonce, sign_block, AssemblerOptions, BlockAssembler,
    ChainTip, ChainView, ExtraNonce, MinerError, MinerStats, StakingWallet,
};
use emberd_primitives::{Block, OutPoint, Transaction, TxIn, TxOut};

const NOW: i64 = 1_750_000_000;

struct TestChain {
    tip: Mutex<ChainTip>,
    now: Mutex<i64>,
    /// Tick the clock forward on every read, for driver-loop tests.
    advancing_clock: bool,
    witness_enabled: bool,
    accepted: Mutex<Vec<Hash256>>,
}

impl TestChain {
    fn new() -> Self {
        Self {
            tip: Mutex::new(ChainTip {
                hash: [0xaa; 32],
                height: 1_000,
                time: NOW - 120,
                median_time_past: NOW - 600,
            }),
            now: Mutex::new(NOW),
            advancing_clock: false,
            witness_enabled: true,
            accepted: Mutex::new(Vec::new()),
        }
    }

    fn without_witness() -> Self {
        let mut chain = Self::new();
        chain.witness_enabled = false;
        chain
    }

    fn with_advancing_clock() -> Self {
        let mut chain = Self::new();
        chain.advancing_clock = true;
        chain
    }

    fn advance_tip(&self) {
        let mut tip = self.tip.lock().unwrap();
        tip.hash = [0xbb; 32];
        tip.height += 1;
    }

    fn accepted_count(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }
}

impl ChainView for TestChain {
    fn tip(&self) -> ChainTip {
        *self.tip.lock().unwrap()
    }

    fn next_work_required(&self, proof_of_stake: bool) -> u32 {
        if proof_of_stake {
            0x2070ffff
        } else {
            0x207fffff
        }
    }

    fn is_witness_enabled(&self) -> bool {
        self.witness_enabled
    }

    fn compute_block_version(&self) -> i32 {
        4
    }

    fn adjusted_time(&self) -> i64 {
        let mut now = self.now.lock().unwrap();
        if self.advancing_clock {
            *now += 1;
        }
        *now
    }

    fn verify_stake_kernel(&self, _coinstake: &Transaction, _bits: u32) -> bool {
        true
    }

    fn process_new_block(&self, block: &Block) -> Result<(), String> {
        self.accepted.lock().unwrap().push(block.hash());
        Ok(())
    }
}

struct TestWallet;

impl StakingWallet for TestWallet {
    fn is_locked(&self) -> bool {
        false
    }

    fn reserve_script(&self) -> Option<Vec<u8>> {
        Some(pay_script())
    }

    fn keypool_empty(&self) -> bool {
        false
    }

    fn create_coin_stake(
        &self,
        _bits: u32,
        _search_interval: i64,
        tx_time: u32,
        stake_reward: Amount,
    ) -> Option<Transaction> {
        let mut coinstake = Transaction::new(tx_time);
        coinstake.vin.push(TxIn {
            prevout: OutPoint::new([0x77; 32], 0),
            script_sig: vec![0x01, 0x02],
            sequence: u32::MAX,
        });
        coinstake.vout.push(TxOut {
            value: 0,
            script_pubkey: Vec::new(),
        });
        coinstake.vout.push(TxOut {
            value: 10 * COIN + stake_reward,
            script_pubkey: pay_script(),
        });
        Some(coinstake)
    }

    fn sign_block_hash(&self, _hash: &Hash256) -> Option<Vec<u8>> {
        Some(vec![0x30, 0x44, 0x02, 0x20])
    }
}

fn pay_script() -> Vec<u8> {
    // Push of a dummy pubkey followed by OP_CHECKSIG.
    let mut script = vec![33u8];
    script.extend_from_slice(&[0x02; 33]);
    script.push(0xac);
    script
}

fn params() -> ChainParams {
    chain_params(Network::Regtest)
}

fn make_tx(tag: u8, parents: &[(Txid, u32)], pad: usize, time: u32) -> Transaction {
    let mut tx = Transaction::new(time);
    if parents.is_empty() {
        tx.vin.push(TxIn {
            prevout: OutPoint::new([0xe0 ^ tag; 32], 0),
            script_sig: vec![tag],
            sequence: u32::MAX,
        });
    }
    for (hash, index) in parents {
        tx.vin.push(TxIn {
            prevout: OutPoint::new(*hash, *index),
            script_sig: vec![tag],
            sequence: u32::MAX,
        });
    }
    tx.vout.push(TxOut {
        value: 10_000,
        script_pubkey: vec![0x51; 1 + pad],
    });
    tx
}

/// Insert a transaction paying the given feerate per virtual byte.
fn insert_at_rate(pool: &mut Mempool, tx: Transaction, rate: Amount) -> Txid {
    let fee = rate * tx.virtual_size() as Amount;
    insert_with_fee(pool, tx, fee, 0.0)
}

fn insert_with_fee(pool: &mut Mempool, tx: Transaction, fee: Amount, priority: f64) -> Txid {
    let txid = tx.txid();
    let entry = MempoolEntry::new(tx, fee, NOW as u64, 900, 100 * COIN, priority, 4);
    pool.insert(entry).expect("insert entry");
    txid
}

fn build_pow(
    chain: &TestChain,
    pool: &Mempool,
    options: &AssemblerOptions,
) -> emberd_miner::BlockTemplate {
    let params = params();
    let stats = MinerStats::new();
    BlockAssembler::new(&params, options, chain, pool, &stats)
        .create_new_block(&pay_script(), false, None, true)
        .expect("template")
}

#[test]
fn empty_mempool_pow_template() {
    let chain = TestChain::new();
    let pool = Mempool::new();
    let template = build_pow(&chain, &pool, &AssemblerOptions::default());

    assert_eq!(template.block.vtx.len(), 1);
    assert_eq!(template.tx_fees, vec![0]);
    let coinbase = &template.block.vtx[0];
    assert!(coinbase.is_coinbase());
    let expected = block_subsidy(1_001, &params().consensus);
    assert_eq!(coinbase.vout[0].value, expected);
    assert_eq!(template.block.header.prev_block, chain.tip().hash);
    assert_eq!(template.block.header.bits, 0x207fffff);
    assert_eq!(template.block.header.nonce, 0);
    // PoW timestamp: at least limiter floor, at most the adjusted clock.
    assert!(i64::from(template.block.header.time) >= chain.tip().median_time_past + 61);
    assert!(i64::from(template.block.header.time) >= NOW);
}

#[test]
fn single_transaction_pays_fees_to_coinbase() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    let txid = insert_with_fee(&mut pool, make_tx(1, &[], 20, 0), 50_000, 0.0);
    let template = build_pow(&chain, &pool, &AssemblerOptions::default());

    assert_eq!(template.block.vtx.len(), 2);
    assert_eq!(template.block.vtx[1].txid(), txid);
    assert_eq!(template.tx_fees[0], -50_000);
    assert_eq!(template.tx_fees[1], 50_000);
    let expected = 50_000 + block_subsidy(1_001, &params().consensus);
    assert_eq!(template.block.vtx[0].vout[0].value, expected);
}

#[test]
fn ancestor_package_committed_together_in_order() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    // A pays 1/vB, B pays 100/vB on top of A, C pays 2/vB on top of B.
    let a = insert_at_rate(&mut pool, make_tx(1, &[], 20, 0), 1);
    let b = insert_at_rate(&mut pool, make_tx(2, &[(a, 0)], 20, 0), 100);
    let c = insert_at_rate(&mut pool, make_tx(3, &[(b, 0)], 20, 0), 2);

    let options = AssemblerOptions {
        min_relay_fee: FeeRate::new(0),
        ..Default::default()
    };
    let template = build_pow(&chain, &pool, &options);

    let committed: Vec<Txid> = template.block.vtx[1..].iter().map(|tx| tx.txid()).collect();
    assert_eq!(committed, vec![a, b, c]);
}

#[test]
fn every_parent_precedes_its_child() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    let a = insert_at_rate(&mut pool, make_tx(1, &[], 10, 0), 3);
    let b = insert_at_rate(&mut pool, make_tx(2, &[(a, 0)], 10, 0), 9);
    let c = insert_at_rate(&mut pool, make_tx(3, &[], 10, 0), 5);
    let d = insert_at_rate(&mut pool, make_tx(4, &[(b, 0), (c, 0)], 10, 0), 40);

    let template = build_pow(&chain, &pool, &AssemblerOptions::default());
    let committed: Vec<Txid> = template.block.vtx[1..].iter().map(|tx| tx.txid()).collect();
    assert_eq!(committed.len(), 4);
    let position = |txid: &Txid| committed.iter().position(|t| t == txid).unwrap();
    assert!(position(&a) < position(&b));
    assert!(position(&b) < position(&d));
    assert!(position(&c) < position(&d));
}

#[test]
fn template_assembly_is_deterministic() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    for tag in 0..20u8 {
        insert_at_rate(&mut pool, make_tx(tag, &[], 10 + tag as usize, 0), 2 + Amount::from(tag % 5));
    }
    let first = build_pow(&chain, &pool, &AssemblerOptions::default());
    let second = build_pow(&chain, &pool, &AssemblerOptions::default());
    let order = |t: &emberd_miner::BlockTemplate| -> Vec<Txid> {
        t.block.vtx.iter().map(|tx| tx.txid()).collect()
    };
    assert_eq!(order(&first), order(&second));
}

#[test]
fn priority_prefix_admits_ancient_free_transaction() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    // Ancient coins, no fee: rides in the priority prefix.
    let ancient = insert_with_fee(&mut pool, make_tx(1, &[], 20, 0), 0, 1e15);
    // Well-paying but freshly funded.
    let paying = insert_with_fee(&mut pool, make_tx(2, &[], 20, 0), 80_000, 0.0);

    let options = AssemblerOptions {
        block_priority_size: 10_000,
        ..Default::default()
    };
    let template = build_pow(&chain, &pool, &options);

    let committed: Vec<Txid> = template.block.vtx[1..].iter().map(|tx| tx.txid()).collect();
    assert!(committed.contains(&ancient));
    assert!(committed.contains(&paying));
    // The free transaction owes its slot to the prefix: first after the
    // coinbase.
    assert_eq!(committed[0], ancient);
}

#[test]
fn priority_prefix_waits_for_parents() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    let parent = insert_with_fee(&mut pool, make_tx(1, &[], 20, 0), 0, 9e14);
    let child = insert_with_fee(&mut pool, make_tx(2, &[(parent, 0)], 20, 0), 0, 1e15);

    let options = AssemblerOptions {
        block_priority_size: 10_000,
        min_relay_fee: FeeRate::new(0),
        ..Default::default()
    };
    let template = build_pow(&chain, &pool, &options);
    let committed: Vec<Txid> = template.block.vtx[1..].iter().map(|tx| tx.txid()).collect();
    // The child tops the priority heap but must wait for its parent.
    assert_eq!(committed, vec![parent, child]);
}

#[test]
fn witness_transactions_skipped_when_witness_off() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    let mut segwit = make_tx(1, &[], 20, 0);
    segwit.witness = vec![vec![vec![0xab; 70]]];
    let segwit_txid = insert_with_fee(&mut pool, segwit, 90_000, 0.0);
    let plain = insert_with_fee(&mut pool, make_tx(2, &[], 20, 0), 40_000, 0.0);

    let params = params();
    let stats = MinerStats::new();
    let options = AssemblerOptions::default();
    let template = BlockAssembler::new(&params, &options, &chain, &pool, &stats)
        .create_new_block(&pay_script(), false, None, false)
        .expect("template");

    let committed: Vec<Txid> = template.block.vtx[1..].iter().map(|tx| tx.txid()).collect();
    assert_eq!(committed, vec![plain]);
    assert!(!committed.contains(&segwit_txid));
    assert!(template.coinbase_commitment.is_empty());
}

#[test]
fn witness_disabled_chain_behaves_like_witness_off() {
    let chain = TestChain::without_witness();
    let mut pool = Mempool::new();
    let mut segwit = make_tx(1, &[], 20, 0);
    segwit.witness = vec![vec![vec![0xab; 70]]];
    insert_with_fee(&mut pool, segwit, 90_000, 0.0);

    let template = build_pow(&chain, &pool, &AssemblerOptions::default());
    assert_eq!(template.block.vtx.len(), 1);
}

#[test]
fn witness_block_carries_commitment() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    let mut segwit = make_tx(1, &[], 20, 0);
    segwit.witness = vec![vec![vec![0xab; 70]]];
    insert_with_fee(&mut pool, segwit, 90_000, 0.0);

    let template = build_pow(&chain, &pool, &AssemblerOptions::default());
    assert_eq!(template.block.vtx.len(), 2);
    assert!(!template.coinbase_commitment.is_empty());
    let coinbase = &template.block.vtx[0];
    // Commitment output appended after the payout output.
    assert_eq!(coinbase.vout.len(), 2);
    assert_eq!(coinbase.vout[1].script_pubkey, template.coinbase_commitment);
    assert_eq!(coinbase.vout[1].value, 0);
    assert!(coinbase.has_witness());
}

#[test]
fn weight_cap_respected_under_saturation() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    for tag in 0..200u16 {
        let tx = make_tx((tag % 251) as u8, &[], 10 + (tag / 251) as usize, 0);
        // Vary the outpoint to keep txids unique.
        let mut tx = tx;
        tx.vin[0].prevout = OutPoint::new(
            {
                let mut hash = [0u8; 32];
                hash[0] = (tag & 0xff) as u8;
                hash[1] = (tag >> 8) as u8;
                hash[31] = 0xcc;
                hash
            },
            0,
        );
        insert_at_rate(&mut pool, tx, 2);
    }

    let options = AssemblerOptions {
        block_max_weight: Some(20_000),
        ..Default::default()
    };
    let template = build_pow(&chain, &pool, &options);

    let used: u64 = template.block.vtx[1..].iter().map(|tx| tx.weight()).sum();
    // The coinbase reservation is 4000 weight.
    assert!(used + 4_000 <= 20_000);
    assert!(template.block.vtx.len() > 10);
    assert!(template.block.vtx.len() < 201);
}

#[test]
fn size_cap_respected_in_priority_phase() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    for tag in 0..100u8 {
        insert_with_fee(&mut pool, make_tx(tag, &[], 40, 0), 0, 1e15);
    }

    let options = AssemblerOptions {
        block_max_size: Some(5_000),
        block_priority_size: 5_000,
        min_relay_fee: FeeRate::new(0),
        ..Default::default()
    };
    let template = build_pow(&chain, &pool, &options);

    let used: u64 = template.block.vtx[1..].iter().map(|tx| tx.total_size()).sum();
    // The coinbase reservation is 1000 bytes.
    assert!(used + 1_000 <= 5_000);
    assert!(template.block.vtx.len() > 10);
    assert!(template.block.vtx.len() < 101);
}

#[test]
fn fee_floor_ends_selection() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    // Below the default 1000-per-kB floor.
    insert_with_fee(&mut pool, make_tx(1, &[], 20, 0), 10, 0.0);

    let template = build_pow(&chain, &pool, &AssemblerOptions::default());
    assert_eq!(template.block.vtx.len(), 1);
}

#[test]
fn pos_template_has_empty_coinbase_and_reports_reward() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    insert_with_fee(&mut pool, make_tx(1, &[], 20, 0), 50_000, 0.0);

    let params = params();
    let stats = MinerStats::new();
    let options = AssemblerOptions::default();
    let mut stake_reward = 0;
    let template = BlockAssembler::new(&params, &options, &chain, &pool, &stats)
        .create_new_block(&[], true, Some(&mut stake_reward), true)
        .expect("template");

    let coinbase = &template.block.vtx[0];
    assert!(coinbase.vout[0].is_empty());
    assert_eq!(
        stake_reward,
        50_000 + proof_of_stake_reward(1_001, &params.consensus)
    );
    // Not yet proof of stake: the coinstake slot is filled by the signer.
    assert!(template.block.is_proof_of_work());
    assert_eq!(template.block.header.bits, 0x2070ffff);
    // PoS timestamp floors.
    let time = i64::from(template.block.header.time);
    assert!(time >= chain.tip().median_time_past + 61);
    assert!(time >= params.consensus.past_drift(chain.tip().time));
}

#[test]
fn pos_template_requires_reward_out_param() {
    let chain = TestChain::new();
    let pool = Mempool::new();
    let params = params();
    let stats = MinerStats::new();
    let options = AssemblerOptions::default();
    let result = BlockAssembler::new(&params, &options, &chain, &pool, &stats)
        .create_new_block(&[], true, None, true);
    assert_eq!(result.err(), Some(MinerError::MissingStakeReward));
}

#[test]
fn sign_block_inserts_coinstake_and_strips_future_transactions() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    let current = insert_with_fee(&mut pool, make_tx(1, &[], 20, 100), 50_000, 0.0);
    // Far-future timestamp: enters the template (the package phase does
    // not look at times) but must not survive signing.
    let future = insert_with_fee(
        &mut pool,
        make_tx(2, &[], 20, (NOW + 9_000) as u32),
        60_000,
        0.0,
    );

    let params = params();
    let stats = MinerStats::new();
    let options = AssemblerOptions::default();
    let mut stake_reward = 0;
    let mut template = BlockAssembler::new(&params, &options, &chain, &pool, &stats)
        .create_new_block(&[], true, Some(&mut stake_reward), true)
        .expect("template");

    let in_template: Vec<Txid> = template.block.vtx[1..].iter().map(|tx| tx.txid()).collect();
    assert!(in_template.contains(&future));

    let wallet = TestWallet;
    let mut last_search_time = NOW - 30;
    let signed = sign_block(
        &chain,
        &params,
        &wallet,
        &mut template.block,
        stake_reward,
        &mut last_search_time,
        &stats,
    );
    assert!(signed);
    assert!(template.block.is_proof_of_stake());
    assert!(!template.block.block_sig.is_empty());

    let final_txids: Vec<Txid> = template.block.vtx.iter().map(|tx| tx.txid()).collect();
    assert!(!final_txids.contains(&future));
    assert!(final_txids.contains(&current));
    // Coinbase time was rewritten to the coinstake time.
    assert_eq!(template.block.vtx[0].time, template.block.vtx[1].time);

    assert!(check_stake(&chain, &template.block).is_ok());
    assert_eq!(chain.accepted_count(), 1);
}

#[test]
fn check_work_rejects_stale_template() {
    let chain = TestChain::new();
    let pool = Mempool::new();
    let mut template = build_pow(&chain, &pool, &AssemblerOptions::default());

    // Grind the nonce until the regtest target is met.
    let params = params();
    loop {
        if check_work(&chain, &params, &template.block).is_ok() {
            break;
        }
        template.block.header.nonce += 1;
        if template.block.header.nonce > 100_000 {
            panic!("no regtest solution found");
        }
    }
    assert_eq!(chain.accepted_count(), 1);

    chain.advance_tip();
    let result = check_work(&chain, &params, &template.block);
    assert_eq!(result, Err(MinerError::StaleTemplate));
    // The stale block was not handed to validation again.
    assert_eq!(chain.accepted_count(), 1);
}

#[test]
fn extra_nonce_rewrites_coinbase_and_merkle_root() {
    let chain = TestChain::new();
    let pool = Mempool::new();
    let mut template = build_pow(&chain, &pool, &AssemblerOptions::default());
    let params = params();

    let mut extra_nonce = ExtraNonce::default();
    let tip = chain.tip();
    increment_extra_nonce(
        &mut template.block,
        &tip,
        &params.coinbase_flags,
        &mut extra_nonce,
    );
    assert_eq!(extra_nonce.value(), 1);
    let root_one = template.block.header.merkle_root;

    increment_extra_nonce(
        &mut template.block,
        &tip,
        &params.coinbase_flags,
        &mut extra_nonce,
    );
    assert_eq!(extra_nonce.value(), 2);
    assert_ne!(template.block.header.merkle_root, root_one);
    assert!(template.block.vtx[0].vin[0]
        .script_sig
        .windows(params.coinbase_flags.len())
        .any(|window| window == params.coinbase_flags.as_slice()));

    // A new previous block resets the counter.
    template.block.header.prev_block = [0x01; 32];
    increment_extra_nonce(
        &mut template.block,
        &tip,
        &params.coinbase_flags,
        &mut extra_nonce,
    );
    assert_eq!(extra_nonce.value(), 1);
}

struct TestNetwork;

impl emberd_miner::NetworkView for TestNetwork {
    fn peer_count(&self) -> usize {
        1
    }

    fn is_initial_block_download(&self) -> bool {
        false
    }
}

#[test]
fn staker_loop_stakes_a_block_and_honors_cancellation() {
    use emberd_miner::{run_staker, CancelToken, StakerConfig};
    use std::time::Duration;

    let chain = TestChain::with_advancing_clock();
    let pool = Mutex::new(Mempool::new());
    let params = params();
    let options = AssemblerOptions::default();
    let stats = MinerStats::new();
    stats.set_staking(true);
    let cancel = CancelToken::new();
    let config = StakerConfig {
        require_peers: false,
        miner_sleep_ms: 1,
    };

    std::thread::scope(|scope| {
        let worker = scope.spawn(|| {
            run_staker(
                &params, &options, &chain, &TestNetwork, &TestWallet, &pool, &stats, &cancel,
                &config,
            );
        });
        for _ in 0..500 {
            if chain.accepted_count() >= 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cancel.cancel();
        worker.join().expect("staker thread");
    });

    assert!(chain.accepted_count() >= 1);
    assert!(stats.last_block_weight() >= 4_000);
}

#[test]
fn staker_loop_exits_when_keypool_runs_dry() {
    use emberd_miner::{run_staker, CancelToken, StakerConfig};

    struct DryWallet;

    impl StakingWallet for DryWallet {
        fn is_locked(&self) -> bool {
            false
        }

        fn reserve_script(&self) -> Option<Vec<u8>> {
            Some(pay_script())
        }

        fn keypool_empty(&self) -> bool {
            true
        }

        fn create_coin_stake(
            &self,
            _bits: u32,
            _search_interval: i64,
            _tx_time: u32,
            _stake_reward: Amount,
        ) -> Option<Transaction> {
            None
        }

        fn sign_block_hash(&self, _hash: &Hash256) -> Option<Vec<u8>> {
            None
        }
    }

    let chain = TestChain::with_advancing_clock();
    let pool = Mutex::new(Mempool::new());
    let params = params();
    let options = AssemblerOptions::default();
    let stats = MinerStats::new();
    stats.set_staking(true);
    let cancel = CancelToken::new();
    let config = StakerConfig {
        require_peers: false,
        miner_sleep_ms: 1,
    };

    // Returns on its own: the empty keypool ends the thread without any
    // cancellation.
    run_staker(
        &params, &options, &chain, &TestNetwork, &DryWallet, &pool, &stats, &cancel, &config,
    );
    assert_eq!(chain.accepted_count(), 0);
}

#[test]
fn stats_published_after_build() {
    let chain = TestChain::new();
    let mut pool = Mempool::new();
    insert_with_fee(&mut pool, make_tx(1, &[], 20, 0), 50_000, 0.0);

    let params = params();
    let stats = MinerStats::new();
    let options = AssemblerOptions::default();
    BlockAssembler::new(&params, &options, &chain, &pool, &stats)
        .create_new_block(&pay_script(), false, None, true)
        .expect("template");

    assert_eq!(stats.last_block_tx(), 1);
    assert!(stats.last_block_weight() > 4_000);
    assert!(stats.last_block_size() > 1_000);
}
