//! Shared fixtures and test doubles for the node interfaces.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::pow::CompactTarget;
use bitcoin::transaction::Version as TxVersion;
use bitcoin::{
    Amount, Block, BlockHash, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxMerkleNode,
    TxOut, Txid, Witness, absolute,
};
use parking_lot::Mutex;

use crate::auxpow::AuxChainCommitment;
use crate::merkle::Digest;
use crate::node::{
    AssembledBlock, AssemblyError, BlockAssembler, BlockSubmitter, ChainState, ChainTip, Verdict,
};
use crate::template::{CandidateBlock, SolvedBlock};
use crate::work::coinbase::solo_script;

pub const GENESIS_TIME: u32 = 1_700_000_000;

/// Regtest-easy bits so any header is a plausible solution.
pub const EASY_BITS: u32 = 0x207f_ffff;

pub fn tip() -> ChainTip {
    ChainTip {
        hash: BlockHash::from_byte_array([0x42; 32]),
        height: 100,
        median_time_past: GENESIS_TIME,
        bits: CompactTarget::from_consensus(EASY_BITS),
    }
}

pub fn sample_commitment() -> AuxChainCommitment {
    AuxChainCommitment {
        root: Digest::hash(b"aux chain root"),
        size: 4,
        nonce: 11,
    }
}

fn coinbase(height: u32) -> Transaction {
    Transaction {
        version: TxVersion::ONE,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: solo_script(height, 0, b""),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(50 * 100_000_000),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

fn spend(previous_output: OutPoint, value: u64) -> Transaction {
    Transaction {
        version: TxVersion::ONE,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

/// A block of `tx_count` transactions (coinbase included) on `tip`.
///
/// Every even-indexed transaction after the coinbase spends the one before
/// it, so templates have in-block dependencies to report.
pub fn assembled_block(tip: &ChainTip, tx_count: usize) -> AssembledBlock {
    let mut txdata = vec![coinbase(tip.height + 1)];
    for i in 1..tx_count {
        let previous_output = if i % 2 == 0 {
            OutPoint {
                txid: txdata[i - 1].compute_txid(),
                vout: 0,
            }
        } else {
            OutPoint {
                txid: Txid::from_byte_array([i as u8; 32]),
                vout: 0,
            }
        };
        txdata.push(spend(previous_output, 10_000 - i as u64));
    }

    let mut block = Block {
        header: Header {
            version: Version::from_consensus(2),
            prev_blockhash: tip.hash,
            merkle_root: TxMerkleNode::all_zeros(),
            time: tip.median_time_past + 1,
            bits: tip.bits,
            nonce: 0,
        },
        txdata,
    };
    if let Some(root) = block.compute_merkle_root() {
        block.header.merkle_root = root;
    }

    let fees = (0..tx_count)
        .map(|i| Amount::from_sat(if i == 0 { 0 } else { 1_000 * i as u64 }))
        .collect();
    let sigops = (0..tx_count).map(|i| if i == 0 { 0 } else { 1 }).collect();

    AssembledBlock {
        block,
        fees,
        sigops,
    }
}

pub fn candidate_with_txs(tx_count: usize) -> CandidateBlock {
    CandidateBlock::new(assembled_block(&tip(), tx_count), tip()).unwrap()
}

/// Node state the tests can move around.
#[derive(Debug, Clone)]
pub struct ChainView {
    pub tip: ChainTip,
    pub transactions_updated: u64,
    pub connections: usize,
    pub initial_download: bool,
    pub adjusted_time: u32,
    pub now: u64,
    pub mempool_size: usize,
    pub testnet: bool,
}

#[derive(Debug)]
pub struct MockChain {
    view: Mutex<ChainView>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            view: Mutex::new(ChainView {
                tip: tip(),
                transactions_updated: 1,
                connections: 8,
                initial_download: false,
                adjusted_time: GENESIS_TIME + 600,
                now: u64::from(GENESIS_TIME) + 600,
                mempool_size: 0,
                testnet: false,
            }),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut ChainView)) {
        f(&mut self.view.lock());
    }

    /// Advance the clocks by `secs`.
    pub fn tick(&self, secs: u32) {
        self.update(|view| {
            view.adjusted_time += secs;
            view.now += u64::from(secs);
        });
    }

    /// Connect a new block on top of the current tip.
    pub fn advance_tip(&self, hash: BlockHash) {
        self.update(|view| {
            view.tip.hash = hash;
            view.tip.height += 1;
            view.tip.median_time_past += 1;
            view.transactions_updated += 1;
        });
    }
}

impl ChainState for MockChain {
    fn tip(&self) -> ChainTip {
        self.view.lock().tip
    }

    fn transactions_updated(&self) -> u64 {
        self.view.lock().transactions_updated
    }

    fn connection_count(&self) -> usize {
        self.view.lock().connections
    }

    fn is_initial_block_download(&self) -> bool {
        self.view.lock().initial_download
    }

    fn adjusted_time(&self) -> u32 {
        self.view.lock().adjusted_time
    }

    fn now(&self) -> u64 {
        self.view.lock().now
    }

    fn mempool_size(&self) -> usize {
        self.view.lock().mempool_size
    }

    fn is_testnet(&self) -> bool {
        self.view.lock().testnet
    }
}

#[derive(Debug)]
pub struct MockAssembler {
    tx_count: usize,
    delay: Duration,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl MockAssembler {
    pub fn new(tx_count: usize) -> Self {
        Self {
            tx_count,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn slow(tx_count: usize, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(tx_count)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl BlockAssembler for MockAssembler {
    fn create_new_block(&self, tip: &ChainTip) -> Result<AssembledBlock, AssemblyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AssemblyError("out of memory".into()));
        }
        Ok(assembled_block(tip, self.tx_count))
    }
}

#[derive(Debug)]
pub struct MockSubmitter {
    verdict: Verdict,
    received: Mutex<Vec<SolvedBlock>>,
}

impl MockSubmitter {
    pub fn accepting() -> Self {
        Self {
            verdict: Verdict::Accepted,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            verdict: Verdict::Rejected(reason.to_owned()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<SolvedBlock> {
        self.received.lock().clone()
    }
}

impl BlockSubmitter for MockSubmitter {
    fn process_block(&self, block: &SolvedBlock) -> Verdict {
        self.received.lock().push(block.clone());
        self.verdict.clone()
    }
}
