//! The mining RPC surface.
//!
//! [`MiningContext`] implements the payload side of the legacy mining
//! calls: `getwork`, `getworkaux`, `getauxblock`, `buildmerkletree`,
//! `getblocktemplate`, `submitblock` and `getmininginfo`. Argument
//! dispatch and transport belong to the host node.
//!
//! Each work-issuing call has its own [`TemplateSlot`], so a getwork miner
//! and a template client never invalidate each other's candidates.

pub mod types;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitcoin::consensus::encode;
use bitcoin::pow::Target;
use bitcoin::{BlockHash, Txid};

use crate::auxpow::version::{chain_id, merged_version};
use crate::auxpow::{AuxChainCommitment, AuxPow, build_proof, embed_commitment, extract_commitment};
use crate::config::{ConfigError, MiningConfig};
use crate::error::{MiningError, Result};
use crate::merkle::{Digest, MerkleTree};
use crate::node::{AssembledBlock, BlockAssembler, BlockSubmitter, ChainState, ChainTip};
use crate::submit::{self, CoinbaseRestore, SubmitOutcome, Submission};
use crate::template::{
    CandidateBlock, ContextKind, Observation, SolvedBlock, TemplateCacheEntry, TemplateSlot,
};
use crate::tracing::prelude::*;
use crate::types::Difficulty;
use crate::work::WorkBuffer;
use crate::work::coinbase::{aux_block_script, solo_script};

pub use types::{
    AuxBlockResponse, AuxInspection, AuxProof, AuxWorkReply, AuxWorkRequest, BlockTemplate,
    CoinbaseAux, MiningInfo, TemplateRequest, TemplateTransaction, WorkResponse,
};

const TEMPLATE_MUTABLE: [&str; 3] = ["time", "transactions", "prevblock"];
const NONCE_RANGE: &str = "00000000ffffffff";

pub struct MiningContext {
    config: MiningConfig,
    chain: Arc<dyn ChainState>,
    assembler: Arc<dyn BlockAssembler>,
    submitter: Arc<dyn BlockSubmitter>,

    work: TemplateSlot,
    merged: TemplateSlot,
    aux_blocks: TemplateSlot<BlockHash>,
    templates: TemplateSlot,

    /// Size and transaction count of the last assembled block.
    last_block_size: AtomicU64,
    last_block_tx: AtomicU64,
}

impl MiningContext {
    pub fn new(
        config: MiningConfig,
        chain: Arc<dyn ChainState>,
        assembler: Arc<dyn BlockAssembler>,
        submitter: Arc<dyn BlockSubmitter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let work_refresh = config.work_refresh();
        let template_refresh = config.template_refresh();
        Ok(Self {
            config,
            chain,
            assembler,
            submitter,
            work: TemplateSlot::new(ContextKind::Work, work_refresh),
            merged: TemplateSlot::new(ContextKind::MergedWork, work_refresh),
            aux_blocks: TemplateSlot::new(ContextKind::AuxBlock, work_refresh),
            templates: TemplateSlot::new(ContextKind::BlockTemplate, template_refresh),
            last_block_size: AtomicU64::new(0),
            last_block_tx: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    /// `getwork` with no arguments.
    pub fn get_work(&self) -> Result<WorkResponse> {
        self.ensure_ready()?;
        let candidate = self.work.acquire(|| self.observe(), |obs| self.build(obs))?.candidate;

        let extra_nonce = self
            .work
            .with_extra_nonce(|n| n.next_for_block(candidate.tip().hash));
        let script = solo_script(
            candidate.height(),
            extra_nonce,
            self.config.coinbase_flags.as_bytes(),
        );
        let rewrite = candidate.rewrite_coinbase(script);
        let header = candidate.issue_header(self.poll_time(candidate.tip()), rewrite.merkle_root);

        self.work.publish(
            rewrite.merkle_root,
            TemplateCacheEntry {
                coinbase_script: rewrite.script_sig(),
                candidate,
                header,
                extra_nonce: None,
            },
        );
        trace!(root = %rewrite.merkle_root, extra_nonce, "Issued work");
        Ok(WorkResponse::from(&WorkBuffer::encode(&header)))
    }

    /// `getwork <data>`.
    pub fn submit_work(&self, data: &str) -> Result<bool> {
        self.ensure_ready()?;
        let outcome = submit::submit_work(
            &self.work,
            data,
            CoinbaseRestore::Recorded,
            self.submitter.as_ref(),
        )?;
        Ok(outcome.is_accepted())
    }

    /// `getworkaux`.
    pub fn get_work_aux(&self, request: AuxWorkRequest) -> Result<AuxWorkReply> {
        self.ensure_ready()?;
        match request {
            AuxWorkRequest::Issue { aux } => self.issue_merged_work(&aux).map(AuxWorkReply::Work),
            AuxWorkRequest::Submit { data } => {
                let outcome = submit::submit_work(
                    &self.merged,
                    &data,
                    CoinbaseRestore::ReembedCommitment,
                    self.submitter.as_ref(),
                )?;
                Ok(AuxWorkReply::Submitted(outcome.is_accepted()))
            }
            AuxWorkRequest::Inspect { data } => {
                let Some(submission) = Submission::find(&self.merged, &data)? else {
                    return Ok(AuxWorkReply::Submitted(false));
                };
                let block = submission.reconstruct(CoinbaseRestore::ReembedCommitment)?;
                let commitment = extract_commitment(&submission.entry.coinbase_script)?;
                Ok(AuxWorkReply::Aux(AuxInspection {
                    aux: commitment.to_hex(),
                    hash: block.block_hash().to_string(),
                }))
            }
            AuxWorkRequest::Prove {
                data,
                chain_index,
                branch,
            } => {
                let branch = branch
                    .iter()
                    .map(|hash| parse_digest(hash))
                    .collect::<Result<Vec<_>>>()?;
                let Some(submission) = Submission::find(&self.merged, &data)? else {
                    return Ok(AuxWorkReply::Submitted(false));
                };
                let block = submission.reconstruct(CoinbaseRestore::ReembedCommitment)?;
                let commitment = extract_commitment(&submission.entry.coinbase_script)?;
                let proof = build_proof(&block, &commitment, chain_index, branch)?;
                debug!(parent = %proof.parent_hash, chain_index, "Built aux proof");
                Ok(AuxWorkReply::Proof(AuxProof {
                    aux: commitment.to_hex(),
                    auxpow: proof.to_hex(),
                }))
            }
        }
    }

    fn issue_merged_work(&self, aux: &str) -> Result<WorkResponse> {
        let commitment = AuxChainCommitment::from_hex(aux)?;
        let candidate = self
            .merged
            .acquire(
                || self.observe().with_aux(commitment),
                |obs| self.build(obs),
            )?
            .candidate;

        let time = self.poll_time(candidate.tip());
        let extra_nonce = self
            .merged
            .with_extra_nonce(|n| n.next_rolling(u64::from(time)));
        let rewrite = embed_commitment(&candidate, extra_nonce, &commitment);
        let header = candidate.issue_header(time, rewrite.merkle_root);

        self.merged.publish(
            rewrite.merkle_root,
            TemplateCacheEntry {
                coinbase_script: rewrite.script_sig(),
                candidate,
                header,
                extra_nonce: Some(extra_nonce),
            },
        );
        trace!(root = %rewrite.merkle_root, extra_nonce, "Issued merged work");
        Ok(WorkResponse::from(&WorkBuffer::encode(&header)))
    }

    /// `getauxblock` with no arguments.
    pub fn get_aux_block(&self) -> Result<AuxBlockResponse> {
        self.ensure_ready()?;
        let candidate = self
            .aux_blocks
            .acquire_with(
                || self.observe(),
                |obs| self.build_aux_block(obs),
                |candidate| {
                    let header = *candidate.header();
                    self.aux_blocks.publish(
                        header.block_hash(),
                        TemplateCacheEntry {
                            coinbase_script: candidate
                                .coinbase()
                                .input
                                .first()
                                .map(|input| input.script_sig.clone())
                                .unwrap_or_default(),
                            candidate: Arc::clone(candidate),
                            header,
                            extra_nonce: None,
                        },
                    );
                },
            )?
            .candidate;
        let header = *candidate.header();
        let hash = header.block_hash();

        Ok(AuxBlockResponse {
            target: hex::encode(Target::from_compact(header.bits).to_le_bytes()),
            hash: hash.to_string(),
            chainid: chain_id(header.version),
        })
    }

    /// `getauxblock <hash> <auxpow>`.
    pub fn submit_aux_block(&self, hash: &str, auxpow: &str) -> Result<bool> {
        self.ensure_ready()?;
        let hash = BlockHash::from_str(hash)
            .map_err(|e| MiningError::InvalidParameter(format!("block hash: {e}")))?;
        let aux_pow = AuxPow::from_hex(auxpow)?;

        let Some(entry) = self.aux_blocks.lookup(&hash) else {
            debug!(%hash, "Aux pow for unknown block");
            return Ok(false);
        };
        if let Err(e) = aux_pow.check(hash, self.config.chain_id) {
            info!(%hash, error = %e, "Aux pow rejected");
            return Ok(false);
        }

        let block = SolvedBlock::with_aux_pow(entry.candidate.block().clone(), aux_pow);
        Ok(submit::forward(self.submitter.as_ref(), &block).is_accepted())
    }

    /// `buildmerkletree <txid>...`: every node of the tree over `hashes`,
    /// leaves first, root last.
    pub fn build_merkle_tree(&self, hashes: &[String]) -> Result<Vec<String>> {
        let leaves = hashes
            .iter()
            .map(|hash| parse_digest(hash))
            .collect::<Result<Vec<_>>>()?;
        let tree: MerkleTree = MerkleTree::from_leaves(leaves)?;
        Ok(tree.nodes().iter().map(ToString::to_string).collect())
    }

    /// `getblocktemplate [request]`.
    pub fn get_block_template(&self, request: Option<&TemplateRequest>) -> Result<BlockTemplate> {
        if let Some(mode) = request.and_then(|r| r.mode.as_deref()) {
            if mode != "template" {
                return Err(MiningError::InvalidParameter(format!("invalid mode {mode:?}")));
            }
        }
        self.ensure_ready()?;
        let candidate = self
            .templates
            .acquire(|| self.observe(), |obs| self.build(obs))?
            .candidate;

        let header = candidate.header();
        let tip = candidate.tip();
        let mut index: HashMap<Txid, usize> = HashMap::new();
        let mut transactions = Vec::with_capacity(candidate.transactions().len());
        for (i, tx) in candidate.block().txdata.iter().enumerate() {
            let txid = tx.compute_txid();
            index.insert(txid, i);
            if i == 0 {
                continue;
            }
            let depends = tx
                .input
                .iter()
                .filter_map(|input| index.get(&input.previous_output.txid).copied())
                .collect();
            transactions.push(TemplateTransaction {
                data: encode::serialize_hex(tx),
                hash: txid.to_string(),
                depends,
                fee: candidate.fees()[i].to_sat(),
                sigops: candidate.sigops()[i],
            });
        }

        Ok(BlockTemplate {
            version: header.version.to_consensus(),
            previousblockhash: header.prev_blockhash.to_string(),
            transactions,
            coinbaseaux: CoinbaseAux {
                flags: hex::encode(self.config.coinbase_flags.as_bytes()),
            },
            coinbasevalue: candidate.coinbase_value().to_sat(),
            target: hex::encode(Target::from_compact(header.bits).to_be_bytes()),
            mintime: tip.median_time_past + 1,
            mutable: TEMPLATE_MUTABLE.iter().map(|m| (*m).to_owned()).collect(),
            noncerange: NONCE_RANGE.to_owned(),
            sigoplimit: self.config.max_block_sigops,
            sizelimit: self.config.max_block_size,
            curtime: self.poll_time(tip),
            bits: format!("{:08x}", header.bits.to_consensus()),
            height: candidate.height(),
        })
    }

    /// `submitblock <hex>`: `None` if accepted, `Some("rejected")` otherwise.
    pub fn submit_block(&self, data: &str) -> Result<Option<String>> {
        let block = SolvedBlock::from_hex(data)?;
        match submit::forward(self.submitter.as_ref(), &block) {
            SubmitOutcome::Accepted => Ok(None),
            SubmitOutcome::Rejected(_) | SubmitOutcome::NotFound => Ok(Some("rejected".into())),
        }
    }

    /// `getmininginfo`.
    pub fn get_mining_info(&self) -> MiningInfo {
        let tip = self.chain.tip();
        MiningInfo {
            blocks: tip.height,
            currentblocksize: self.last_block_size.load(Ordering::Relaxed),
            currentblocktx: self.last_block_tx.load(Ordering::Relaxed),
            difficulty: Difficulty::from_bits(tip.bits).as_f64(),
            pooledtx: self.chain.mempool_size() as u64,
            testnet: self.chain.is_testnet(),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.chain.connection_count() == 0 {
            return Err(MiningError::NotConnected);
        }
        if self.chain.is_initial_block_download() {
            return Err(MiningError::InitialSyncInProgress);
        }
        Ok(())
    }

    fn observe(&self) -> Observation {
        Observation::of(self.chain.as_ref())
    }

    /// Header time for a poll: never before the median time past.
    fn poll_time(&self, tip: &ChainTip) -> u32 {
        (tip.median_time_past + 1).max(self.chain.adjusted_time())
    }

    fn assemble(&self, tip: &ChainTip) -> Result<AssembledBlock> {
        let assembled = self
            .assembler
            .create_new_block(tip)
            .map_err(|e| MiningError::ResourceExhausted(e.to_string()))?;
        self.last_block_size
            .store(assembled.block.total_size() as u64, Ordering::Relaxed);
        self.last_block_tx
            .store(assembled.block.txdata.len() as u64, Ordering::Relaxed);
        Ok(assembled)
    }

    fn build(&self, observation: &Observation) -> Result<CandidateBlock> {
        let assembled = self.assemble(&observation.tip)?;
        debug!(
            height = observation.tip.height + 1,
            difficulty = %Difficulty::from_bits(observation.tip.bits),
            "Assembled block"
        );
        CandidateBlock::new(assembled, observation.tip)
    }

    /// An aux block is fixed at build time: its hash is what the merged
    /// miner commits to, so time, nonce and coinbase never change per poll.
    fn build_aux_block(&self, observation: &Observation) -> Result<CandidateBlock> {
        let mut assembled = self.assemble(&observation.tip)?;
        let block = &mut assembled.block;

        let bits = block.header.bits;
        if let Some(input) = block.txdata.first_mut().and_then(|tx| tx.input.first_mut()) {
            input.script_sig = aux_block_script(bits);
        }
        block.header.merkle_root = block
            .compute_merkle_root()
            .ok_or_else(|| MiningError::ResourceExhausted("assembled block is empty".into()))?;
        block.header.version = merged_version(block.header.version, self.config.chain_id);
        block.header.time = self.poll_time(&observation.tip);
        block.header.nonce = 0;

        CandidateBlock::new(assembled, observation.tip)
    }
}

/// Parse a hash written in display (reversed) hex.
fn parse_digest(hash: &str) -> Result<Digest> {
    Digest::from_str(hash).map_err(|e| MiningError::InvalidParameter(format!("hash {hash:?}: {e}")))
}
