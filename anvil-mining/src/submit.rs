//! Turning a miner's solution back into a block.
//!
//! A getwork submission only carries a header. The transaction root in that
//! header is the key of the [`TemplateCacheEntry`] issued for it; the entry
//! holds everything needed to rebuild the exact block the miner hashed. A
//! root with no entry means the work expired (usually a new tip arrived) and
//! is reported as [`SubmitOutcome::NotFound`], not as an error.

use std::sync::Arc;

use bitcoin::Block;
use bitcoin::block::Header;

use crate::auxpow::commitment::{commitment_script, extract_commitment};
use crate::error::{MiningError, Result};
use crate::node::{BlockSubmitter, Verdict};
use crate::template::{SolvedBlock, TemplateCacheEntry, TemplateSlot};
use crate::tracing::prelude::*;
use crate::work::WorkBuffer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected(String),
    NotFound,
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// How the coinbase script is restored for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinbaseRestore {
    /// Use the script recorded at issue time.
    Recorded,

    /// Rebuild the merged-work script from the recorded commitment and
    /// extra nonce, dropping the marker while parsing.
    ReembedCommitment,
}

/// A decoded submission matched to the work it answers.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Header fields as submitted.
    pub header: Header,
    pub entry: TemplateCacheEntry,
}

impl Submission {
    /// Decode `data_hex` and look up the work it was issued for.
    pub fn find(slot: &TemplateSlot, data_hex: &str) -> Result<Option<Self>> {
        let header = WorkBuffer::decode_hex(data_hex)?;
        let Some(entry) = slot.lookup(&header.merkle_root) else {
            debug!(context = %slot.kind(), root = %header.merkle_root, "Submission for unknown work");
            return Ok(None);
        };
        Ok(Some(Self { header, entry }))
    }

    /// Whether the work is still issued by `slot`.
    ///
    /// False once a new tip has dropped the entry or a later poll has
    /// replaced it with work from another candidate.
    pub fn is_current(&self, slot: &TemplateSlot) -> bool {
        slot.lookup(&self.header.merkle_root)
            .is_some_and(|entry| Arc::ptr_eq(&entry.candidate, &self.entry.candidate))
    }

    /// Rebuild the mined block: the issued header with the submitted time
    /// and nonce, over the restored coinbase.
    ///
    /// The shared candidate is never modified.
    pub fn reconstruct(&self, restore: CoinbaseRestore) -> Result<Block> {
        let script = match restore {
            CoinbaseRestore::Recorded => self.entry.coinbase_script.clone(),
            CoinbaseRestore::ReembedCommitment => {
                let commitment = extract_commitment(&self.entry.coinbase_script)?;
                let extra_nonce = self.entry.extra_nonce.ok_or_else(|| {
                    MiningError::MalformedCommitmentScript("no extra nonce recorded".into())
                })?;
                commitment_script(self.entry.header.bits, extra_nonce, &commitment)
            }
        };

        let rewrite = self.entry.candidate.rewrite_coinbase(script);
        let header = Header {
            time: self.header.time,
            nonce: self.header.nonce,
            merkle_root: rewrite.merkle_root,
            ..self.entry.header
        };
        Ok(self.entry.candidate.assemble(header, rewrite.coinbase))
    }
}

/// Decode, match, rebuild and forward a getwork-style submission.
pub fn submit_work(
    slot: &TemplateSlot,
    data_hex: &str,
    restore: CoinbaseRestore,
    submitter: &dyn BlockSubmitter,
) -> Result<SubmitOutcome> {
    let Some(submission) = Submission::find(slot, data_hex)? else {
        return Ok(SubmitOutcome::NotFound);
    };
    let block = submission.reconstruct(restore)?;
    if block.header.merkle_root != submission.header.merkle_root {
        warn!(context = %slot.kind(), "Rebuilt coinbase does not match the issued root");
        return Ok(SubmitOutcome::Rejected("merkle root mismatch".into()));
    }
    if !submission.is_current(slot) {
        debug!(
            context = %slot.kind(),
            root = %submission.header.merkle_root,
            "Work expired while rebuilding"
        );
        return Ok(SubmitOutcome::NotFound);
    }
    Ok(forward(submitter, &SolvedBlock::new(block)))
}

/// Hand a solved block to consensus and report its verdict unchanged.
pub fn forward(submitter: &dyn BlockSubmitter, block: &SolvedBlock) -> SubmitOutcome {
    let hash = block.block_hash();
    match submitter.process_block(block) {
        Verdict::Accepted => {
            info!(%hash, "Block accepted");
            SubmitOutcome::Accepted
        }
        Verdict::Rejected(reason) => {
            info!(%hash, %reason, "Block rejected");
            SubmitOutcome::Rejected(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auxpow::embed_commitment;
    use crate::template::{CandidateBlock, ContextKind, Observation};
    use crate::test_support::{
        MockSubmitter, assembled_block, candidate_with_txs, sample_commitment,
    };
    use crate::work::coinbase::solo_script;
    use bitcoin::BlockHash;
    use bitcoin::hashes::Hash;
    use std::time::Duration;

    struct Issued {
        slot: TemplateSlot,
        entry: TemplateCacheEntry,
    }

    fn issue_solo() -> Issued {
        let slot = TemplateSlot::new(ContextKind::Work, Duration::from_secs(60));
        let candidate = Arc::new(candidate_with_txs(4));
        let script = solo_script(candidate.height(), 3, b"");
        let rewrite = candidate.rewrite_coinbase(script.clone());
        let header = candidate.issue_header(1_700_000_100, rewrite.merkle_root);
        let entry = TemplateCacheEntry {
            candidate,
            header,
            coinbase_script: script,
            extra_nonce: None,
        };
        Issued { slot, entry }
    }

    fn issue_merged() -> Issued {
        let slot = TemplateSlot::new(ContextKind::MergedWork, Duration::from_secs(60));
        let candidate = Arc::new(candidate_with_txs(2));
        let rewrite = embed_commitment(&candidate, 5, &sample_commitment());
        let header = candidate.issue_header(1_700_000_100, rewrite.merkle_root);
        let entry = TemplateCacheEntry {
            coinbase_script: rewrite.coinbase.input[0].script_sig.clone(),
            candidate,
            header,
            extra_nonce: Some(5),
        };
        Issued { slot, entry }
    }

    /// Register the entry in its slot the way a poll would.
    fn publish(issued: &Issued) {
        // Entry tables accept entries for their current tip only; building
        // once points the table at the candidate's tip.
        let candidate = Arc::clone(&issued.entry.candidate);
        let tip = *candidate.tip();
        issued
            .slot
            .acquire(
                || Observation {
                    tip,
                    transactions_updated: 0,
                    now: 0,
                    aux: None,
                },
                |_| Ok((*candidate).clone()),
            )
            .unwrap();
        assert!(
            issued
                .slot
                .publish(issued.entry.header.merkle_root, issued.entry.clone())
        );
    }

    fn solved_data(entry: &TemplateCacheEntry, time: u32, nonce: u32) -> String {
        let mut header = entry.header;
        header.time = time;
        header.nonce = nonce;
        hex::encode(WorkBuffer::encode(&header).data)
    }

    #[test]
    fn accepted_solo_submission_reaches_consensus() {
        let issued = issue_solo();
        publish(&issued);
        let submitter = MockSubmitter::accepting();

        let data = solved_data(&issued.entry, 1_700_000_123, 0xcafe);
        let outcome =
            submit_work(&issued.slot, &data, CoinbaseRestore::Recorded, &submitter).unwrap();
        assert_eq!(outcome, SubmitOutcome::Accepted);

        let blocks = submitter.received();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0].block;
        assert_eq!(block.header.time, 1_700_000_123);
        assert_eq!(block.header.nonce, 0xcafe);
        assert_eq!(block.header.merkle_root, issued.entry.header.merkle_root);
        assert_eq!(block.compute_merkle_root(), Some(block.header.merkle_root));
        assert_eq!(
            block.txdata[0].input[0].script_sig,
            issued.entry.coinbase_script
        );
    }

    #[test]
    fn rejection_reason_is_passed_through() {
        let issued = issue_solo();
        publish(&issued);
        let submitter = MockSubmitter::rejecting("high-hash");

        let data = solved_data(&issued.entry, 1_700_000_123, 1);
        let outcome =
            submit_work(&issued.slot, &data, CoinbaseRestore::Recorded, &submitter).unwrap();
        assert_eq!(outcome, SubmitOutcome::Rejected("high-hash".into()));
    }

    #[test]
    fn unknown_root_is_not_found() {
        let issued = issue_solo();
        let submitter = MockSubmitter::accepting();

        let data = solved_data(&issued.entry, 1, 1);
        let outcome =
            submit_work(&issued.slot, &data, CoinbaseRestore::Recorded, &submitter).unwrap();
        assert_eq!(outcome, SubmitOutcome::NotFound);
        assert!(submitter.received().is_empty());
    }

    #[test]
    fn malformed_data_is_an_error() {
        let issued = issue_solo();
        let submitter = MockSubmitter::accepting();
        let err = submit_work(&issued.slot, "abcd", CoinbaseRestore::Recorded, &submitter)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidParameter);
    }

    #[test]
    fn merged_submission_reembeds_commitment() {
        let issued = issue_merged();
        publish(&issued);
        let submitter = MockSubmitter::accepting();

        let data = solved_data(&issued.entry, 1_700_000_200, 77);
        let outcome = submit_work(
            &issued.slot,
            &data,
            CoinbaseRestore::ReembedCommitment,
            &submitter,
        )
        .unwrap();
        assert_eq!(outcome, SubmitOutcome::Accepted);

        let block = &submitter.received()[0].block;
        assert_eq!(block.header.merkle_root, issued.entry.header.merkle_root);
        assert_eq!(
            extract_commitment(&block.txdata[0].input[0].script_sig),
            Ok(sample_commitment())
        );
    }

    #[test]
    fn submission_expires_with_its_tip() {
        let issued = issue_solo();
        publish(&issued);
        let data = solved_data(&issued.entry, 1_700_000_123, 1);
        let submission = Submission::find(&issued.slot, &data).unwrap().unwrap();
        assert!(submission.is_current(&issued.slot));

        let mut next = *issued.entry.candidate.tip();
        next.hash = BlockHash::from_byte_array([0xee; 32]);
        next.height += 1;
        issued
            .slot
            .acquire(
                || Observation {
                    tip: next,
                    transactions_updated: 0,
                    now: 0,
                    aux: None,
                },
                |_| CandidateBlock::new(assembled_block(&next, 2), next),
            )
            .unwrap();

        assert!(!submission.is_current(&issued.slot));
        let submitter = MockSubmitter::accepting();
        let outcome =
            submit_work(&issued.slot, &data, CoinbaseRestore::Recorded, &submitter).unwrap();
        assert_eq!(outcome, SubmitOutcome::NotFound);
        assert!(submitter.received().is_empty());
    }

    #[test]
    fn reembed_fails_on_solo_script() {
        let issued = issue_solo();
        let submission = Submission {
            header: issued.entry.header,
            entry: issued.entry.clone(),
        };
        let err = submission
            .reconstruct(CoinbaseRestore::ReembedCommitment)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedCommitmentScript);
    }

    #[test]
    fn reconstruction_does_not_mutate_candidate() {
        let issued = issue_solo();
        let before = (*issued.entry.candidate).clone();
        let submission = Submission {
            header: issued.entry.header,
            entry: issued.entry.clone(),
        };
        submission.reconstruct(CoinbaseRestore::Recorded).unwrap();
        assert_eq!(*issued.entry.candidate, before);
    }
}
