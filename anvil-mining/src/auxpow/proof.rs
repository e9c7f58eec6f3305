//! Auxiliary proof of work.
//!
//! # Wire format
//!
//! ```text
//! coinbase tx            (consensus transaction encoding)
//! parent block hash      32
//! coinbase branch len    varint n
//! coinbase branch        n * 32
//! coinbase index         i32 LE (always 0)
//! chain branch len       varint m
//! chain branch           m * 32
//! chain index            i32 LE
//! parent header          80
//! ```

use bitcoin::block::{Block, Header};
use bitcoin::consensus::encode::{self, Decodable, Encodable, VarInt};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Transaction, io};

use super::AuxPowError;
use super::commitment::{AuxChainCommitment, find_commitment};
use super::version;
use crate::merkle::{Digest, MerkleBranch, MerkleTree};

/// Longest auxiliary-chain branch accepted, bounding the aux tree at 2^30
/// chains.
pub const MAX_CHAIN_BRANCH_LEN: usize = 30;

/// Longest branch read off the wire.
const MAX_WIRE_BRANCH_LEN: u64 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxPow {
    /// Coinbase of the parent block, carrying the commitment.
    pub coinbase_tx: Transaction,

    pub parent_hash: BlockHash,

    /// Proves `coinbase_tx` is the first transaction of the parent.
    pub coinbase_branch: MerkleBranch,

    /// Proves the auxiliary block hash is a leaf of the committed tree.
    pub chain_branch: MerkleBranch,

    pub parent_header: Header,
}

/// Assemble a proof that the auxiliary block at `chain_index` of the tree
/// committed to by `commitment` is merged-mined by `block`.
///
/// `chain_branch` is supplied by the caller, who knows the auxiliary tree;
/// the coinbase branch is computed from `block`'s transactions.
pub fn build_proof(
    block: &Block,
    commitment: &AuxChainCommitment,
    chain_index: u32,
    chain_branch: Vec<Digest>,
) -> Result<AuxPow, AuxPowError> {
    if chain_index >= commitment.size {
        return Err(AuxPowError::ChainIndexOutOfRange {
            index: chain_index,
            size: commitment.size,
        });
    }

    let tree: MerkleTree =
        MerkleTree::from_leaves(block.txdata.iter().map(|tx| tx.compute_txid().to_raw_hash()))?;
    let coinbase_branch = tree.branch_for(0)?;
    let coinbase_tx = block.txdata[0].clone();

    Ok(AuxPow {
        coinbase_tx,
        parent_hash: block.block_hash(),
        coinbase_branch: MerkleBranch::from_siblings(0, coinbase_branch.siblings()),
        chain_branch: MerkleBranch::from_siblings(chain_index, chain_branch),
        parent_header: block.header,
    })
}

impl AuxPow {
    pub fn chain_index(&self) -> u32 {
        self.chain_branch.index()
    }

    /// Check that this proof commits the parent block to `aux_hash` for the
    /// chain `chain_id`.
    ///
    /// Proof-of-work against the auxiliary target is left to consensus.
    pub fn check(&self, aux_hash: BlockHash, chain_id: u32) -> Result<(), AuxPowError> {
        if self.coinbase_branch.index() != 0 {
            return Err(AuxPowError::Check("coinbase is not the first transaction"));
        }
        if version::is_auxpow(self.parent_header.version)
            && version::chain_id(self.parent_header.version) == chain_id
        {
            return Err(AuxPowError::Check("parent block has our chain id"));
        }
        if self.chain_branch.len() > MAX_CHAIN_BRANCH_LEN {
            return Err(AuxPowError::Check("chain branch too long"));
        }

        let txid = self.coinbase_tx.compute_txid().to_raw_hash();
        if self.coinbase_branch.root_from(txid) != self.parent_header.merkle_root.to_raw_hash() {
            return Err(AuxPowError::Check(
                "coinbase branch does not reach the parent merkle root",
            ));
        }

        let script = &self
            .coinbase_tx
            .input
            .first()
            .ok_or(AuxPowError::Check("coinbase has no input"))?
            .script_sig;
        let commitment = find_commitment(script)?;

        let chain_root = self.chain_branch.root_from(aux_hash.to_raw_hash());
        if commitment.root != display_order(chain_root) {
            return Err(AuxPowError::Check("aux root is not committed in the coinbase"));
        }
        if u64::from(commitment.size) != 1u64 << self.chain_branch.len() {
            return Err(AuxPowError::Check("chain branch length does not match tree size"));
        }
        if commitment.expected_index(chain_id) != Some(self.chain_index()) {
            return Err(AuxPowError::Check("wrong chain index"));
        }
        Ok(())
    }

    pub fn to_hex(&self) -> String {
        encode::serialize_hex(self)
    }

    pub fn from_hex(data: &str) -> Result<Self, AuxPowError> {
        let bytes = hex::decode(data)?;
        encode::deserialize(&bytes).map_err(|e| AuxPowError::Decode(e.to_string()))
    }
}

/// A digest with its bytes reversed, as merged-mining pools write roots.
pub fn display_order(digest: Digest) -> Digest {
    let mut bytes = digest.to_byte_array();
    bytes.reverse();
    Digest::from_byte_array(bytes)
}

impl Encodable for AuxPow {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = self.coinbase_tx.consensus_encode(w)?;
        len += self.parent_hash.consensus_encode(w)?;
        len += encode_branch(&self.coinbase_branch, w)?;
        len += encode_branch(&self.chain_branch, w)?;
        len += self.parent_header.consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for AuxPow {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(Self {
            coinbase_tx: Transaction::consensus_decode(r)?,
            parent_hash: BlockHash::consensus_decode(r)?,
            coinbase_branch: decode_branch(r)?,
            chain_branch: decode_branch(r)?,
            parent_header: Header::consensus_decode(r)?,
        })
    }
}

fn encode_branch<W: io::Write + ?Sized>(
    branch: &MerkleBranch,
    w: &mut W,
) -> Result<usize, io::Error> {
    let mut len = VarInt(branch.len() as u64).consensus_encode(w)?;
    for sibling in branch.siblings() {
        len += sibling.to_byte_array().consensus_encode(w)?;
    }
    len += (branch.index() as i32).consensus_encode(w)?;
    Ok(len)
}

fn decode_branch<R: io::Read + ?Sized>(r: &mut R) -> Result<MerkleBranch, encode::Error> {
    let VarInt(count) = VarInt::consensus_decode(r)?;
    if count > MAX_WIRE_BRANCH_LEN {
        return Err(encode::Error::ParseFailed("merkle branch too long"));
    }
    let mut siblings = Vec::with_capacity(count as usize);
    for _ in 0..count {
        siblings.push(Digest::from_byte_array(<[u8; 32]>::consensus_decode(r)?));
    }
    let index = u32::try_from(i32::consensus_decode(r)?)
        .map_err(|_| encode::Error::ParseFailed("negative merkle index"))?;
    Ok(MerkleBranch::from_siblings(index, siblings))
}
