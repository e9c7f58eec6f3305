//! Candidate and solved blocks.

use bitcoin::block::Header;
use bitcoin::consensus::encode::{self, Decodable, Encodable};
use bitcoin::{Amount, Block, BlockHash, ScriptBuf, Transaction, TxMerkleNode, io};

use crate::auxpow::AuxPow;
use crate::auxpow::version::is_auxpow;
use crate::error::{MiningError, Result};
use crate::merkle::{Digest, MerkleTree};
use crate::node::{AssembledBlock, ChainTip};

/// A block being mined.
///
/// Immutable once built and shared between cache entries as an `Arc`.
/// Per-poll changes (time, nonce, coinbase script) never touch it; they are
/// carried alongside in the cache entry and applied to a copy when a
/// solution comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBlock {
    block: Block,
    tip: ChainTip,
    fees: Vec<Amount>,
    sigops: Vec<u64>,

    /// Txids of every transaction after the coinbase.
    tail: Vec<Digest>,
}

/// A coinbase with a rewritten input script and the root it yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseRewrite {
    pub coinbase: Transaction,
    pub merkle_root: TxMerkleNode,
}

impl CoinbaseRewrite {
    /// The rewritten input script.
    pub fn script_sig(&self) -> ScriptBuf {
        self.coinbase
            .input
            .first()
            .map(|input| input.script_sig.clone())
            .unwrap_or_default()
    }
}

impl CandidateBlock {
    /// Wrap an assembler result built on `tip`.
    ///
    /// A result that cannot be mined is treated like a failed assembly.
    pub fn new(assembled: AssembledBlock, tip: ChainTip) -> Result<Self> {
        let AssembledBlock {
            block,
            fees,
            sigops,
        } = assembled;
        let exhausted = |reason: &str| MiningError::ResourceExhausted(reason.to_owned());

        let coinbase = block
            .txdata
            .first()
            .ok_or_else(|| exhausted("assembled block has no transactions"))?;
        if !coinbase.is_coinbase() {
            return Err(exhausted("first transaction is not a coinbase"));
        }
        if fees.len() != block.txdata.len() || sigops.len() != block.txdata.len() {
            return Err(exhausted("fee and sigop counts do not match transactions"));
        }
        if block.header.prev_blockhash != tip.hash {
            return Err(exhausted("assembled block does not extend the requested tip"));
        }

        let tail = block.txdata[1..]
            .iter()
            .map(|tx| tx.compute_txid().to_raw_hash())
            .collect();

        Ok(Self {
            block,
            tip,
            fees,
            sigops,
            tail,
        })
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn header(&self) -> &Header {
        &self.block.header
    }

    pub fn coinbase(&self) -> &Transaction {
        &self.block.txdata[0]
    }

    /// Transactions after the coinbase.
    pub fn transactions(&self) -> &[Transaction] {
        &self.block.txdata[1..]
    }

    pub fn tip(&self) -> &ChainTip {
        &self.tip
    }

    pub fn height(&self) -> u32 {
        self.tip.height + 1
    }

    /// Fees per transaction, coinbase first.
    pub fn fees(&self) -> &[Amount] {
        &self.fees
    }

    /// Signature operations per transaction, coinbase first.
    pub fn sigops(&self) -> &[u64] {
        &self.sigops
    }

    /// Value of the coinbase's first output.
    pub fn coinbase_value(&self) -> Amount {
        self.coinbase()
            .output
            .first()
            .map_or(Amount::ZERO, |out| out.value)
    }

    /// Transaction tree with `coinbase` in place of the candidate's own.
    pub fn tx_tree(&self, coinbase: &Transaction) -> MerkleTree {
        MerkleTree::from_first(
            coinbase.compute_txid().to_raw_hash(),
            self.tail.iter().copied(),
        )
    }

    /// Copy the coinbase with `script` as its input script and recompute
    /// the transaction root over it.
    pub fn rewrite_coinbase(&self, script: ScriptBuf) -> CoinbaseRewrite {
        let mut coinbase = self.coinbase().clone();
        if let Some(input) = coinbase.input.first_mut() {
            input.script_sig = script;
        }
        let merkle_root = TxMerkleNode::from_raw_hash(self.tx_tree(&coinbase).root());
        CoinbaseRewrite {
            coinbase,
            merkle_root,
        }
    }

    /// Header to hand out for a poll at `time` against `merkle_root`.
    pub fn issue_header(&self, time: u32, merkle_root: TxMerkleNode) -> Header {
        Header {
            time,
            nonce: 0,
            merkle_root,
            ..self.block.header
        }
    }

    /// A full block from this candidate's transactions with `header` and
    /// `coinbase` swapped in.
    pub fn assemble(&self, header: Header, coinbase: Transaction) -> Block {
        let mut txdata = Vec::with_capacity(self.block.txdata.len());
        txdata.push(coinbase);
        txdata.extend_from_slice(self.transactions());
        Block { header, txdata }
    }
}

/// A block ready for consensus, with its auxiliary proof if merged-mined.
///
/// Serialized as `header | auxpow | txdata`, where the auxpow is present
/// exactly when the header version carries the AuxPow flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvedBlock {
    pub block: Block,
    pub aux_pow: Option<AuxPow>,
}

impl SolvedBlock {
    pub fn new(block: Block) -> Self {
        Self {
            block,
            aux_pow: None,
        }
    }

    pub fn with_aux_pow(block: Block, aux_pow: AuxPow) -> Self {
        Self {
            block,
            aux_pow: Some(aux_pow),
        }
    }

    pub fn block_hash(&self) -> BlockHash {
        self.block.block_hash()
    }

    pub fn from_hex(data: &str) -> Result<Self> {
        let bytes = hex::decode(data)
            .map_err(|e| MiningError::DeserializationFailed(format!("invalid hex: {e}")))?;
        encode::deserialize(&bytes).map_err(|e| MiningError::DeserializationFailed(e.to_string()))
    }

    pub fn to_hex(&self) -> String {
        encode::serialize_hex(self)
    }
}

impl Encodable for SolvedBlock {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = self.block.header.consensus_encode(w)?;
        if let Some(aux_pow) = &self.aux_pow {
            len += aux_pow.consensus_encode(w)?;
        }
        len += self.block.txdata.consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for SolvedBlock {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        let header = Header::consensus_decode(r)?;
        let aux_pow = if is_auxpow(header.version) {
            Some(AuxPow::consensus_decode(r)?)
        } else {
            None
        };
        let txdata = Vec::<Transaction>::consensus_decode(r)?;
        Ok(Self {
            block: Block { header, txdata },
            aux_pow,
        })
    }
}
