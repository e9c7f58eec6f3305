//! Mining RPC payloads.
//!
//! Field names follow the legacy wire format, so several are not snake case.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MiningError, Result};
use crate::work::WorkBuffer;

/// Work for a legacy getwork miner, every field hex encoded.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkResponse {
    pub midstate: String,
    pub data: String,
    pub hash1: String,
    pub target: String,
}

impl From<&WorkBuffer> for WorkResponse {
    fn from(work: &WorkBuffer) -> Self {
        Self {
            midstate: hex::encode(work.midstate),
            data: hex::encode(work.data),
            hash1: hex::encode(work.hash1),
            target: hex::encode(work.target),
        }
    }
}

/// A `getworkaux` call, decoded from its positional arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuxWorkRequest {
    /// `getworkaux <aux>`: issue merged work committing to `aux`.
    Issue { aux: String },

    /// `getworkaux "" <data>`: report the commitment and block hash.
    Inspect { data: String },

    /// `getworkaux submit <data>`: submit a solution.
    Submit { data: String },

    /// `getworkaux <mode> <data> <chain index> <branch...>`: build the
    /// auxiliary proof for a solved block.
    Prove {
        data: String,
        chain_index: u32,
        branch: Vec<String>,
    },
}

impl AuxWorkRequest {
    pub fn from_params(params: &[Value]) -> Result<Self> {
        let [first, rest @ ..] = params else {
            return Err(invalid("getworkaux needs at least one argument"));
        };
        let first = as_str(first, "aux")?;
        let [data, proof @ ..] = rest else {
            return Ok(Self::Issue {
                aux: first.to_owned(),
            });
        };

        if !first.is_empty() && first != "submit" {
            return Err(invalid(format!("unknown mode {first:?}")));
        }
        let data = as_str(data, "data")?.to_owned();

        match proof {
            [] if first == "submit" => Ok(Self::Submit { data }),
            [] => Ok(Self::Inspect { data }),
            [index, branch @ ..] => {
                let chain_index = index
                    .as_u64()
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or_else(|| invalid("chain index must be a non-negative integer"))?;
                let branch = branch
                    .iter()
                    .map(|hash| as_str(hash, "branch hash").map(str::to_owned))
                    .collect::<Result<_>>()?;
                Ok(Self::Prove {
                    data,
                    chain_index,
                    branch,
                })
            }
        }
    }
}

fn invalid(reason: impl Into<String>) -> MiningError {
    MiningError::InvalidParameter(reason.into())
}

fn as_str<'a>(value: &'a Value, what: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("{what} must be a string")))
}

/// Commitment and block hash of a solved merged-work block.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuxInspection {
    /// Commitment payload, without the merged-mining marker.
    pub aux: String,
    pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuxProof {
    pub aux: String,
    pub auxpow: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AuxWorkReply {
    Work(WorkResponse),
    Aux(AuxInspection),
    Proof(AuxProof),
    Submitted(bool),
}

/// Block for an external merged miner to commit to.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuxBlockResponse {
    /// Target as 32 little-endian bytes.
    pub target: String,
    pub hash: String,
    pub chainid: u32,
}

/// Optional `getblocktemplate` argument.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TemplateRequest {
    pub mode: Option<String>,

    /// Accepted and ignored.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// BIP 22 block template.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlockTemplate {
    pub version: i32,
    pub previousblockhash: String,
    pub transactions: Vec<TemplateTransaction>,
    pub coinbaseaux: CoinbaseAux,
    /// Satoshis available to the coinbase, reward plus fees.
    pub coinbasevalue: u64,
    /// Target, big-endian hex.
    pub target: String,
    pub mintime: u32,
    pub mutable: Vec<String>,
    pub noncerange: String,
    pub sigoplimit: u64,
    pub sizelimit: u64,
    pub curtime: u32,
    pub bits: String,
    pub height: u32,
}

/// A non-coinbase transaction of a [`BlockTemplate`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TemplateTransaction {
    pub data: String,
    pub hash: String,
    /// Indexes of earlier template transactions this one spends, counting
    /// the coinbase as zero.
    pub depends: Vec<usize>,
    pub fee: u64,
    pub sigops: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CoinbaseAux {
    pub flags: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MiningInfo {
    pub blocks: u32,
    pub currentblocksize: u64,
    pub currentblocktx: u64,
    pub difficulty: f64,
    pub pooledtx: u64,
    pub testnet: bool,
}
