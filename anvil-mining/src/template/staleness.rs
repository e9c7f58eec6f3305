//! When a cached candidate must be rebuilt.
//!
//! # Rule
//!
//! ```text
//!                  tip changed / aux changed
//!           ┌──────────────────────────────────────┐
//!           │                                      ▼
//!  Ready(snapshot) ───── pool counter moved ───► Stale
//!           │            and debounce elapsed      │
//!           │                                      │
//!           └──── otherwise: Fresh (reuse) ◄───────┘ after rebuild
//! ```
//!
//! A tip change always wins: it also invalidates every entry issued
//! against the old tip. A pool change alone is debounced so busy pools do
//! not force a rebuild on every poll.

use std::time::Duration;

use bitcoin::BlockHash;

use crate::auxpow::AuxChainCommitment;
use crate::node::{ChainState, ChainTip};

/// The node as seen by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub tip: ChainTip,
    pub transactions_updated: u64,

    /// Local clock, unix seconds.
    pub now: u64,

    /// Commitment requested by a merged-work poll.
    pub aux: Option<AuxChainCommitment>,
}

impl Observation {
    pub fn of(chain: &dyn ChainState) -> Self {
        Self {
            tip: chain.tip(),
            transactions_updated: chain.transactions_updated(),
            now: chain.now(),
            aux: None,
        }
    }

    pub fn with_aux(mut self, aux: AuxChainCommitment) -> Self {
        self.aux = Some(aux);
        self
    }
}

/// What was true when the current candidate was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTipSnapshot {
    pub tip: BlockHash,
    pub transactions_updated: u64,
    pub built_at: u64,
    pub aux: Option<AuxChainCommitment>,
}

/// Outcome of comparing a snapshot with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    TipChanged,
    AuxChanged,
    PoolUpdated,
}

impl Staleness {
    pub fn is_stale(self) -> bool {
        self != Self::Fresh
    }
}

impl ChainTipSnapshot {
    pub fn capture(observation: &Observation) -> Self {
        Self {
            tip: observation.tip.hash,
            transactions_updated: observation.transactions_updated,
            built_at: observation.now,
            aux: observation.aux,
        }
    }

    pub fn assess(&self, observation: &Observation, debounce: Duration) -> Staleness {
        if self.tip != observation.tip.hash {
            return Staleness::TipChanged;
        }
        if self.aux != observation.aux {
            return Staleness::AuxChanged;
        }
        let elapsed = observation.now.saturating_sub(self.built_at);
        if self.transactions_updated != observation.transactions_updated
            && elapsed >= debounce.as_secs()
        {
            return Staleness::PoolUpdated;
        }
        Staleness::Fresh
    }
}
