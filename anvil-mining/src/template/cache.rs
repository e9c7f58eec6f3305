//! Per-context candidate cache.
//!
//! # State Machine
//!
//! ```text
//!            acquire()                 build ok
//!  Empty ──────────────► Building ─────────────────► Ready
//!    ▲                    │   ▲                        │
//!    │   build failed     │   │   stale on acquire()   │
//!    └────────────────────┘   └────────────────────────┘
//! ```
//!
//! - **Empty:** nothing usable. The next poll builds.
//! - **Building:** one poller is running the assembler with no lock held.
//!   Every other poller of the same context waits for it to finish and
//!   then re-evaluates, so at most one build per context is in flight.
//! - **Ready:** a candidate and the snapshot it was built against. Polls
//!   reuse it until [`ChainTipSnapshot::assess`] reports it stale.
//!
//! The previous candidate is forgotten when a build starts, so a failed
//! or panicking build leaves the slot `Empty` rather than half-published.
//!
//! Issued work is remembered in a separate entry table so submissions can
//! be matched back to their candidate. The table belongs to one tip at a
//! time: moving to a new tip drops every entry at once, and an entry
//! published for any other tip is discarded.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::block::Header;
use bitcoin::{BlockHash, ScriptBuf, TxMerkleNode};
use parking_lot::{Condvar, Mutex, RwLock};
use strum::{AsRefStr, Display};

use super::candidate::CandidateBlock;
use super::staleness::{ChainTipSnapshot, Observation, Staleness};
use crate::error::Result;
use crate::tracing::prelude::*;
use crate::work::ExtraNonce;

/// The independent mining contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ContextKind {
    Work,
    MergedWork,
    AuxBlock,
    BlockTemplate,
}

/// Observable phase of a [`TemplateSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Building,
    Ready,
}

/// Work issued to a miner, kept to reverse its submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateCacheEntry {
    pub candidate: Arc<CandidateBlock>,

    /// Header as issued (time set, nonce zero).
    pub header: Header,

    /// Coinbase input script as issued.
    pub coinbase_script: ScriptBuf,

    /// Extra nonce folded into a merged-work coinbase.
    pub extra_nonce: Option<u32>,
}

impl TemplateCacheEntry {
    pub fn tip(&self) -> BlockHash {
        self.candidate.tip().hash
    }
}

/// Result of [`TemplateSlot::acquire`].
#[derive(Debug, Clone)]
pub struct Acquired {
    pub candidate: Arc<CandidateBlock>,

    /// True when this call built the candidate.
    pub rebuilt: bool,
}

#[derive(Debug)]
struct Current {
    candidate: Arc<CandidateBlock>,
    snapshot: ChainTipSnapshot,
}

#[derive(Debug)]
struct SlotState {
    phase: Phase,
    current: Option<Current>,
}

#[derive(Debug)]
struct EntryTable<K> {
    tip: Option<BlockHash>,
    entries: HashMap<K, TemplateCacheEntry>,
}

/// Cache for one [`ContextKind`].
///
/// `K` keys issued entries: the transaction root for work contexts, the
/// block hash for auxiliary blocks.
#[derive(Debug)]
pub struct TemplateSlot<K = TxMerkleNode> {
    kind: ContextKind,
    debounce: Duration,
    state: Mutex<SlotState>,
    built: Condvar,
    extra_nonce: Mutex<ExtraNonce>,
    entries: RwLock<EntryTable<K>>,
}

impl<K: Eq + Hash> TemplateSlot<K> {
    pub fn new(kind: ContextKind, debounce: Duration) -> Self {
        Self {
            kind,
            debounce,
            state: Mutex::new(SlotState {
                phase: Phase::Empty,
                current: None,
            }),
            built: Condvar::new(),
            extra_nonce: Mutex::new(ExtraNonce::new()),
            entries: RwLock::new(EntryTable {
                tip: None,
                entries: HashMap::new(),
            }),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Return a fresh candidate, building one if needed.
    ///
    /// `observe` is sampled under the slot lock, again after every wait, so
    /// the staleness decision always uses the node's latest state. `build`
    /// runs without any lock held.
    pub fn acquire<O, B>(&self, observe: O, build: B) -> Result<Acquired>
    where
        O: Fn() -> Observation,
        B: FnOnce(&Observation) -> Result<CandidateBlock>,
    {
        self.acquire_with(observe, build, |_| {})
    }

    /// [`acquire`](Self::acquire), running `on_built` on a new candidate
    /// while the slot is still `Building`.
    ///
    /// Entries published from `on_built` are visible before any other
    /// poller can be handed the candidate.
    pub fn acquire_with<O, B, P>(&self, observe: O, build: B, on_built: P) -> Result<Acquired>
    where
        O: Fn() -> Observation,
        B: FnOnce(&Observation) -> Result<CandidateBlock>,
        P: FnOnce(&Arc<CandidateBlock>),
    {
        let mut state = self.state.lock();
        let observation = loop {
            let observation = observe();
            if state.phase == Phase::Building {
                trace!(context = %self.kind, "Waiting for in-flight build");
                self.built.wait(&mut state);
                continue;
            }
            if let Some(current) = &state.current {
                match current.snapshot.assess(&observation, self.debounce) {
                    Staleness::Fresh => {
                        return Ok(Acquired {
                            candidate: Arc::clone(&current.candidate),
                            rebuilt: false,
                        });
                    }
                    reason => debug!(context = %self.kind, ?reason, "Candidate is stale"),
                }
            }
            break observation;
        };

        state.phase = Phase::Building;
        state.current = None;
        drop(state);

        self.retarget(observation.tip.hash);

        let guard = BuildGuard {
            slot: self,
            armed: true,
        };
        let candidate = Arc::new(build(&observation)?);
        on_built(&candidate);
        guard.publish(Current {
            candidate: Arc::clone(&candidate),
            snapshot: ChainTipSnapshot::capture(&observation),
        });

        info!(
            context = %self.kind,
            height = candidate.height(),
            txs = candidate.block().txdata.len(),
            "Built new candidate"
        );
        Ok(Acquired {
            candidate,
            rebuilt: true,
        })
    }

    /// Run `f` with this context's extra-nonce counter.
    pub fn with_extra_nonce<R>(&self, f: impl FnOnce(&mut ExtraNonce) -> R) -> R {
        f(&mut self.extra_nonce.lock())
    }

    /// Remember issued work under `key`.
    ///
    /// Returns false, storing nothing, if the table has moved on to another
    /// tip since the entry's candidate was built.
    pub fn publish(&self, key: K, entry: TemplateCacheEntry) -> bool {
        let mut table = self.entries.write();
        if table.tip != Some(entry.tip()) {
            debug!(context = %self.kind, "Discarding entry for superseded tip");
            return false;
        }
        table.entries.insert(key, entry);
        true
    }

    pub fn lookup(&self, key: &K) -> Option<TemplateCacheEntry> {
        self.entries.read().entries.get(key).cloned()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().entries.len()
    }

    /// Point the entry table at `tip`, dropping everything issued for any
    /// other tip.
    fn retarget(&self, tip: BlockHash) {
        let mut table = self.entries.write();
        if table.tip != Some(tip) {
            if !table.entries.is_empty() {
                debug!(
                    context = %self.kind,
                    dropped = table.entries.len(),
                    "Tip changed, dropping issued work"
                );
            }
            table.entries.clear();
            table.tip = Some(tip);
        }
    }
}

/// Returns the slot to `Empty` unless the build is published.
struct BuildGuard<'a, K> {
    slot: &'a TemplateSlot<K>,
    armed: bool,
}

impl<K> BuildGuard<'_, K> {
    fn publish(mut self, current: Current) {
        self.armed = false;
        let mut state = self.slot.state.lock();
        state.phase = Phase::Ready;
        state.current = Some(current);
        drop(state);
        self.slot.built.notify_all();
    }
}

impl<K> Drop for BuildGuard<'_, K> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.slot.state.lock();
        state.phase = Phase::Empty;
        state.current = None;
        drop(state);
        self.slot.built.notify_all();
        warn!(context = %self.slot.kind, "Candidate build failed");
    }
}
