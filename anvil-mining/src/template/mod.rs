//! Candidate blocks and the per-context cache that decides when to rebuild
//! them.

pub mod cache;
pub mod candidate;
pub mod staleness;

pub use cache::{ContextKind, Phase, TemplateCacheEntry, TemplateSlot};
pub use candidate::{CandidateBlock, CoinbaseRewrite, SolvedBlock};
pub use staleness::{ChainTipSnapshot, Observation, Staleness};
