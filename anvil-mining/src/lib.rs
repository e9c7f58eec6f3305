//! Mining work distribution for a proof-of-work node.
//!
//! Builds and caches candidate blocks, hands them out as legacy getwork
//! buffers, merged-mining work or BIP 22 templates, and rebuilds the exact
//! block behind every submitted solution before passing it to consensus.
//! Node internals are reached only through the traits in [`node`].

pub mod auxpow;
pub mod config;
pub mod error;
pub mod merkle;
pub mod node;
pub mod rpc;
pub mod submit;
pub mod template;
pub mod tracing;
pub mod types;
pub mod work;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::MiningConfig;
pub use error::{ErrorKind, MiningError, Result};
pub use rpc::MiningContext;
