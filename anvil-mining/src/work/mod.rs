//! Per-poll work preparation: wire buffers, extra nonces, coinbase scripts.

pub mod buffer;
pub mod coinbase;
pub mod extranonce;

pub use buffer::{WorkBuffer, WorkBufferError};
pub use extranonce::ExtraNonce;
