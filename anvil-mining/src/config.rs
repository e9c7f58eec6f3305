use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::auxpow::MAX_CHAIN_ID;
use crate::work::coinbase::MAX_FLAGS_LEN;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be non-zero")]
    ZeroInterval { field: &'static str },

    #[error("coinbase flags are {len} bytes, at most {MAX_FLAGS_LEN} fit in the coinbase script")]
    FlagsTooLong { len: usize },

    #[error("chain id {0} does not fit in the version field (max {MAX_CHAIN_ID})")]
    ChainIdOutOfRange(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Debounce for rebuilding getwork and merged-work candidates when only
    /// the transaction pool changed (seconds).
    pub work_refresh_secs: u64,

    /// Debounce for getblocktemplate candidates (seconds). Template clients
    /// poll more often, so this is normally shorter than
    /// `work_refresh_secs`.
    pub template_refresh_secs: u64,

    /// Identifier this chain uses in merged-mined block versions.
    pub chain_id: u32,

    /// Bytes appended to the solo coinbase script after the height and
    /// extra-nonce pushes, also reported as `coinbaseaux.flags`.
    pub coinbase_flags: String,

    /// Reported to template clients as `sizelimit`.
    pub max_block_size: u64,

    /// Reported to template clients as `sigoplimit`.
    pub max_block_sigops: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            work_refresh_secs: 60,
            template_refresh_secs: 5,
            chain_id: 0x0021,
            coinbase_flags: String::new(),
            max_block_size: 1_000_000,
            max_block_sigops: 20_000,
        }
    }
}

impl MiningConfig {
    pub fn work_refresh(&self) -> Duration {
        Duration::from_secs(self.work_refresh_secs)
    }

    pub fn template_refresh(&self) -> Duration {
        Duration::from_secs(self.template_refresh_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.work_refresh_secs == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "work_refresh_secs",
            });
        }
        if self.template_refresh_secs == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "template_refresh_secs",
            });
        }
        if self.coinbase_flags.len() > MAX_FLAGS_LEN {
            return Err(ConfigError::FlagsTooLong {
                len: self.coinbase_flags.len(),
            });
        }
        if self.chain_id > MAX_CHAIN_ID {
            return Err(ConfigError::ChainIdOutOfRange(self.chain_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MiningConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.work_refresh(), Duration::from_secs(60));
        assert_eq!(config.template_refresh(), Duration::from_secs(5));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: MiningConfig =
            serde_json::from_str(r#"{"chain_id": 7, "coinbase_flags": "/anvil/"}"#).unwrap();
        assert_eq!(config.chain_id, 7);
        assert_eq!(config.coinbase_flags, "/anvil/");
        assert_eq!(config.work_refresh_secs, 60);
        assert_eq!(config.max_block_size, 1_000_000);
    }

    #[test]
    fn rejects_zero_interval() {
        let config = MiningConfig {
            template_refresh_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                field: "template_refresh_secs"
            })
        );
    }

    #[test]
    fn rejects_oversized_flags() {
        let config = MiningConfig {
            coinbase_flags: "x".repeat(MAX_FLAGS_LEN + 1),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FlagsTooLong { .. })
        ));
    }

    #[test]
    fn rejects_chain_id_outside_version_bits() {
        let config = MiningConfig {
            chain_id: MAX_CHAIN_ID + 1,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ChainIdOutOfRange(MAX_CHAIN_ID + 1))
        );
    }
}
