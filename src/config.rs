use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::memory::DEFAULT_MAX_RANGE_LEN;

/// Engine knobs. Every field has a default, so a config file only needs the
/// keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvmConfig {
    /// Gas ceiling for one run. `None` only meters gas without enforcing it.
    pub gas_limit: Option<u64>,
    /// Require JUMP/JUMPI targets to be a JUMPDEST outside push data.
    pub validate_jumps: bool,
    /// Largest byte range a single instruction may read, copy or return.
    /// Offsets themselves are unbounded.
    pub max_range_len: usize,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            gas_limit: None,
            validate_jumps: false,
            max_range_len: DEFAULT_MAX_RANGE_LEN,
        }
    }
}

impl EvmConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| ConfigError::Json { path: path.display().to_string(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: EvmConfig = serde_json::from_str(r#"{"gas_limit": 21000}"#).unwrap();
        assert_eq!(cfg.gas_limit, Some(21000));
        assert!(!cfg.validate_jumps);
        assert_eq!(cfg.max_range_len, DEFAULT_MAX_RANGE_LEN);
    }

    #[test]
    fn stack_depth_is_not_configurable() {
        assert!(serde_json::from_str::<EvmConfig>(r#"{"stack_limit": 4096}"#).is_err());
    }
}
