//! Tree configuration

use crate::prolly::{Chunker, ContentDefined, Exponential, WINDOW_SIZE};
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Default minimum node size (1 KiB)
pub const DEFAULT_MIN_NODE_SIZE: usize = 1024;

/// Default mean node size (4 KiB)
pub const DEFAULT_MEAN_NODE_SIZE: usize = 4096;

/// Default maximum node size (64 KiB)
pub const DEFAULT_MAX_NODE_SIZE: usize = 64 * 1024;

/// How node boundaries are chosen
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChunkingConfig {
    /// Keyed rolling-hash boundaries
    ContentDefined {
        min_size: usize,
        mean_size: usize,
        max_size: usize,
        /// Secret that makes boundaries unpredictable without it
        key: [u8; 32],
    },
    /// Target size doubling every `period` nodes
    Exponential {
        min_size: usize,
        max_size: usize,
        period: usize,
    },
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig::ContentDefined {
            min_size: DEFAULT_MIN_NODE_SIZE,
            mean_size: DEFAULT_MEAN_NODE_SIZE,
            max_size: DEFAULT_MAX_NODE_SIZE,
            key: [0u8; 32],
        }
    }
}

impl ChunkingConfig {
    /// Content-defined chunking with the given sizes and key
    pub fn content_defined(min_size: usize, mean_size: usize, max_size: usize, key: [u8; 32]) -> Self {
        ChunkingConfig::ContentDefined {
            min_size,
            mean_size,
            max_size,
            key,
        }
    }

    /// Check parameters that [`build`](Self::build) would panic on
    pub fn validate(&self) -> Result<()> {
        match self {
            ChunkingConfig::ContentDefined {
                min_size,
                mean_size,
                max_size,
                ..
            } => {
                if !mean_size.is_power_of_two() {
                    return Err(CoreError::Configuration(format!(
                        "mean size {mean_size} is not a power of two"
                    )));
                }
                if *min_size < WINDOW_SIZE {
                    return Err(CoreError::Configuration(format!(
                        "min size {min_size} is below the window size {WINDOW_SIZE}"
                    )));
                }
                check_bounds(*min_size, *max_size)
            }
            ChunkingConfig::Exponential {
                min_size,
                max_size,
                period,
            } => {
                if *min_size == 0 || *period == 0 {
                    return Err(CoreError::Configuration(
                        "exponential min size and period must be non-zero".to_string(),
                    ));
                }
                check_bounds(*min_size, *max_size)
            }
        }
    }

    /// Largest node this configuration produces
    pub fn max_size(&self) -> usize {
        match self {
            ChunkingConfig::ContentDefined { max_size, .. }
            | ChunkingConfig::Exponential { max_size, .. } => *max_size,
        }
    }

    /// Create a chunker.
    ///
    /// # Panics
    ///
    /// On parameters `validate` rejects.
    pub fn build(&self) -> Box<dyn Chunker> {
        match self {
            ChunkingConfig::ContentDefined {
                min_size,
                mean_size,
                max_size,
                key,
            } => Box::new(ContentDefined::new(*min_size, *mean_size, *max_size, key)),
            ChunkingConfig::Exponential {
                min_size,
                max_size,
                period,
            } => Box::new(Exponential::new(*min_size, *max_size, *period)),
        }
    }
}

fn check_bounds(min_size: usize, max_size: usize) -> Result<()> {
    if min_size > max_size {
        return Err(CoreError::Configuration(format!(
            "min size {min_size} exceeds max size {max_size}"
        )));
    }
    Ok(())
}

/// Configuration shared by builders of one family of trees.
///
/// Trees only share structure when built with identical configurations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Boundary strategy used at every level
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl TreeConfig {
    /// Default sizes with a caller-supplied chunking key
    pub fn with_key(key: [u8; 32]) -> Self {
        Self::with_chunking(ChunkingConfig::content_defined(
            DEFAULT_MIN_NODE_SIZE,
            DEFAULT_MEAN_NODE_SIZE,
            DEFAULT_MAX_NODE_SIZE,
            key,
        ))
    }

    /// Use a specific chunking strategy
    pub fn with_chunking(chunking: ChunkingConfig) -> Self {
        Self { chunking }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TreeConfig::default();
        assert!(config.chunking.validate().is_ok());
        assert_eq!(config.chunking.max_size(), DEFAULT_MAX_NODE_SIZE);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_mean = ChunkingConfig::content_defined(1024, 3000, 8192, [0; 32]);
        assert!(matches!(bad_mean.validate(), Err(CoreError::Configuration(_))));

        let small_min = ChunkingConfig::content_defined(16, 1024, 8192, [0; 32]);
        assert!(small_min.validate().is_err());

        let inverted = ChunkingConfig::Exponential {
            min_size: 512,
            max_size: 64,
            period: 4,
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_config_serde() {
        let json = r#"{"chunking":{"strategy":"exponential","min_size":64,"max_size":4096,"period":8}}"#;
        let config: TreeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.chunking,
            ChunkingConfig::Exponential {
                min_size: 64,
                max_size: 4096,
                period: 8
            }
        );

        let empty: TreeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, TreeConfig::default());

        let round = serde_json::to_string(&TreeConfig::with_key([1; 32])).unwrap();
        assert_eq!(serde_json::from_str::<TreeConfig>(&round).unwrap(), TreeConfig::with_key([1; 32]));
    }
}
