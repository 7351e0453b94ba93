//! Tunables for the batch engine and the atlas packer.
//!
//! Both structs deserialize from JSON with every field optional, so a config
//! file only needs to list what it overrides:
//!
//! ```ignore
//! let config = BatchConfig::from_json_str(r#"{ "max_batch_size": 2048 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, AtlasResult, BatchError, BatchResult};

/// Quads per draw call. 4096 quads is 16384 vertices and 24576 indices,
/// comfortably inside a 16-bit index buffer.
pub const MAX_BATCH_SIZE: usize = 4096;

/// Chunks larger than this many quads fill their vertices on two workers.
pub const PARALLEL_FILL_THRESHOLD: usize = 512;

/// Sort ranges longer than this are split across two workers.
pub const SORT_SEQUENTIAL_THRESHOLD: usize = 2048;

/// Number of indices a 16-bit index buffer can address.
pub const INDEX_RANGE: usize = u16::MAX as usize + 1;

const _: () = assert!(
    MAX_BATCH_SIZE * 6 <= INDEX_RANGE,
    "MAX_BATCH_SIZE overflows the 16-bit index range"
);

/// Batch engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum quads per draw call.
    pub max_batch_size: usize,
    /// Chunks above this size are filled by two workers.
    pub parallel_fill_threshold: usize,
    /// Sort ranges above this size are sorted by two workers.
    pub sort_sequential_threshold: usize,
    /// Initial queue capacity in sprites. Grows by doubling.
    pub initial_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            parallel_fill_threshold: PARALLEL_FILL_THRESHOLD,
            sort_sequential_threshold: SORT_SEQUENTIAL_THRESHOLD,
            initial_capacity: 64,
        }
    }
}

impl BatchConfig {
    /// Parse a JSON config. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> BatchResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| BatchError::InvalidConfig {
            field: "json",
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the flusher and index buffer rely on.
    pub fn validate(&self) -> BatchResult<()> {
        if self.max_batch_size == 0 {
            return Err(BatchError::InvalidConfig {
                field: "max_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        let index_count = self.max_batch_size.saturating_mul(6);
        if index_count > INDEX_RANGE {
            return Err(BatchError::IndexRangeExceeded {
                max_batch_size: self.max_batch_size,
                index_count,
            });
        }
        if self.parallel_fill_threshold == 0 {
            return Err(BatchError::InvalidConfig {
                field: "parallel_fill_threshold",
                reason: "must be at least 1".into(),
            });
        }
        if self.sort_sequential_threshold == 0 {
            return Err(BatchError::InvalidConfig {
                field: "sort_sequential_threshold",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Default lower bound on each atlas axis.
pub const ATLAS_MIN_DIMENSION: u32 = 2048;

/// Default upper bound on each atlas axis.
pub const ATLAS_MAX_DIMENSION: u32 = 8192;

/// Atlas canvas configuration. The requested size is clamped to
/// `[min_dimension, max_dimension]` per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub width: u32,
    pub height: u32,
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            width: ATLAS_MIN_DIMENSION,
            height: ATLAS_MIN_DIMENSION,
            min_dimension: ATLAS_MIN_DIMENSION,
            max_dimension: ATLAS_MAX_DIMENSION,
        }
    }
}

impl AtlasConfig {
    /// A config asking for the given canvas size with default bounds.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Parse a JSON config. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> AtlasResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| AtlasError::InvalidConfig {
            field: "json",
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the bounds leave room for the border plus one texel and
    /// that they are ordered.
    pub fn validate(&self) -> AtlasResult<()> {
        if self.min_dimension < 3 {
            return Err(AtlasError::InvalidConfig {
                field: "min_dimension",
                reason: format!("must be at least 3, got {}", self.min_dimension),
            });
        }
        if self.min_dimension > self.max_dimension {
            return Err(AtlasError::InvalidConfig {
                field: "max_dimension",
                reason: format!(
                    "{} is below min_dimension {}",
                    self.max_dimension, self.min_dimension
                ),
            });
        }
        Ok(())
    }

    /// The canvas size after clamping each axis to
    /// `[min_dimension, max_dimension]`. Only meaningful for a validated
    /// config.
    pub fn clamped_size(&self) -> (u32, u32) {
        let clamp = |v: u32| v.max(self.min_dimension).min(self.max_dimension);
        (clamp(self.width), clamp(self.height))
    }
}
