//! Configuration of the default R-Tree engine.

use crate::constants::{DEFAULT_INDEX_CAPACITY, DEFAULT_LEAF_CAPACITY, MIN_NODE_CAPACITY};
use crate::errors::{SpatialError, SpatialResult};

/// Node capacities of an [`RTree`](crate::engine::RTree).
///
/// # Examples
///
/// ```
/// use spatial_index::RTreeConfig;
///
/// let config = RTreeConfig::new()
///     .with_leaf_capacity(32)
///     .with_index_capacity(16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RTreeConfig {
    leaf_capacity: usize,
    index_capacity: usize,
}

impl RTreeConfig {
    pub fn new() -> Self {
        Self {
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            index_capacity: DEFAULT_INDEX_CAPACITY,
        }
    }

    /// Maximum number of entries a leaf holds before it splits.
    pub fn with_leaf_capacity(mut self, leaf_capacity: usize) -> Self {
        self.leaf_capacity = leaf_capacity;
        self
    }

    /// Maximum number of children an internal node holds before it splits.
    pub fn with_index_capacity(mut self, index_capacity: usize) -> Self {
        self.index_capacity = index_capacity;
        self
    }

    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    pub fn index_capacity(&self) -> usize {
        self.index_capacity
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.leaf_capacity < MIN_NODE_CAPACITY {
            return Err(SpatialError::InvalidConfig(format!(
                "leaf capacity must be at least {}, got {}",
                MIN_NODE_CAPACITY, self.leaf_capacity
            )));
        }
        if self.index_capacity < MIN_NODE_CAPACITY {
            return Err(SpatialError::InvalidConfig(format!(
                "index capacity must be at least {}, got {}",
                MIN_NODE_CAPACITY, self.index_capacity
            )));
        }
        Ok(())
    }
}

impl Default for RTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}
