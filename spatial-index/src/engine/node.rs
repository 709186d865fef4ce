//! On-page representation of R-Tree nodes.

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::config::RTreeConfig;
use crate::constants::TREE_MAGIC;
use crate::entry::EntryId;
use crate::errors::{SpatialError, SpatialResult};
use crate::storage::PageId;

/// An entry in a leaf node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LeafEntry {
    pub bbox: BoundingBox,
    pub id: EntryId,
}

/// A child reference in an internal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChildRef {
    pub bbox: BoundingBox,
    pub page_id: PageId,
}

/// Node types in the R-Tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Node {
    /// Leaf node containing actual entries
    Leaf { entries: Vec<LeafEntry> },
    /// Internal node containing child references
    Internal {
        children: Vec<ChildRef>,
        level: u32, // Height from leaf level (leaves are 0)
    },
}

impl Node {
    /// Get the bounding box enclosing all children/entries
    pub fn compute_bbox(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        match self {
            Node::Leaf { entries } => entries.iter().for_each(|e| bbox.expand(&e.bbox)),
            Node::Internal { children, .. } => children.iter().for_each(|c| bbox.expand(&c.bbox)),
        }
        bbox
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Internal { children, .. } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn encode(&self) -> SpatialResult<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::legacy(),
        )?)
    }

    pub fn decode(bytes: &[u8]) -> SpatialResult<Node> {
        let (node, _) = bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
        Ok(node)
    }
}

/// Tree bookkeeping, stored in its own page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TreeHeader {
    pub magic: u32,
    /// `None` when the tree is empty
    pub root_page: Option<PageId>,
    pub height: u32,
    pub entry_count: u64,
    pub node_count: u64,
    pub leaf_capacity: u32,
    pub index_capacity: u32,
}

impl TreeHeader {
    pub fn new(config: &RTreeConfig) -> Self {
        Self {
            magic: TREE_MAGIC,
            root_page: None,
            height: 0,
            entry_count: 0,
            node_count: 0,
            leaf_capacity: config.leaf_capacity() as u32,
            index_capacity: config.index_capacity() as u32,
        }
    }

    pub fn config(&self) -> RTreeConfig {
        RTreeConfig::new()
            .with_leaf_capacity(self.leaf_capacity as usize)
            .with_index_capacity(self.index_capacity as usize)
    }

    pub fn encode(&self) -> SpatialResult<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::legacy(),
        )?)
    }

    pub fn decode(bytes: &[u8]) -> SpatialResult<TreeHeader> {
        let (header, _): (TreeHeader, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
        if header.magic != TREE_MAGIC {
            return Err(SpatialError::Corrupted(
                "Page does not hold an R-Tree header (bad magic)".into(),
            ));
        }
        Ok(header)
    }
}

/// Half split along the x centre, used for both leaves and internal nodes.
pub(crate) fn split_half<T, F>(mut items: Vec<T>, bbox_of: F) -> (Vec<T>, Vec<T>)
where
    F: Fn(&T) -> &BoundingBox,
{
    items.sort_by(|a, b| bbox_of(a).center().0.total_cmp(&bbox_of(b).center().0));
    let moved = items.split_off(items.len() / 2);
    (items, moved)
}
