//! Defaults shared by the engine and the storage managers.

/// Default page size (16KB) for the disk storage manager
pub const DEFAULT_PAGE_SIZE: usize = 16384;

/// Smallest page size the disk storage manager accepts
pub const MIN_PAGE_SIZE: usize = 512;

/// Maximum number of entries per leaf node
pub const DEFAULT_LEAF_CAPACITY: usize = 64;

/// Maximum children per internal node
pub const DEFAULT_INDEX_CAPACITY: usize = 64;

/// Below this a half split can leave a node with a single child
pub const MIN_NODE_CAPACITY: usize = 4;

/// Default buffer size in number of pages (16MB with 16KB pages)
pub const DEFAULT_BUFFER_PAGES: usize = 1024;

/// Magic number for storage file identification
pub const STORAGE_MAGIC: u32 = 0x5350_4958; // "SPIX"

/// Storage file format version
pub const STORAGE_VERSION: u32 = 1;

/// Magic number stamped into the tree header page
pub const TREE_MAGIC: u32 = 0x5254_5245; // "RTRE"

/// Number of dimensions handled by the R-Tree engine
pub const DIMENSIONS: usize = 2;
