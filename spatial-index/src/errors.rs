//! Error types for the spatial index.
//!
//! Every fallible operation in this crate returns [`SpatialResult`]. Callers
//! that only need to know *what kind* of failure happened can use
//! [`SpatialError::kind`] instead of matching on the variant payloads.

use std::fmt::{Display, Formatter};
use std::io;
use thiserror::Error;

use crate::storage::PageId;

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("Spatial index has been disposed")]
    ObjectDisposed,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Inconsistent index state: {0}")]
    InconsistentState(String),

    #[error("Invalid page id {0}")]
    InvalidPage(PageId),

    #[error("Page payload too large: {size} bytes (max {capacity})")]
    PageOverflow { size: usize, capacity: usize },

    #[error("Storage corrupted: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of a [`SpatialError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The index was used after it was disposed.
    Disposed,
    /// The engine was asked to do something structurally impossible.
    InvalidOperation,
    /// The payload table and the engine disagree. Always a defect.
    InconsistentState,
    /// The persistence backend failed.
    Storage,
    /// A configuration value was rejected.
    Configuration,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Disposed => write!(f, "Disposed"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::InconsistentState => write!(f, "Inconsistent state"),
            ErrorKind::Storage => write!(f, "Storage error"),
            ErrorKind::Configuration => write!(f, "Configuration error"),
        }
    }
}

impl SpatialError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpatialError::ObjectDisposed => ErrorKind::Disposed,
            SpatialError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            SpatialError::InconsistentState(_) => ErrorKind::InconsistentState,
            SpatialError::InvalidPage(_)
            | SpatialError::PageOverflow { .. }
            | SpatialError::Corrupted(_)
            | SpatialError::Io(_)
            | SpatialError::Serialization(_) => ErrorKind::Storage,
            SpatialError::InvalidConfig(_) => ErrorKind::Configuration,
        }
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, SpatialError::ObjectDisposed)
    }
}

impl From<bincode::error::EncodeError> for SpatialError {
    fn from(err: bincode::error::EncodeError) -> Self {
        SpatialError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for SpatialError {
    fn from(err: bincode::error::DecodeError) -> Self {
        SpatialError::Serialization(err.to_string())
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;
