//! The reader seam: capabilities an opened index exposes to the service.
//!
//! The service layer only ever talks to these traits; any engine that can
//! open a named index and answer depth/bounds queries plugs in through
//! [`ReaderOpener`]. The bundled [`DirectoryReader`](crate::DirectoryReader)
//! is one such engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::bounds::Bounds;
use crate::info::{FileInfo, ResourceInfo};
use crate::params::{FileSearch, HierarchyParams, ReadParams};
use crate::schema::{Offset, Scale};

/// Failure to open an index at a candidate path.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("no index at {0}")]
    NotFound(PathBuf),
    #[error("invalid metadata: {0}")]
    Metadata(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure while building or stepping a query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("query failed: {0}")]
    Failed(String),
}

/// An in-progress point query.
///
/// Implementations append whole point records; a record never straddles two
/// `read_some` calls.
pub trait PointQuery: Send {
    /// Append a bounded batch of encoded points to `buf`.
    ///
    /// Returns `true` once the final point has been appended.
    fn read_some(&mut self, buf: &mut Vec<u8>) -> Result<bool, QueryError>;

    /// Points emitted so far; the total once drained.
    fn num_points(&self) -> u64;
}

/// An opened, concurrently shareable index for one named resource.
pub trait Reader: Send + Sync {
    fn info(&self) -> ResourceInfo;

    /// Occupancy counts over the spatial tree for a bounds/depth window.
    fn hierarchy(&self, params: &HierarchyParams) -> Result<serde_json::Value, QueryError>;

    /// Paths of every source file, ordered by origin id.
    fn file_paths(&self) -> Vec<String>;

    /// Lookup of a single source file by origin id or path.
    fn file_info(&self, search: &FileSearch) -> Option<FileInfo>;

    /// Source files whose footprint overlaps `bounds`.
    fn files_in(
        &self,
        bounds: &Bounds,
        scale: Option<&Scale>,
        offset: Option<&Offset>,
    ) -> Vec<FileInfo>;

    /// Build a point query; cheap, the work happens in
    /// [`PointQuery::read_some`].
    fn query(&self, params: ReadParams) -> Result<Box<dyn PointQuery>, QueryError>;
}

/// Constructs a [`Reader`] from a resolved filesystem path.
pub trait ReaderOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn Reader>, OpenError>;
}
