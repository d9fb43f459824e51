//! Reader model for the Greyhound point-cloud streaming service.
//!
//! This crate defines what the service layer knows about an index: spatial
//! bounds, point schemas, resource and source-file metadata, the JSON-shaped
//! query-parameter model, and the [`Reader`]/[`PointQuery`] capability
//! traits. It also ships [`DirectoryReader`], an in-memory reader over a
//! simple on-disk layout, so the service runs end to end without an external
//! query engine.

pub mod bounds;
pub mod directory;
pub mod info;
pub mod params;
pub mod reader;
pub mod schema;
pub mod tree;

pub use bounds::Bounds;
pub use directory::{DirectoryOpener, DirectoryReader};
pub use info::{FileInfo, Reprojection, ResourceInfo};
pub use params::{
    DepthRange, FileSearch, FilesQuery, HierarchyParams, ParamError, ParamMap, ReadParams,
};
pub use reader::{OpenError, PointQuery, QueryError, Reader, ReaderOpener};
pub use schema::{DimType, Dimension, Offset, Scale, Schema};
pub use tree::Tree;
