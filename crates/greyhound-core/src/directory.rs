//! Directory-backed index reader.
//!
//! A resource directory holds `greyhound.json` (resource info, source-file
//! list, and tree build parameters) next to `points.bin`, a flat file of
//! native-schema point records. The whole point set is loaded at open and a
//! depth assignment is built over it, so this reader is suited to indexes
//! that fit in memory; larger out-of-core engines implement the same
//! [`Reader`] traits externally.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::bounds::Bounds;
use crate::info::{FileInfo, ResourceInfo};
use crate::params::{FileSearch, HierarchyParams, ReadParams};
use crate::reader::{OpenError, PointQuery, QueryError, Reader, ReaderOpener};
use crate::schema::{Dimension, Offset, Scale, Schema};
use crate::tree::Tree;

/// Metadata file name within a resource directory.
pub const METADATA_FILE: &str = "greyhound.json";
/// Point-data file name within a resource directory.
pub const POINTS_FILE: &str = "points.bin";

const DEFAULT_POINTS_PER_NODE: usize = 4096;

/// Bytes of encoded points one `read_some` call appends, at most.
const BATCH_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    #[serde(flatten)]
    info: ResourceInfo,
    #[serde(default)]
    files: Vec<FileInfo>,
    #[serde(default = "default_points_per_node")]
    points_per_node: usize,
}

fn default_points_per_node() -> usize {
    DEFAULT_POINTS_PER_NODE
}

#[derive(Debug)]
struct Store {
    info: ResourceInfo,
    files: Vec<FileInfo>,
    /// Row-major native-schema values, one f64 per dimension per point.
    values: Vec<f64>,
    positions: Vec<[f64; 3]>,
    tree: Tree,
}

impl Store {
    fn width(&self) -> usize {
        self.info.schema.dims().len()
    }

    fn value(&self, point: usize, dim: usize) -> f64 {
        self.values[point * self.width() + dim]
    }
}

/// A [`Reader`] over one resource directory.
#[derive(Debug)]
pub struct DirectoryReader {
    store: Arc<Store>,
}

impl DirectoryReader {
    /// Open the resource rooted at `path`, loading and indexing its points.
    pub fn open(path: &Path) -> Result<DirectoryReader, OpenError> {
        let metadata_path = path.join(METADATA_FILE);
        if !metadata_path.is_file() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }

        let metadata: Metadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
        let info = metadata.info;

        let schema = &info.schema;
        let x = schema.position("X");
        let y = schema.position("Y");
        let z = schema.position("Z");
        let (Some(x), Some(y), Some(z)) = (x, y, z) else {
            return Err(OpenError::Metadata(
                "schema must carry X, Y and Z dimensions".to_string(),
            ));
        };

        let raw = fs::read(path.join(POINTS_FILE))?;
        let stride = schema.stride();
        if raw.len() % stride != 0 {
            return Err(OpenError::Metadata(format!(
                "point data length {} is not a multiple of the schema stride {stride}",
                raw.len()
            )));
        }
        let count = raw.len() / stride;
        if count as u64 != info.num_points {
            return Err(OpenError::Metadata(format!(
                "metadata declares {} points but {POINTS_FILE} holds {count}",
                info.num_points
            )));
        }

        let width = schema.dims().len();
        let mut values = Vec::with_capacity(count * width);
        let mut positions = Vec::with_capacity(count);
        for record in raw.chunks_exact(stride) {
            let mut at = 0;
            for dim in schema.dims() {
                values.push(dim.decode(&record[at..]));
                at += dim.size;
            }
            let base = values.len() - width;
            positions.push([values[base + x], values[base + y], values[base + z]]);
        }

        let tree = Tree::build(&positions, info.bounds, metadata.points_per_node);
        debug!(
            points = count,
            per_node = metadata.points_per_node,
            "built depth assignment"
        );

        Ok(DirectoryReader {
            store: Arc::new(Store {
                info,
                files: metadata.files,
                values,
                positions,
                tree,
            }),
        })
    }
}

impl Reader for DirectoryReader {
    fn info(&self) -> ResourceInfo {
        self.store.info.clone()
    }

    fn hierarchy(&self, params: &HierarchyParams) -> Result<Value, QueryError> {
        let bounds = params
            .bounds
            .unscale(params.scale.as_ref(), params.offset.as_ref());
        Ok(self.store.tree.hierarchy(
            &self.store.positions,
            &bounds,
            params.depth,
            params.vertical,
        ))
    }

    fn file_paths(&self) -> Vec<String> {
        self.store.files.iter().map(|f| f.path.clone()).collect()
    }

    fn file_info(&self, search: &FileSearch) -> Option<FileInfo> {
        let files = &self.store.files;
        match search {
            FileSearch::Origin(id) => files.iter().find(|f| f.origin == *id).cloned(),
            FileSearch::Path(path) => files
                .iter()
                .find(|f| f.path == *path)
                .or_else(|| files.iter().find(|f| f.path.contains(path.as_str())))
                .cloned(),
        }
    }

    fn files_in(
        &self,
        bounds: &Bounds,
        scale: Option<&Scale>,
        offset: Option<&Offset>,
    ) -> Vec<FileInfo> {
        let native = bounds.unscale(scale, offset);
        self.store
            .files
            .iter()
            .filter(|f| f.bounds.as_ref().is_some_and(|b| b.overlaps(&native)))
            .cloned()
            .collect()
    }

    fn query(&self, params: ReadParams) -> Result<Box<dyn PointQuery>, QueryError> {
        DirectoryQuery::new(self.store.clone(), params).map(|q| Box::new(q) as Box<dyn PointQuery>)
    }
}

/// Selection over the in-memory point set, stepped in bounded batches.
struct DirectoryQuery {
    store: Arc<Store>,
    selection: Vec<usize>,
    cursor: usize,
    /// Output dimensions resolved against the native schema, with the axis
    /// index (0..3) for dimensions subject to scale/offset.
    out: Vec<(Dimension, usize, Option<usize>)>,
    scale: [f64; 3],
    offset: [f64; 3],
}

impl DirectoryQuery {
    fn new(store: Arc<Store>, params: ReadParams) -> Result<DirectoryQuery, QueryError> {
        let native = &store.info.schema;
        let out_schema = params.schema.as_ref().unwrap_or(native);

        let mut out = Vec::with_capacity(out_schema.dims().len());
        for dim in out_schema.dims() {
            let Some(index) = native.position(&dim.name) else {
                return Err(QueryError::InvalidQuery(format!(
                    "unknown dimension {}",
                    dim.name
                )));
            };
            let axis = match dim.name.as_str() {
                "X" => Some(0),
                "Y" => Some(1),
                "Z" => Some(2),
                _ => None,
            };
            out.push((dim.clone(), index, axis));
        }

        let origin = parse_filter(params.filter.as_ref())?;
        let origin_dim = native
            .position("Origin")
            .or_else(|| native.position("OriginId"));
        if origin.is_some() && origin_dim.is_none() {
            return Err(QueryError::InvalidQuery(
                "resource has no Origin dimension".to_string(),
            ));
        }

        let bounds = params
            .bounds
            .map(|b| b.unscale(params.scale.as_ref(), params.offset.as_ref()));

        let selection = (0..store.positions.len())
            .filter(|&i| {
                params.depth.contains(store.tree.depth(i))
                    && bounds.as_ref().is_none_or(|b| b.contains(store.positions[i]))
                    && match (origin, origin_dim) {
                        (Some(id), Some(dim)) => store.value(i, dim).round() as u64 == id,
                        _ => true,
                    }
            })
            .collect();

        Ok(DirectoryQuery {
            store,
            selection,
            cursor: 0,
            out,
            scale: params.scale.map_or([1.0; 3], |s| s.0),
            offset: params.offset.map_or([0.0; 3], |o| o.0),
        })
    }
}

impl PointQuery for DirectoryQuery {
    fn read_some(&mut self, buf: &mut Vec<u8>) -> Result<bool, QueryError> {
        let start = buf.len();
        while self.cursor < self.selection.len() && buf.len() - start < BATCH_BYTES {
            let point = self.selection[self.cursor];
            for (dim, index, axis) in &self.out {
                let mut value = self.store.value(point, *index);
                if let Some(axis) = axis {
                    value = (value - self.offset[*axis]) / self.scale[*axis];
                }
                dim.encode(value, buf);
            }
            self.cursor += 1;
        }
        Ok(self.cursor == self.selection.len())
    }

    fn num_points(&self) -> u64 {
        self.cursor as u64
    }
}

/// The supported filter form: `{"Origin": <id>}` equality.
fn parse_filter(filter: Option<&Value>) -> Result<Option<u64>, QueryError> {
    let Some(filter) = filter else { return Ok(None) };
    let invalid = || QueryError::InvalidQuery(format!("unsupported filter: {filter}"));

    let Value::Object(map) = filter else {
        return Err(invalid());
    };
    if map.is_empty() {
        return Ok(None);
    }
    if map.len() > 1 {
        return Err(invalid());
    }
    match map.iter().next() {
        Some((key, value)) if key == "Origin" || key == "OriginId" => value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Opens [`DirectoryReader`]s for the service layer.
pub struct DirectoryOpener {
    cache_bytes: u64,
    /// Remote-endpoint configuration forwarded from the service; this
    /// filesystem-backed reader has no use for it.
    arbiter: Value,
}

impl DirectoryOpener {
    /// `cache_bytes` is the per-reader budget from the service
    /// configuration; this in-memory reader only reports it.
    pub fn new(cache_bytes: u64) -> Self {
        Self { cache_bytes, arbiter: Value::Null }
    }

    pub fn with_arbiter(mut self, arbiter: Value) -> Self {
        if !arbiter.is_null() {
            debug!("arbiter configuration ignored by the directory reader");
        }
        self.arbiter = arbiter;
        self
    }

    pub fn arbiter(&self) -> &Value {
        &self.arbiter
    }
}

impl ReaderOpener for DirectoryOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn Reader>, OpenError> {
        let reader = DirectoryReader::open(path)?;
        info!(
            path = %path.display(),
            points = reader.store.positions.len(),
            cache_bytes = self.cache_bytes,
            "opened resource"
        );
        Ok(Arc::new(reader))
    }
}
