//! Resource and per-source-file metadata, as served by `/info` and `/files`.

use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;
use crate::schema::{Offset, Scale, Schema};

/// Coordinate-system transform advertised by a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reprojection {
    #[serde(rename = "in")]
    pub in_srs: String,
    #[serde(rename = "out")]
    pub out_srs: String,
}

/// Top-level description of a resource, the `/info` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    #[serde(rename = "type", default = "octree")]
    pub kind: String,
    pub num_points: u64,
    pub schema: Schema,
    pub bounds: Bounds,
    pub bounds_conforming: Bounds,
    #[serde(default)]
    pub srs: String,
    #[serde(default)]
    pub base_depth: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprojection: Option<Reprojection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
}

fn octree() -> String {
    "octree".to_string()
}

/// Description of one source file that contributed points to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub path: String,
    pub origin: u64,
    #[serde(default)]
    pub num_points: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srs: Option<String>,
}
