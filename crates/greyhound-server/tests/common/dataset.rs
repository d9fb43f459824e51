//! The `ellipsoid` test resource: a deterministic point set on an
//! ellipsoid surface, written in the directory-reader layout.

use std::fs;
use std::path::Path;

use greyhound_core::{DimType, Dimension, Schema};

/// Point count of the generated resource; large enough that a full read
/// spans several produced chunks.
pub const ELLIPSOID_POINTS: usize = 4000;

/// Byte stride of the native schema.
pub const STRIDE: usize = 30;

/// Tree node capacity used by the test resource; small enough that the
/// 4000 points spread over at least four tree levels.
pub const POINTS_PER_NODE: usize = 32;

pub fn ellipsoid_schema() -> Schema {
    Schema::new(vec![
        Dimension::new("X", DimType::Floating, 8),
        Dimension::new("Y", DimType::Floating, 8),
        Dimension::new("Z", DimType::Floating, 8),
        Dimension::new("Intensity", DimType::Unsigned, 2),
        Dimension::new("Origin", DimType::Unsigned, 4),
    ])
    .unwrap()
}

/// Points on an ellipsoid surface via a golden-angle spiral, centered at
/// (50, 50, 50) with radii (40, 30, 20).
pub fn ellipsoid_points() -> Vec<[f64; 5]> {
    let golden = std::f64::consts::PI * (3.0 - 5.0f64.sqrt());
    (0..ELLIPSOID_POINTS)
        .map(|i| {
            let n = ELLIPSOID_POINTS as f64;
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / n;
            let r = (1.0 - z * z).sqrt();
            let theta = golden * i as f64;
            let origin = u64::from(i >= ELLIPSOID_POINTS / 2);
            [
                50.0 + 40.0 * r * theta.cos(),
                50.0 + 30.0 * r * theta.sin(),
                50.0 + 20.0 * z,
                (i % 256) as f64,
                origin as f64,
            ]
        })
        .collect()
}

/// Write the `ellipsoid` resource under `root`.
pub fn write_ellipsoid(root: &Path) {
    let dir = root.join("ellipsoid");
    fs::create_dir_all(&dir).unwrap();

    let schema = ellipsoid_schema();
    assert_eq!(schema.stride(), STRIDE);

    let points = ellipsoid_points();
    let mut data = Vec::with_capacity(points.len() * STRIDE);
    for p in &points {
        for (dim, value) in schema.dims().iter().zip(p.iter()) {
            dim.encode(*value, &mut data);
        }
    }

    let metadata = serde_json::json!({
        "type": "octree",
        "numPoints": points.len(),
        "schema": serde_json::to_value(&schema).unwrap(),
        "bounds": [0, 0, 0, 100, 100, 100],
        "boundsConforming": [10, 20, 30, 90, 80, 70],
        "srs": "EPSG:26915",
        "baseDepth": 0,
        "pointsPerNode": POINTS_PER_NODE,
        "files": [
            {
                "path": "s3://ellipsoid/half-0.laz",
                "origin": 0,
                "numPoints": points.len() / 2,
                "bounds": [0, 0, 50, 100, 100, 100]
            },
            {
                "path": "s3://ellipsoid/half-1.laz",
                "origin": 1,
                "numPoints": points.len() / 2,
                "bounds": [0, 0, 0, 100, 100, 50]
            }
        ]
    });

    fs::write(dir.join("greyhound.json"), metadata.to_string()).unwrap();
    fs::write(dir.join("points.bin"), data).unwrap();
}
