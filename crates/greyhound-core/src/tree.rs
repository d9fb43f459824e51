//! Depth assignment and occupancy summaries over an in-memory point set.
//!
//! Points are assigned tree depths by simulated octree insertion: each cell
//! of the implicit grid at depth `d` holds up to `capacity` points, and a
//! point descends until it finds a cell with room. Hierarchy queries then
//! count points per depth within recursively split bounds, so hierarchy
//! totals and read-query counts agree for the same window.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::bounds::Bounds;
use crate::params::DepthRange;

/// Deepest level the insertion walk will descend to. Beyond this, cells
/// accept points unconditionally (coincident points would otherwise recurse
/// forever).
const MAX_DEPTH: u64 = 48;

/// Per-point depth assignment over a fixed root cube.
#[derive(Debug)]
pub struct Tree {
    bounds: Bounds,
    depths: Vec<u32>,
}

impl Tree {
    /// Assign a depth to every point by capacity-bounded insertion.
    pub fn build(positions: &[[f64; 3]], bounds: Bounds, capacity: usize) -> Tree {
        let capacity = capacity.max(1) as u32;
        let mut occupancy: HashMap<(u32, u64, u64, u64), u32> = HashMap::new();
        let mut depths = Vec::with_capacity(positions.len());

        for p in positions {
            let mut depth = 0u64;
            loop {
                let key = cell(&bounds, *p, depth);
                let count = occupancy.entry(key).or_insert(0);
                if *count < capacity || depth == MAX_DEPTH {
                    *count += 1;
                    depths.push(depth as u32);
                    break;
                }
                depth += 1;
            }
        }

        Tree { bounds, depths }
    }

    pub fn depth(&self, index: usize) -> u64 {
        u64::from(self.depths[index])
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Occupancy counts for `query_bounds` over `range`, as a JSON tree of
    /// `{"n": count, "<direction>": {...}}` nodes. Returns `Null` when the
    /// window holds no points.
    pub fn hierarchy(
        &self,
        positions: &[[f64; 3]],
        query_bounds: &Bounds,
        range: DepthRange,
        vertical: bool,
    ) -> Value {
        let indices: Vec<usize> = (0..positions.len())
            .filter(|&i| range.contains(self.depth(i)) && query_bounds.contains(positions[i]))
            .collect();

        if indices.is_empty() {
            return Value::Null;
        }

        self.node(positions, *query_bounds, range.begin, range.end, &indices, vertical)
    }

    fn node(
        &self,
        positions: &[[f64; 3]],
        bounds: Bounds,
        level: u64,
        end: u64,
        indices: &[usize],
        vertical: bool,
    ) -> Value {
        let here = indices.iter().filter(|&&i| self.depth(i) == level).count() as u64;

        let mut out = Map::new();
        out.insert("n".to_string(), Value::from(here));

        if level + 1 < end {
            let fan = if vertical { 8 } else { 4 };
            let mut children: Vec<Vec<usize>> = vec![Vec::new(); fan];
            for &i in indices {
                if self.depth(i) > level {
                    children[bounds.child_index(positions[i], vertical)].push(i);
                }
            }
            for (index, deeper) in children.into_iter().enumerate() {
                if !deeper.is_empty() {
                    let token = Bounds::direction_token(index, vertical);
                    let child = bounds.split(index, vertical);
                    out.insert(
                        token.to_string(),
                        self.node(positions, child, level + 1, end, &deeper, vertical),
                    );
                }
            }
        }

        Value::Object(out)
    }
}

/// The implicit grid cell a point occupies at `depth`.
fn cell(bounds: &Bounds, p: [f64; 3], depth: u64) -> (u32, u64, u64, u64) {
    let divisions = 1u64 << depth.min(MAX_DEPTH);
    let axis = |i: usize| -> u64 {
        let span = bounds.max()[i] - bounds.min()[i];
        if span <= 0.0 {
            return 0;
        }
        let norm = (p[i] - bounds.min()[i]) / span;
        ((norm * divisions as f64) as u64).min(divisions - 1)
    };
    (depth as u32, axis(0), axis(1), axis(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Bounds {
        Bounds::new([0.0; 3], [16.0; 3])
    }

    fn grid(n: usize) -> Vec<[f64; 3]> {
        // Deterministic spread through the cube.
        (0..n)
            .map(|i| {
                let f = i as f64;
                [
                    (f * 7.3) % 16.0,
                    (f * 3.1) % 16.0,
                    (f * 11.7) % 16.0,
                ]
            })
            .collect()
    }

    #[test]
    fn test_capacity_bounds_each_cell() {
        let points = grid(100);
        let tree = Tree::build(&points, cube(), 8);
        // Depth 0 has a single cell, so at most 8 points live there.
        let at_root = (0..points.len()).filter(|&i| tree.depth(i) == 0).count();
        assert_eq!(at_root, 8);
    }

    #[test]
    fn test_all_points_assigned() {
        let points = grid(500);
        let tree = Tree::build(&points, cube(), 4);
        let total: usize = (0..=MAX_DEPTH)
            .map(|d| (0..points.len()).filter(|&i| tree.depth(i) == d).count())
            .sum();
        assert_eq!(total, points.len());
    }

    #[test]
    fn test_coincident_points_terminate() {
        let points = vec![[1.0, 1.0, 1.0]; 64];
        let tree = Tree::build(&points, cube(), 2);
        // Two per level until the depth cap absorbs the rest.
        assert_eq!((0..points.len()).filter(|&i| tree.depth(i) == 0).count(), 2);
        assert_eq!((0..points.len()).filter(|&i| tree.depth(i) == 1).count(), 2);
        assert!((0..points.len()).all(|i| tree.depth(i) <= MAX_DEPTH));
    }

    #[test]
    fn test_hierarchy_totals_match_depth_counts() {
        let points = grid(300);
        let tree = Tree::build(&points, cube(), 8);
        let range = DepthRange { begin: 0, end: 4 };
        let value = tree.hierarchy(&points, &cube(), range, false);

        fn total(v: &Value) -> u64 {
            match v {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| if k == "n" { v.as_u64().unwrap_or(0) } else { total(v) })
                    .sum(),
                _ => 0,
            }
        }

        let expected = (0..points.len())
            .filter(|&i| range.contains(tree.depth(i)))
            .count() as u64;
        assert_eq!(total(&value), expected);
    }

    #[test]
    fn test_hierarchy_empty_window() {
        let points = grid(10);
        let tree = Tree::build(&points, cube(), 8);
        let far = Bounds::new([100.0; 3], [200.0; 3]);
        let range = DepthRange { begin: 0, end: 2 };
        assert_eq!(tree.hierarchy(&points, &far, range, false), Value::Null);
    }

    #[test]
    fn test_hierarchy_children_are_spatial() {
        let points = vec![[1.0, 1.0, 1.0], [15.0, 15.0, 15.0], [15.0, 1.0, 1.0]];
        let tree = Tree::build(&points, cube(), 1);
        let range = DepthRange { begin: 0, end: 3 };
        let value = tree.hierarchy(&points, &cube(), range, false);
        let map = value.as_object().unwrap();
        // One point fits at the root; the others descend to quadrant keys.
        assert_eq!(map["n"], 1);
        assert!(map.contains_key("ne") || map.contains_key("se"));
    }
}
