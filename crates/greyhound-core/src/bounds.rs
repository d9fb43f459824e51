//! Axis-aligned spatial bounds.
//!
//! Bounds travel on the wire as a flat JSON array, either
//! `[xmin, ymin, zmin, xmax, ymax, zmax]` or the two-dimensional form
//! `[xmin, ymin, xmax, ymax]`, which is accepted on input and inflated to
//! cover the full vertical extent.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::schema::{Offset, Scale};

/// An axis-aligned box in native coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    min: [f64; 3],
    max: [f64; 3],
}

impl Bounds {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> [f64; 3] {
        self.min
    }

    pub fn max(&self) -> [f64; 3] {
        self.max
    }

    /// Center point, used to split into child octants.
    pub fn mid(&self) -> [f64; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    pub fn valid(&self) -> bool {
        (0..3).all(|i| self.min[i] <= self.max[i])
    }

    /// Inclusive containment on every axis.
    pub fn contains(&self, point: [f64; 3]) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    pub fn overlaps(&self, other: &Bounds) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }

    /// The child box selected by `index`.
    ///
    /// Bit 0 selects the high-x half, bit 1 the high-y half, and, when
    /// `vertical` is set, bit 2 the high-z half. Without `vertical` the
    /// child spans the full z extent.
    pub fn split(&self, index: usize, vertical: bool) -> Bounds {
        let mid = self.mid();
        let mut min = self.min;
        let mut max = self.max;

        if index & 1 != 0 {
            min[0] = mid[0];
        } else {
            max[0] = mid[0];
        }
        if index & 2 != 0 {
            min[1] = mid[1];
        } else {
            max[1] = mid[1];
        }
        if vertical {
            if index & 4 != 0 {
                min[2] = mid[2];
            } else {
                max[2] = mid[2];
            }
        }

        Bounds { min, max }
    }

    /// The child index a point falls into, complementary to [`split`].
    ///
    /// [`split`]: Bounds::split
    pub fn child_index(&self, point: [f64; 3], vertical: bool) -> usize {
        let mid = self.mid();
        let mut index = 0;
        if point[0] >= mid[0] {
            index |= 1;
        }
        if point[1] >= mid[1] {
            index |= 2;
        }
        if vertical && point[2] >= mid[2] {
            index |= 4;
        }
        index
    }

    /// Transform scaled/offset coordinates back to native units.
    pub fn unscale(&self, scale: Option<&Scale>, offset: Option<&Offset>) -> Bounds {
        let s = scale.map_or([1.0; 3], |s| s.0);
        let o = offset.map_or([0.0; 3], |o| o.0);
        Bounds {
            min: [
                self.min[0] * s[0] + o[0],
                self.min[1] * s[1] + o[1],
                self.min[2] * s[2] + o[2],
            ],
            max: [
                self.max[0] * s[0] + o[0],
                self.max[1] * s[1] + o[1],
                self.max[2] * s[2] + o[2],
            ],
        }
    }

    /// Direction key for a child index, entwine-style: `sw`, `neu`, ...
    pub fn direction_token(index: usize, vertical: bool) -> &'static str {
        const FLAT: [&str; 4] = ["sw", "se", "nw", "ne"];
        const FULL: [&str; 8] = ["swd", "sed", "nwd", "ned", "swu", "seu", "nwu", "neu"];
        if vertical { FULL[index] } else { FLAT[index] }
    }
}

impl Serialize for Bounds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(6))?;
        for v in self.min.iter().chain(self.max.iter()) {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BoundsVisitor;

        impl<'de> Visitor<'de> for BoundsVisitor {
            type Value = Bounds;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an array of 4 or 6 numbers")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Bounds, A::Error> {
                let mut values = Vec::with_capacity(6);
                while let Some(v) = seq.next_element::<f64>()? {
                    if values.len() == 6 {
                        return Err(de::Error::invalid_length(7, &self));
                    }
                    values.push(v);
                }

                match values.len() {
                    6 => Ok(Bounds::new(
                        [values[0], values[1], values[2]],
                        [values[3], values[4], values[5]],
                    )),
                    // 2D form: span the full vertical extent.
                    4 => Ok(Bounds::new(
                        [values[0], values[1], f64::MIN],
                        [values[2], values[3], f64::MAX],
                    )),
                    n => Err(de::Error::invalid_length(n, &self)),
                }
            }
        }

        deserializer.deserialize_seq(BoundsVisitor)
    }
}
