//! Point schemas and the fixed-stride wire encoding of point records.
//!
//! A schema is an ordered list of dimensions, each with a name, a numeric
//! kind, and a byte size. The wire form of a point is the little-endian
//! concatenation of its dimension values in schema order; the stride is the
//! sum of the dimension sizes.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric kind of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimType {
    Signed,
    Unsigned,
    Floating,
}

/// One dimension of a point schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DimType,
    pub size: usize,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("empty schema")]
    Empty,
    #[error("dimension {name}: invalid size {size}")]
    InvalidSize { name: String, size: usize },
    #[error("dimension {0}: floating size must be 4 or 8")]
    InvalidFloating(String),
}

impl Dimension {
    pub fn new(name: impl Into<String>, kind: DimType, size: usize) -> Self {
        Self { name: name.into(), kind, size }
    }

    fn validate(&self) -> Result<(), SchemaError> {
        match self.kind {
            DimType::Floating if !matches!(self.size, 4 | 8) => {
                Err(SchemaError::InvalidFloating(self.name.clone()))
            }
            _ if !matches!(self.size, 1 | 2 | 4 | 8) => Err(SchemaError::InvalidSize {
                name: self.name.clone(),
                size: self.size,
            }),
            _ => Ok(()),
        }
    }

    /// Append the little-endian wire form of `value` for this dimension.
    ///
    /// Integer kinds round and saturate at their representable range.
    pub fn encode(&self, value: f64, out: &mut Vec<u8>) {
        match (self.kind, self.size) {
            (DimType::Floating, 4) => out.extend_from_slice(&(value as f32).to_le_bytes()),
            (DimType::Floating, _) => out.extend_from_slice(&value.to_le_bytes()),
            (DimType::Signed, 1) => out.extend_from_slice(&(value.round() as i8).to_le_bytes()),
            (DimType::Signed, 2) => out.extend_from_slice(&(value.round() as i16).to_le_bytes()),
            (DimType::Signed, 4) => out.extend_from_slice(&(value.round() as i32).to_le_bytes()),
            (DimType::Signed, _) => out.extend_from_slice(&(value.round() as i64).to_le_bytes()),
            (DimType::Unsigned, 1) => out.extend_from_slice(&(value.round() as u8).to_le_bytes()),
            (DimType::Unsigned, 2) => out.extend_from_slice(&(value.round() as u16).to_le_bytes()),
            (DimType::Unsigned, 4) => out.extend_from_slice(&(value.round() as u32).to_le_bytes()),
            (DimType::Unsigned, _) => out.extend_from_slice(&(value.round() as u64).to_le_bytes()),
        }
    }

    /// Decode one value from the start of `bytes`.
    ///
    /// `bytes` must hold at least `self.size` bytes; the caller advances by
    /// the dimension size.
    pub fn decode(&self, bytes: &[u8]) -> f64 {
        let take = |n: usize| -> [u8; 8] {
            let mut out = [0u8; 8];
            out[..n].copy_from_slice(&bytes[..n]);
            out
        };
        match (self.kind, self.size) {
            (DimType::Floating, 4) => {
                f64::from(f32::from_le_bytes(bytes[..4].try_into().unwrap_or_default()))
            }
            (DimType::Floating, _) => f64::from_le_bytes(take(8)),
            (DimType::Signed, n) => {
                let raw = u64::from_le_bytes(take(n));
                // Sign-extend from the dimension width.
                let shift = 64 - 8 * n as u32;
                ((raw << shift) as i64 >> shift) as f64
            }
            (DimType::Unsigned, n) => u64::from_le_bytes(take(n)) as f64,
        }
    }
}

/// An ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema(Vec<Dimension>);

impl Schema {
    pub fn new(dims: Vec<Dimension>) -> Result<Self, SchemaError> {
        if dims.is_empty() {
            return Err(SchemaError::Empty);
        }
        for dim in &dims {
            dim.validate()?;
        }
        Ok(Self(dims))
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.0
    }

    /// Byte size of one encoded point record.
    pub fn stride(&self) -> usize {
        self.0.iter().map(|d| d.size).sum()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dims = Vec::<Dimension>::deserialize(deserializer)?;
        Schema::new(dims).map_err(de::Error::custom)
    }
}

/// Per-axis multiplier used to decode integer-encoded coordinates.
///
/// JSON form is a single number (applied to all axes) or a 3-array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Scale(pub [f64; 3]);

/// Per-axis additive term paired with [`Scale`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Offset(pub [f64; 3]);

fn triple<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 3], D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Uniform(f64),
        Axes([f64; 3]),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Uniform(v) => [v; 3],
        Raw::Axes(a) => a,
    })
}

impl<'de> Deserialize<'de> for Scale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        triple(deserializer).map(Scale)
    }
}

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        triple(deserializer).map(Offset)
    }
}
