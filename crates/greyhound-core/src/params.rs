//! Query-parameter model for the resource endpoints.
//!
//! Query strings are JSON-shaped: each value is parsed as JSON where
//! possible (`bounds=[0,0,0,1,1,1]`, `compress=true`) and falls back to a
//! plain string otherwise. Decimal numbers are accepted wherever an integer
//! is expected.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::bounds::Bounds;
use crate::schema::{Offset, Scale, Schema};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("Missing required field {0}")]
    Missing(&'static str),
    #[error("Invalid field {0}")]
    Invalid(&'static str),
    #[error("Cannot specify both depth and depthBegin/depthEnd")]
    DepthConflict,
    #[error("Invalid query - cannot specify bounds and search")]
    BoundsAndSearch,
    #[error("Cannot specify an OriginId and a query")]
    OriginAndQuery,
    #[error("Invalid files query")]
    InvalidFilesQuery,
}

/// Parsed query parameters, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap(BTreeMap<String, Value>);

impl ParamMap {
    /// Parse a raw query string. Values that are not valid JSON are kept
    /// as strings.
    pub fn from_query(query: &str) -> Self {
        let mut map = BTreeMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let parsed = serde_json::from_str(&value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            map.insert(key.to_string(), parsed);
        }
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    fn u64_lossy(&self, key: &'static str) -> Result<Option<u64>, ParamError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => match v {
                // Decimals are permitted where integers are expected.
                Value::Number(n) => n
                    .as_u64()
                    .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                    .map(Some)
                    .ok_or(ParamError::Invalid(key)),
                _ => Err(ParamError::Invalid(key)),
            },
        }
    }

    fn bool_lossy(&self, key: &'static str) -> Result<bool, ParamError> {
        match self.0.get(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => Ok(s == "true"),
            Some(_) => Err(ParamError::Invalid(key)),
        }
    }

    fn typed<T: serde::de::DeserializeOwned>(
        &self,
        key: &'static str,
    ) -> Result<Option<T>, ParamError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|_| ParamError::Invalid(key)),
        }
    }
}

/// A half-open depth range; `end == 0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRange {
    pub begin: u64,
    pub end: u64,
}

impl DepthRange {
    pub fn contains(&self, depth: u64) -> bool {
        depth >= self.begin && (self.end == 0 || depth < self.end)
    }

    fn parse(map: &ParamMap) -> Result<DepthRange, ParamError> {
        let depth = map.u64_lossy("depth")?;
        let begin = map.u64_lossy("depthBegin")?;
        let end = map.u64_lossy("depthEnd")?;

        match depth {
            Some(d) => {
                if begin.is_some() || end.is_some() {
                    Err(ParamError::DepthConflict)
                } else {
                    Ok(DepthRange { begin: d, end: d + 1 })
                }
            }
            None => Ok(DepthRange {
                begin: begin.unwrap_or(0),
                end: end.unwrap_or(0),
            }),
        }
    }
}

/// Parameters of a `/read` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadParams {
    pub bounds: Option<Bounds>,
    pub depth: DepthRange,
    pub schema: Option<Schema>,
    pub filter: Option<Value>,
    pub scale: Option<Scale>,
    pub offset: Option<Offset>,
    pub compress: bool,
}

impl ReadParams {
    pub fn parse(map: &ParamMap) -> Result<Self, ParamError> {
        if map.get("bounds").is_some() && map.get("search").is_some() {
            return Err(ParamError::BoundsAndSearch);
        }
        Ok(Self {
            bounds: map.typed("bounds")?,
            depth: DepthRange::parse(map)?,
            schema: map.typed("schema")?,
            filter: map.get("filter").cloned(),
            scale: map.typed("scale")?,
            offset: map.typed("offset")?,
            compress: map.bool_lossy("compress")?,
        })
    }
}

/// Parameters of a `/hierarchy` request.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyParams {
    pub bounds: Bounds,
    pub depth: DepthRange,
    pub vertical: bool,
    pub scale: Option<Scale>,
    pub offset: Option<Offset>,
}

impl HierarchyParams {
    pub fn parse(map: &ParamMap) -> Result<Self, ParamError> {
        let bounds = map.typed("bounds")?.ok_or(ParamError::Missing("bounds"))?;
        let begin = map
            .u64_lossy("depthBegin")?
            .ok_or(ParamError::Missing("depthBegin"))?;
        let end = map
            .u64_lossy("depthEnd")?
            .ok_or(ParamError::Missing("depthEnd"))?;
        if end <= begin {
            return Err(ParamError::Invalid("depthEnd"));
        }
        Ok(Self {
            bounds,
            depth: DepthRange { begin, end },
            vertical: map.bool_lossy("vertical")?,
            scale: map.typed("scale")?,
            offset: map.typed("offset")?,
        })
    }
}

/// One term of a `/files` search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSearch {
    Origin(u64),
    Path(String),
}

impl FileSearch {
    fn from_value(value: &Value) -> Result<FileSearch, ParamError> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(FileSearch::Origin)
                .ok_or(ParamError::InvalidFilesQuery),
            Value::String(s) => Ok(FileSearch::Path(s.clone())),
            _ => Err(ParamError::InvalidFilesQuery),
        }
    }
}

/// The three mutually exclusive modes of a `/files` request.
#[derive(Debug, Clone, PartialEq)]
pub enum FilesQuery {
    /// No query: every source path.
    All,
    /// Lookup by origin id or path; `single` controls the response shape.
    Search { terms: Vec<FileSearch>, single: bool },
    /// Source files whose footprint overlaps the given bounds.
    Bounds {
        bounds: Bounds,
        scale: Option<Scale>,
        offset: Option<Offset>,
    },
}

impl FilesQuery {
    /// Parse a `/files` query, with `segment` carrying the trailing path
    /// element of `/files/{id}` when present. A numeric segment searches by
    /// origin id, anything else by path.
    pub fn parse(map: &ParamMap, segment: Option<&str>) -> Result<Self, ParamError> {
        let mut map = map.clone();
        if let Some(root) = segment.filter(|s| !s.is_empty()) {
            if !map.is_empty() {
                return Err(ParamError::OriginAndQuery);
            }
            let search = match root.parse::<u64>() {
                Ok(id) => Value::from(id),
                Err(_) => Value::String(root.to_string()),
            };
            map.insert("search", search);
        }

        if map.is_empty() {
            return Ok(FilesQuery::All);
        }

        if map.get("bounds").is_some() && map.get("search").is_some() {
            return Err(ParamError::BoundsAndSearch);
        }

        if let Some(bounds) = map.typed("bounds")? {
            return Ok(FilesQuery::Bounds {
                bounds,
                scale: map.typed("scale")?,
                offset: map.typed("offset")?,
            });
        }

        match map.get("search") {
            Some(Value::Array(values)) => Ok(FilesQuery::Search {
                terms: values
                    .iter()
                    .map(FileSearch::from_value)
                    .collect::<Result<_, _>>()?,
                single: false,
            }),
            Some(value) => Ok(FilesQuery::Search {
                terms: vec![FileSearch::from_value(value)?],
                single: true,
            }),
            None => Err(ParamError::InvalidFilesQuery),
        }
    }
}
