//! Service configuration.
//!
//! Configuration is a JSON document (camelCase keys) loaded from the path
//! given on the command line, falling back to built-in defaults. The
//! `arbiter` member is opaque and forwarded to the reader layer untouched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::Deserializer;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("securePort requires both keyFile and certFile")]
    IncompleteTls,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub http: HttpConfig,
    pub paths: Vec<PathBuf>,
    pub cache_bytes: u64,
    pub resource_timeout_minutes: f64,
    pub query_buffers: usize,
    pub auth: Option<AuthConfig>,
    pub arbiter: serde_json::Value,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            paths: ["/greyhound", "~/greyhound", "/entwine", "~/entwine", "/opt/data"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            cache_bytes: 2_000_000_000,
            resource_timeout_minutes: 30.0,
            query_buffers: 1024,
            auth: None,
            arbiter: serde_json::Value::Null,
        }
    }
}

impl Configuration {
    /// Load from `path`, or the built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Configuration, ConfigError> {
        let config = match path {
            None => Configuration::default(),
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        };
        config.validate()
    }

    fn validate(self) -> Result<Configuration, ConfigError> {
        if self.http.secure_port.is_some()
            && (self.http.key_file.is_none() || self.http.cert_file.is_none())
        {
            return Err(ConfigError::IncompleteTls);
        }
        Ok(self)
    }

    /// Search roots with `~` expanded against `$HOME`.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        self.paths
            .iter()
            .map(|p| match (p.strip_prefix("~"), &home) {
                (Ok(rest), Some(home)) => home.join(rest),
                _ => p.clone(),
            })
            .collect()
    }

    /// Idle timeout in seconds, floored at 30.
    pub fn resource_timeout_seconds(&self) -> u64 {
        (self.resource_timeout_minutes * 60.0).max(30.0) as u64
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    pub port: u16,
    pub secure_port: Option<u16>,
    pub key_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Cache-Control".to_string(), "public, max-age=300".to_string());
        headers.insert("Access-Control-Allow-Origin".to_string(), "*".to_string());
        headers.insert(
            "Access-Control-Allow-Methods".to_string(),
            "GET,PUT,POST,DELETE".to_string(),
        );
        Self {
            port: 8080,
            secure_port: None,
            key_file: None,
            cert_file: None,
            headers,
        }
    }
}

/// A string or an array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringList(Vec<String>);

impl StringList {
    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl From<Vec<String>> for StringList {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) => StringList(vec![s]),
            Raw::Many(v) => StringList(v),
        })
    }
}

/// Cache TTLs in minutes: a single number applied to both windows, or
/// separate `good`/`bad` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheMinutes {
    pub good: f64,
    pub bad: f64,
}

impl Default for CacheMinutes {
    fn default() -> Self {
        Self { good: 1.0, bad: 1.0 }
    }
}

impl<'de> Deserialize<'de> for CacheMinutes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Uniform(f64),
            Split { good: f64, bad: f64 },
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Uniform(m) => CacheMinutes { good: m, bad: m },
            Raw::Split { good, bad } => CacheMinutes { good, bad },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub path: String,
    #[serde(default)]
    pub cookies: StringList,
    #[serde(default)]
    pub query_params: StringList,
    #[serde(default)]
    pub cache_minutes: CacheMinutes,
}
