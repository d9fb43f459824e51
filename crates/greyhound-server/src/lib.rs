//! HTTP streaming service over pre-built point-cloud indexes.
//!
//! The service resolves resource names to shared, reference-counted
//! readers, answers metadata and hierarchy queries as JSON, and streams
//! binary point data with bounded memory:
//!
//! 1. The [`Manager`] caches one [`TimedReader`](manager::TimedReader) per
//!    resource and evicts idle ones on a sweeper task.
//! 2. `/read` handlers step a [`ReadQuery`](query::ReadQuery) on a blocking
//!    worker, producing into a buffer from the fixed-size
//!    [`BufferPool`](pool::BufferPool).
//! 3. The [`Chunker`](chunker::Chunker) hands chunks to the response body
//!    through a bounded channel, turning client disconnects into prompt
//!    producer cancellation.
//! 4. Optional [`Auth`](auth::Auth) caches upstream authorization
//!    decisions per user and resource.

pub mod app;
pub mod auth;
pub mod chunker;
pub mod config;
pub mod error;
pub mod manager;
pub mod pool;
pub mod query;
pub mod resource;
pub mod router;

pub use app::{App, AppError};
pub use auth::{Auth, AuthInput};
pub use chunker::{Chunker, Payload};
pub use config::{AuthConfig, CacheMinutes, ConfigError, Configuration, HttpConfig, StringList};
pub use error::HttpError;
pub use manager::{Manager, TimedReader};
pub use pool::{BufferPool, PooledBuffer};
pub use query::ReadQuery;
pub use resource::Resource;
pub use router::Router;
