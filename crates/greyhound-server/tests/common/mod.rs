//! Common test utilities for service integration tests.

pub mod dataset;
pub mod harness;

pub use dataset::{ellipsoid_schema, write_ellipsoid, ELLIPSOID_POINTS, STRIDE};
pub use harness::{StubAuth, TestServer};
