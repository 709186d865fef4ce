//! Spatial index integration test module.
//!
//! These tests drive the public index API over every storage backend.

mod backend_test;
mod lifecycle_test;
mod multi_threaded_test;
mod query_test;
