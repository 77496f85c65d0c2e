//! dman - inspect a PostgreSQL server and run SQL batches atomically.
//!
//! This library exposes the core modules for the binary and integration tests.

pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
