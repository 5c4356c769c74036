//! Gateway configuration.
//!
//! Loaded from TOML; every field has a default, so an empty or missing file
//! yields a mock-backed gateway with in-memory threads.

pub mod types;

pub use types::*;
