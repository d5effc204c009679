//! Shared types for yacu crates.

pub mod errors;

pub use errors::{YacuError, YacuResult};
