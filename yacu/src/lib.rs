//! yacu keeps a fleet of containers on current images.
//!
//! A batch scans the runtime for containers whose registry image is newer,
//! pulls the new images, recreates each container in place (restarting
//! compose dependents once their condition holds), optionally removes the
//! images left behind, and reports every outcome to the configured
//! notification sinks.

pub mod container;
pub mod db;
pub mod dependency;
pub mod freshness;
pub mod image;
pub mod notify;
pub mod options;
pub mod reclaim;
pub mod registry;
pub mod runtime;
pub mod scanner;
pub mod schedule;
pub mod updater;
pub mod util;

#[cfg(test)]
mod testing;

pub use options::YacuOptions;
pub use schedule::Schedule;
pub use updater::{BatchReport, Updater};
pub use yacu_shared::{YacuError, YacuResult};
