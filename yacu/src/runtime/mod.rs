//! Container runtime capability.
//!
//! The orchestrator only talks to the runtime through [`ContainerRuntime`].
//! Container configuration is carried as an opaque JSON blob
//! ([`ContainerSpec`]) owned by the runtime implementation: it is read on
//! inspect and handed back unchanged on create.

mod docker;

pub use docker::DockerRuntime;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use yacu_shared::errors::YacuResult;

use crate::image::TaggedReference;
use crate::options::RegistryEntry;

/// Restricts which containers [`ContainerRuntime::list_containers`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    /// Only containers carrying this label key.
    pub label: Option<String>,
    /// Only running containers; otherwise stopped ones are included too.
    pub running_only: bool,
}

impl ContainerFilter {
    /// Every container, running or not.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn running_with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            running_only: true,
        }
    }
}

/// Row of a container listing.
#[derive(Debug, Clone, Default)]
pub struct ContainerSummary {
    pub id: String,
    /// Name without the leading `/`.
    pub name: String,
    pub image_id: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The image declares no healthcheck.
    NoHealthcheck,
    Starting,
    Healthy,
    Unhealthy,
}

/// Runtime-owned container configuration reused verbatim on recreation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub config: Value,
    pub host_config: Value,
}

/// One network a container is attached to, with its endpoint settings.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkAttachment {
    pub name: String,
    pub endpoint: Value,
}

/// Result of inspecting a container.
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    pub id: String,
    /// Name without the leading `/`.
    pub name: String,
    pub image_id: String,
    /// Image reference from the container config, as the user wrote it.
    pub image: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
    pub health: HealthStatus,
    /// `HostConfig.NetworkMode`, e.g. `bridge`, `host`, `container:<id>`.
    pub network_mode: String,
    /// Attached networks keyed by name; ordered so the first one is stable.
    pub networks: BTreeMap<String, Value>,
    pub spec: ContainerSpec,
}

/// Result of inspecting an image.
#[derive(Debug, Clone, Default)]
pub struct ImageDetails {
    pub id: String,
    /// RFC 3339 creation time.
    pub created: String,
    /// `name@digest` entries.
    pub repo_digests: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreatedContainer {
    pub id: String,
    pub warnings: Vec<String>,
}

/// Operations the orchestrator needs from a local container engine.
///
/// All calls fail with [`YacuError::Runtime`](yacu_shared::YacuError::Runtime)
/// on connectivity problems and [`YacuError::NotFound`](yacu_shared::YacuError::NotFound)
/// when the target no longer exists.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_containers(&self, filter: &ContainerFilter) -> YacuResult<Vec<ContainerSummary>>;

    async fn inspect_container(&self, id: &str) -> YacuResult<ContainerDetails>;

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> YacuResult<()>;

    async fn start_container(&self, id: &str) -> YacuResult<()>;

    async fn remove_container(&self, id: &str, force: bool, remove_volumes: bool) -> YacuResult<()>;

    /// Create a container named `name` from `spec`, attached to at most one
    /// network; the engine cannot attach several atomically.
    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
        network: Option<&NetworkAttachment>,
    ) -> YacuResult<CreatedContainer>;

    async fn connect_network(&self, network: &NetworkAttachment, container_id: &str) -> YacuResult<()>;

    /// Block until the container is no longer running; returns its exit code.
    async fn wait_container(&self, id: &str) -> YacuResult<i64>;

    /// Pull `reference` to completion.
    async fn pull_image(
        &self,
        reference: &TaggedReference,
        auth: Option<&RegistryEntry>,
    ) -> YacuResult<()>;

    /// Inspect an image by id or reference.
    async fn inspect_image(&self, image: &str) -> YacuResult<ImageDetails>;

    async fn remove_image(&self, id: &str, force: bool) -> YacuResult<()>;
}
