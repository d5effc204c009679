//! Container records as the orchestrator sees them.
//!
//! A [`ContainerRecord`] is built from a fresh inspect every time a container
//! is read and never mutated afterwards. Recreating a container yields a new
//! record with a new id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use yacu_shared::errors::YacuResult;

use crate::image::{ImageRecord, TaggedReference};
use crate::options::YacuOptions;
use crate::runtime::{ContainerDetails, ContainerRuntime, ContainerSpec, HealthStatus, NetworkAttachment};
use crate::util::{days_passed, parse_bool};

// ============================================================================
// Labels
// ============================================================================

/// Per-container opt in/out of scanning; overrides `scanner.scan_all`.
pub const LABEL_ENABLE: &str = "yacu.enable";
/// Per-container `scanner.image_age` override, in days.
pub const LABEL_IMAGE_AGE: &str = "yacu.image_age";
/// Per-container `updater.stop_timeout` override, in seconds.
pub const LABEL_STOP_TIMEOUT: &str = "yacu.stop_timeout";
/// Written by compose for `depends_on`.
pub const LABEL_DEPENDS_ON: &str = "com.docker.compose.depends_on";
/// Web UI address shown in notifications.
pub const LABEL_WEBUI: &str = "net.unraid.docker.webui";

/// Repository path prefix of yacu's own image.
const SELF_REPOSITORY: &str = "terrails/yacu";

// ============================================================================
// Settings
// ============================================================================

/// Effective per-container settings: the global default unless a label
/// carries a parseable override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerSettings {
    pub stop_timeout: i64,
    pub min_image_age: i64,
}

impl ContainerSettings {
    pub fn from_options(options: &YacuOptions) -> Self {
        Self {
            stop_timeout: options.updater.stop_timeout,
            min_image_age: options.scanner.image_age,
        }
    }

    pub fn resolve(&self, labels: &HashMap<String, String>) -> Self {
        Self {
            stop_timeout: label_i64(labels, LABEL_STOP_TIMEOUT).unwrap_or(self.stop_timeout),
            min_image_age: label_i64(labels, LABEL_IMAGE_AGE).unwrap_or(self.min_image_age),
        }
    }
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self::from_options(&YacuOptions::default())
    }
}

fn label_i64(labels: &HashMap<String, String>, key: &str) -> Option<i64> {
    labels.get(key)?.trim().parse().ok()
}

// ============================================================================
// ContainerRecord
// ============================================================================

#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
    pub health: HealthStatus,
    pub network_mode: String,
    /// Attached networks, ordered by name.
    pub networks: Vec<NetworkAttachment>,
    pub spec: ContainerSpec,
    pub image: ImageRecord,
    pub settings: ContainerSettings,
}

impl ContainerRecord {
    /// Inspect container `id` and its image.
    pub async fn load(
        runtime: &dyn ContainerRuntime,
        id: &str,
        defaults: &ContainerSettings,
    ) -> YacuResult<Self> {
        let details = runtime.inspect_container(id).await?;
        Self::from_details(runtime, details, defaults).await
    }

    /// Fails with `RepositoryNotTagged` for digest-pinned images.
    pub async fn from_details(
        runtime: &dyn ContainerRuntime,
        details: ContainerDetails,
        defaults: &ContainerSettings,
    ) -> YacuResult<Self> {
        let reference = TaggedReference::parse(&details.image)?;
        let image_details = runtime.inspect_image(&details.image_id).await?;
        let image = ImageRecord::new(image_details, reference)?;

        Ok(Self {
            settings: defaults.resolve(&details.labels),
            networks: details
                .networks
                .into_iter()
                .map(|(name, endpoint)| NetworkAttachment { name, endpoint })
                .collect(),
            id: details.id,
            name: details.name,
            labels: details.labels,
            running: details.running,
            health: details.health,
            network_mode: details.network_mode,
            spec: details.spec,
            image,
        })
    }

    pub fn reference(&self) -> &TaggedReference {
        &self.image.reference
    }

    /// This container runs yacu itself.
    pub fn is_yacu(&self) -> bool {
        self.reference().path().starts_with(SELF_REPOSITORY)
    }

    /// Inclusion policy of the scanner, applied in order: never self, skip
    /// stopped unless `scan_stopped`, the enable label wins over `scan_all`
    /// and an unparsable enable label excludes.
    pub fn should_scan(&self, scan_all: bool, scan_stopped: bool) -> bool {
        if self.is_yacu() {
            return false;
        }
        if !scan_stopped && !self.running {
            return false;
        }
        match self.labels.get(LABEL_ENABLE) {
            Some(value) => parse_bool(value).unwrap_or(false),
            None => scan_all,
        }
    }

    /// The local image is old enough to consider an update.
    pub fn is_outdated(&self, now: DateTime<Utc>) -> bool {
        days_passed(self.image.created, now) >= self.settings.min_image_age
    }

    pub fn uses_host_network(&self) -> bool {
        self.network_mode == "host"
    }

    /// Network passed to create. The first attachment by name.
    pub fn primary_network(&self) -> Option<&NetworkAttachment> {
        self.networks.first()
    }

    /// Networks to connect after create.
    pub fn remaining_networks(&self) -> &[NetworkAttachment] {
        self.networks.get(1..).unwrap_or_default()
    }

    pub fn webui_url(&self) -> Option<&str> {
        self.labels
            .get(LABEL_WEBUI)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }
}
