//! Candidate selection.

use chrono::{DateTime, Utc};
use yacu_shared::errors::{YacuError, YacuResult};

use crate::container::{ContainerRecord, ContainerSettings};
use crate::freshness::FreshnessCache;
use crate::image::TaggedReference;
use crate::notify::Notifications;
use crate::options::ScannerOptions;
use crate::runtime::{ContainerFilter, ContainerRuntime};

/// A container whose registry image is newer than the one it runs.
#[derive(Debug, Clone)]
pub struct UpdateCandidate {
    pub container: ContainerRecord,
}

impl UpdateCandidate {
    pub fn reference(&self) -> &TaggedReference {
        self.container.reference()
    }
}

pub struct Scanner<'a> {
    pub runtime: &'a dyn ContainerRuntime,
    pub freshness: &'a FreshnessCache,
    pub notifications: &'a Notifications,
    pub options: &'a ScannerOptions,
    pub defaults: &'a ContainerSettings,
}

impl Scanner<'_> {
    /// Containers to update in this batch.
    ///
    /// Runtime failures abort the scan. A failed freshness check only drops
    /// that container and is reported as an image error.
    pub async fn scan(&self, now: DateTime<Utc>) -> YacuResult<Vec<UpdateCandidate>> {
        let summaries = self.runtime.list_containers(&ContainerFilter::all()).await?;

        let mut candidates = Vec::new();
        for summary in summaries {
            let container =
                match ContainerRecord::load(self.runtime, &summary.id, self.defaults).await {
                    Ok(container) => container,
                    Err(YacuError::RepositoryNotTagged(image)) => {
                        tracing::debug!(container = %summary.name, %image, "Skipping digest-pinned container");
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(container = %summary.name, error = %e, "Container initialization failed");
                        return Err(e);
                    }
                };

            if !container.should_scan(self.options.scan_all, self.options.scan_stopped) {
                tracing::trace!(container = %container.name, "Not scanning container");
                continue;
            }
            if !container.is_outdated(now) {
                tracing::debug!(container = %container.name, "Image younger than minimum age");
                continue;
            }

            match self.freshness.is_remote_pullable(&container, now).await {
                Ok(true) => candidates.push(UpdateCandidate { container }),
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        container = %container.name,
                        image = %container.reference(),
                        error = %e,
                        "Checking remote image failed"
                    );
                    self.notifications
                        .image_error(&container.image, "Unable to check for updates", &e)
                        .await;
                }
            }
        }
        Ok(candidates)
    }
}
