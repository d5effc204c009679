//! One update batch: scan, pull, recreate, reclaim.
//!
//! Candidates are processed one after another. Any failure inside a
//! candidate is reported and the batch moves on to the next one; only a
//! failing scan ends the batch early.

mod pull;
mod recreate;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use yacu_shared::errors::{YacuError, YacuResult};

use crate::container::ContainerSettings;
use crate::db::{Database, RemoteImageTable};
use crate::dependency::WaitTiming;
use crate::freshness::FreshnessCache;
use crate::image::ImageSet;
use crate::notify::Notifications;
use crate::options::{RegistryEntries, ScannerOptions, UpdaterOptions, YacuOptions};
use crate::reclaim::reclaim_images;
use crate::registry::OciRegistry;
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::scanner::Scanner;

/// Outcome counts of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub candidates: usize,
    pub updated: usize,
    pub failed: usize,
    pub images_removed: usize,
}

/// Attempts for starting a freshly created container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for StartRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

pub struct Updater {
    runtime: Arc<dyn ContainerRuntime>,
    freshness: FreshnessCache,
    notifications: Notifications,
    scanner: ScannerOptions,
    updater: UpdaterOptions,
    registries: RegistryEntries,
    defaults: ContainerSettings,
    wait_timing: WaitTiming,
    start_retry: StartRetry,
}

impl Updater {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        freshness: FreshnessCache,
        notifications: Notifications,
        options: &YacuOptions,
    ) -> Self {
        Self {
            runtime,
            freshness,
            notifications,
            scanner: options.scanner.clone(),
            updater: options.updater.clone(),
            registries: options.registries.clone(),
            defaults: ContainerSettings::from_options(options),
            wait_timing: WaitTiming::default(),
            start_retry: StartRetry::default(),
        }
    }

    /// Wire the Docker runtime, the SQLite store, the OCI registry client
    /// and the configured webhooks.
    pub async fn from_options(options: &YacuOptions) -> YacuResult<Self> {
        let runtime = DockerRuntime::connect().await?;
        let db = Database::open(&options.database.path)?;
        let freshness = FreshnessCache::new(
            Arc::new(RemoteImageTable::new(db)),
            Arc::new(OciRegistry::new(options.registries.insecure_domains())),
            options.registries.clone(),
        );
        let notifications = Notifications::from_options(&options.webhooks);
        Ok(Self::new(Arc::new(runtime), freshness, notifications, options))
    }

    pub fn with_wait_timing(mut self, timing: WaitTiming) -> Self {
        self.wait_timing = timing;
        self
    }

    pub fn with_start_retry(mut self, retry: StartRetry) -> Self {
        self.start_retry = retry;
        self
    }

    pub async fn run(&self) -> BatchReport {
        self.run_at(Utc::now()).await
    }

    /// Run one batch as if the current time were `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> BatchReport {
        let scanner = Scanner {
            runtime: self.runtime.as_ref(),
            freshness: &self.freshness,
            notifications: &self.notifications,
            options: &self.scanner,
            defaults: &self.defaults,
        };

        let candidates = match scanner.scan(now).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "Unable to fetch updates");
                self.notifications.error("Unable to fetch updates", &e).await;
                return BatchReport::default();
            }
        };

        let mut report = BatchReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            tracing::info!("No new updates found");
            return report;
        }
        tracing::info!(count = candidates.len(), "Found new updates");

        let failed_pulls = self.pull_images(&candidates).await;

        let mut replaced = ImageSet::new();
        for candidate in candidates {
            let old = &candidate.container;
            let name = candidate.reference().familiar_tagged();

            if let Some(reason) = failed_pulls.get(&name) {
                report.failed += 1;
                self.notifications
                    .container_error(old, "Unable to pull image", &YacuError::Image(reason.clone()))
                    .await;
                continue;
            }

            match self.recreate(old).await {
                Ok(recreated) => {
                    report.updated += 1;
                    tracing::info!(container = %old.name, image = %name, "Updated container");
                    self.notifications
                        .container_updated(old, &recreated.container, &recreated.warnings)
                        .await;
                    replaced.add(candidate.container.image);
                }
                Err(failure) => {
                    report.failed += 1;
                    tracing::error!(
                        container = %old.name,
                        image = %name,
                        error = %failure.error,
                        "{}", failure.context
                    );
                    self.notifications
                        .container_error(old, failure.context, &failure.error)
                        .await;
                }
            }
        }

        tracing::info!(
            total = report.candidates,
            successful = report.updated,
            "Container updates completed"
        );

        if self.updater.remove_images && !replaced.is_empty() {
            tracing::debug!(count = replaced.len(), "Removing unused images");
            report.images_removed =
                reclaim_images(self.runtime.as_ref(), &self.notifications, replaced).await;
            tracing::info!(count = report.images_removed, "Removed unused images");
        }
        report
    }
}
