//! Rate-limited staleness check against the remote registry.
//!
//! `min_image_age` is used twice: as the minimum age of an image before it
//! is replaced, and as the minimum time between two registry checks of the
//! same name. The two checks are kept apart as [`is_young`] and
//! [`recheck_due`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use yacu_shared::errors::YacuResult;

use crate::container::ContainerRecord;
use crate::db::{RemoteImageRow, RemoteImageStore};
use crate::image::ImageRecord;
use crate::options::RegistryEntries;
use crate::registry::{RegistryClient, RemoteImageData};
use crate::util::days_passed;

/// Image created fewer than `min_age` days before `now`.
pub fn is_young(created: DateTime<Utc>, now: DateTime<Utc>, min_age: i64) -> bool {
    days_passed(created, now) < min_age
}

/// At least `min_age` days passed since the last registry check.
pub fn recheck_due(last_check: DateTime<Utc>, now: DateTime<Utc>, min_age: i64) -> bool {
    days_passed(last_check, now) >= min_age
}

pub struct FreshnessCache {
    store: Arc<dyn RemoteImageStore>,
    registry: Arc<dyn RegistryClient>,
    registries: RegistryEntries,
}

impl FreshnessCache {
    pub fn new(
        store: Arc<dyn RemoteImageStore>,
        registry: Arc<dyn RegistryClient>,
        registries: RegistryEntries,
    ) -> Self {
        Self {
            store,
            registry,
            registries,
        }
    }

    /// Last recorded registry state for a familiar `repo:tag`.
    pub fn cached(&self, name: &str) -> YacuResult<Option<RemoteImageRow>> {
        self.store.get_by_name(name)
    }

    /// Whether the registry serves a newer image than `container` runs.
    ///
    /// Calls the registry only for names never seen before, or whose stored
    /// image is old enough and whose last check is at least
    /// `min_image_age` days ago.
    pub async fn is_remote_pullable(
        &self,
        container: &ContainerRecord,
        now: DateTime<Utc>,
    ) -> YacuResult<bool> {
        let reference = container.reference();
        let name = reference.familiar_tagged();
        let min_age = container.settings.min_image_age;

        let remote = match self.store.get_by_name(&name)? {
            None => {
                let remote = self.fetch(container).await?;
                self.store.insert(
                    &name,
                    reference.domain(),
                    remote.created,
                    &remote.digest,
                    now,
                )?;
                remote
            }
            Some(row) => {
                if is_young(row.created, now, min_age) {
                    tracing::debug!(image = %name, "Image up to date");
                    return Ok(false);
                }
                if !recheck_due(row.last_check, now, min_age) {
                    tracing::debug!(image = %name, last_check = %row.last_check, "Registry checked recently");
                    return Ok(false);
                }

                let remote = self.fetch(container).await?;
                self.store
                    .update_created_and_digest(row.id, remote.created, &remote.digest)?;
                self.store.update_last_check(row.id, now)?;
                remote
            }
        };

        Ok(is_newer(&remote, &container.image, now, min_age, &name))
    }

    async fn fetch(&self, container: &ContainerRecord) -> YacuResult<RemoteImageData> {
        let reference = container.reference();
        self.registry
            .fetch_remote_image_data(reference, self.registries.find(reference.domain()))
            .await
    }
}

fn is_newer(
    remote: &RemoteImageData,
    local: &ImageRecord,
    now: DateTime<Utc>,
    min_age: i64,
    name: &str,
) -> bool {
    if is_young(remote.created, now, min_age) {
        tracing::debug!(image = %name, "Remote image too young");
        return false;
    }
    if local.has_repo_digest(&remote.digest) {
        tracing::debug!(image = %name, "Image up to date");
        return false;
    }
    tracing::debug!(image = %name, digest = %remote.digest, "Image added to update queue");
    true
}
