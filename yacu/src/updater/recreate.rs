//! Replacing one container with a copy running the new image.
//!
//! Sequence: stop dependents, stop, remove, create on one network, connect
//! the remaining networks, inspect, start, start dependents. A failed step
//! ends the sequence where it is; nothing is rolled back.

use yacu_shared::errors::YacuError;

use super::Updater;
use crate::container::ContainerRecord;
use crate::dependency::Dependents;

pub(super) struct Recreated {
    pub container: ContainerRecord,
    /// Non-fatal problems met along the way.
    pub warnings: Vec<String>,
}

/// The step that ended a recreation and why.
pub(super) struct StepFailure {
    pub context: &'static str,
    pub error: YacuError,
}

fn step(context: &'static str) -> impl FnOnce(YacuError) -> StepFailure {
    move |error| StepFailure { context, error }
}

impl Updater {
    pub(super) async fn recreate(&self, old: &ContainerRecord) -> Result<Recreated, StepFailure> {
        let runtime = self.runtime.as_ref();
        let mut warnings = Vec::new();
        tracing::debug!(container = %old.name, "Updating container");

        let should_restart = old.running;
        let dependents = if should_restart {
            let dependents = Dependents::discover(runtime, &old.name, &self.defaults)
                .await
                .map_err(step("Unable to fetch depending containers"))?;

            let stop_warnings = dependents.stop(runtime).await;
            if !stop_warnings.is_empty() {
                tracing::warn!(container = %old.name, warnings = ?stop_warnings, "Received warnings while stopping depending containers");
            }
            warnings.extend(stop_warnings);

            tracing::debug!(container = %old.name, "Stopping container");
            runtime
                .stop_container(&old.id, old.settings.stop_timeout)
                .await
                .map_err(step("Unable to stop container"))?;
            dependents
        } else {
            Dependents::default()
        };

        // The engine attaches a single network on create.
        let network = old.primary_network().cloned();

        tracing::debug!(container = %old.name, "Removing container");
        runtime
            .remove_container(&old.id, true, self.updater.remove_volumes)
            .await
            .map_err(step("Unable to remove container"))?;

        tracing::debug!(container = %old.name, "Creating container");
        let created = runtime
            .create_container(&old.name, &old.spec, network.as_ref())
            .await
            .map_err(step("Unable to create container"))?;
        if !created.warnings.is_empty() {
            tracing::warn!(container = %old.name, warnings = ?created.warnings, "Received warnings while creating container");
        }
        warnings.extend(created.warnings);

        if !old.uses_host_network() {
            for attachment in old.remaining_networks() {
                tracing::debug!(container = %old.name, network = %attachment.name, "Connecting container to network");
                if let Err(e) = runtime.connect_network(attachment, &created.id).await {
                    tracing::error!(container = %old.name, network = %attachment.name, error = %e, "Connecting to network failed");
                    warnings.push(format!(
                        "connecting to network {} failed: {}",
                        attachment.name, e
                    ));
                }
            }
        }

        let current = ContainerRecord::load(runtime, &created.id, &self.defaults)
            .await
            .map_err(step("Unable to inspect container"))?;

        if should_restart {
            self.start_with_retry(&current)
                .await
                .map_err(step("Unable to start container"))?;

            let start_warnings = dependents
                .start(runtime, &current.id, &self.wait_timing)
                .await;
            if !start_warnings.is_empty() {
                tracing::warn!(container = %old.name, warnings = ?start_warnings, "Received warnings while starting depending containers");
            }
            warnings.extend(start_warnings);
        }

        Ok(Recreated {
            container: current,
            warnings,
        })
    }

    /// A container created a moment ago sometimes fails its first start.
    async fn start_with_retry(&self, container: &ContainerRecord) -> Result<(), YacuError> {
        let mut attempt = 1;
        loop {
            match self.runtime.start_container(&container.id).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.start_retry.attempts => {
                    tracing::error!(container = %container.name, error = %e, "Failed to start container");
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(container = %container.name, attempt, error = %e, "Start failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.start_retry.delay).await;
                }
            }
        }
    }
}
