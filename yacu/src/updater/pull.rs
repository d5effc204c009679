//! Image pulls, once per distinct repository and tag.

use std::collections::{HashMap, HashSet};

use yacu_shared::errors::{YacuError, YacuResult};

use super::Updater;
use crate::image::{ImageRecord, TaggedReference};
use crate::scanner::UpdateCandidate;

impl Updater {
    /// Pull the images of all candidates before any container is touched.
    ///
    /// Returns the failures keyed by familiar `repo:tag`. Each failure is
    /// reported once as an image error.
    pub(super) async fn pull_images(&self, candidates: &[UpdateCandidate]) -> HashMap<String, String> {
        let mut seen = HashSet::new();
        let mut failed = HashMap::new();

        for candidate in candidates {
            let name = candidate.reference().familiar_tagged();
            if !seen.insert(name.clone()) {
                continue;
            }

            if let Err((context, e)) = self.pull_one(candidate).await {
                tracing::error!(image = %name, error = %e, "{}", context);
                self.notifications
                    .image_error(&candidate.container.image, context, &e)
                    .await;
                failed.insert(name, format!("{}: {}", context, e));
            }
        }
        failed
    }

    async fn pull_one(
        &self,
        candidate: &UpdateCandidate,
    ) -> Result<(), (&'static str, YacuError)> {
        let reference = candidate.reference();

        match self.is_latest_present(reference).await {
            Ok(true) => {
                tracing::debug!(image = %reference, "Latest image already present");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => return Err(("Unable to check if image is latest", e)),
        }

        tracing::debug!(image = %reference, "Pulling image");
        self.runtime
            .pull_image(reference, self.registries.find(reference.domain()))
            .await
            .map_err(|e| ("Unable to pull image", e))?;

        let details = self
            .runtime
            .inspect_image(&reference.to_string())
            .await
            .map_err(|e| ("Unable to inspect image", e))?;
        let pulled = ImageRecord::new(details, reference.clone())
            .map_err(|e| ("Unable to initialize image", e))?;

        tracing::info!(image = %reference, id = %pulled.id, "Pulled image");
        self.notifications
            .image_updated(&candidate.container.image, &pulled)
            .await;
        Ok(())
    }

    /// The image the runtime holds for `reference` is the one last seen in
    /// the registry, by creation time or digest.
    async fn is_latest_present(&self, reference: &TaggedReference) -> YacuResult<bool> {
        let local = match self.runtime.inspect_image(&reference.to_string()).await {
            Ok(details) => details,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        let Some(remote) = self.freshness.cached(&reference.familiar_tagged())? else {
            return Ok(false);
        };

        let local = ImageRecord::new(local, reference.clone())?;
        Ok(local.created == remote.created || local.has_repo_digest(&remote.digest))
    }
}
