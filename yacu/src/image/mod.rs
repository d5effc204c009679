//! Local image records.

mod reference;
mod set;

pub use reference::TaggedReference;
pub use set::ImageSet;

use chrono::{DateTime, Utc};
use yacu_shared::errors::{YacuError, YacuResult};

use crate::runtime::ImageDetails;

/// A local image as resolved for one tagged reference.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: String,
    pub created: DateTime<Utc>,
    pub reference: TaggedReference,
    /// Digest of the `name@digest` entry matching `reference`, if the image
    /// was ever pulled from (or pushed to) that repository.
    pub repo_digest: Option<String>,
    pub repo_digests: Vec<String>,
}

impl ImageRecord {
    pub fn new(details: ImageDetails, reference: TaggedReference) -> YacuResult<Self> {
        let created = DateTime::parse_from_rfc3339(&details.created)
            .map_err(|e| {
                YacuError::Image(format!(
                    "unknown time format {} for image {}: {}",
                    details.created, details.id, e
                ))
            })?
            .with_timezone(&Utc);

        let repo_digest = find_repo_digest(&details.repo_digests, &reference);

        Ok(Self {
            id: details.id,
            created,
            reference,
            repo_digest,
            repo_digests: details.repo_digests,
        })
    }

    /// True if any local `name@digest` entry carries `digest`.
    pub fn has_repo_digest(&self, digest: &str) -> bool {
        self.repo_digests
            .iter()
            .any(|entry| entry.split_once('@').is_some_and(|(_, d)| d == digest))
    }
}

fn find_repo_digest(repo_digests: &[String], reference: &TaggedReference) -> Option<String> {
    let familiar = reference.familiar_name();
    let qualified = format!("{}/{}", reference.domain(), reference.path());
    repo_digests.iter().find_map(|entry| {
        let (name, digest) = entry.split_once('@')?;
        (name == familiar || name == qualified).then(|| digest.to_string())
    })
}
