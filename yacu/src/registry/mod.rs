//! Remote registry capability.

mod oci;

pub use oci::OciRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use yacu_shared::errors::YacuResult;

use crate::image::TaggedReference;
use crate::options::RegistryEntry;

/// What the registry currently serves for a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImageData {
    pub created: DateTime<Utc>,
    /// Digest of the top-level manifest (or index) the tag points at.
    pub digest: String,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Look up the image `reference` points at. Fails with
    /// `Registry`, `RegistryAuth` or `NotFound`.
    async fn fetch_remote_image_data(
        &self,
        reference: &TaggedReference,
        auth: Option<&RegistryEntry>,
    ) -> YacuResult<RemoteImageData>;
}
