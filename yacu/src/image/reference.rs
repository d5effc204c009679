//! Tagged image references on top of [`oci_client::Reference`].
//!
//! Only tagged references are representable: a reference that pins a digest
//! without a tag has no "newer version" and is rejected with
//! [`YacuError::RepositoryNotTagged`].

use std::fmt;

use oci_client::Reference;
use yacu_shared::errors::{YacuError, YacuResult};

const DEFAULT_DOMAIN: &str = "docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";

/// Fully normalized `domain/path:tag` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedReference(Reference);

impl TaggedReference {
    /// Parse and normalize a reference such as `nginx`, `ghcr.io/org/app:1.2`
    /// or `localhost:5000/app:dev`. A digest next to a tag is dropped.
    pub fn parse(reference: &str) -> YacuResult<Self> {
        let reference = reference.trim();
        let parsed: Reference = reference
            .parse()
            .map_err(|e| YacuError::InvalidReference(format!("{}: {}", reference, e)))?;

        let Some(tag) = parsed.tag() else {
            return Err(YacuError::RepositoryNotTagged(reference.to_string()));
        };
        Ok(Self(Reference::with_tag(
            parsed.registry().to_string(),
            parsed.repository().to_string(),
            tag.to_string(),
        )))
    }

    /// Registry domain, e.g. `docker.io` or `ghcr.io`.
    pub fn domain(&self) -> &str {
        self.0.registry()
    }

    /// Repository path within the registry, e.g. `library/nginx`.
    pub fn path(&self) -> &str {
        self.0.repository()
    }

    pub fn tag(&self) -> &str {
        self.0.tag().unwrap_or_default()
    }

    /// The reference in the form the registry client takes.
    pub fn as_oci(&self) -> &Reference {
        &self.0
    }

    /// Short repository name as users type it (`nginx`, `org/app`,
    /// `ghcr.io/org/app`).
    pub fn familiar_name(&self) -> String {
        if self.domain() == DEFAULT_DOMAIN {
            match self.path().strip_prefix(OFFICIAL_REPO_PREFIX) {
                Some(rest) if !rest.contains('/') => rest.to_string(),
                _ => self.path().to_string(),
            }
        } else {
            format!("{}/{}", self.domain(), self.path())
        }
    }

    /// `familiar_name:tag`, the key used for the freshness cache.
    pub fn familiar_tagged(&self) -> String {
        format!("{}:{}", self.familiar_name(), self.tag())
    }
}

impl fmt::Display for TaggedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.whole())
    }
}
