//! [`RegistryClient`] over the OCI distribution API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oci_client::client::{ClientConfig, ClientProtocol};
use oci_client::errors::OciDistributionError;
use oci_client::secrets::RegistryAuth;
use oci_client::Client;
use serde::Deserialize;
use yacu_shared::errors::{YacuError, YacuResult};

use super::{RegistryClient, RemoteImageData};
use crate::image::TaggedReference;
use crate::options::RegistryEntry;

/// Only the part of the image config blob we read.
#[derive(Debug, Deserialize)]
struct ImageConfigBlob {
    created: Option<String>,
}

pub struct OciRegistry {
    client: Client,
}

impl OciRegistry {
    /// `insecure_domains` are contacted over plain HTTP.
    pub fn new(insecure_domains: Vec<String>) -> Self {
        let protocol = if insecure_domains.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(insecure_domains)
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });
        Self { client }
    }
}

#[async_trait]
impl RegistryClient for OciRegistry {
    async fn fetch_remote_image_data(
        &self,
        reference: &TaggedReference,
        auth: Option<&RegistryEntry>,
    ) -> YacuResult<RemoteImageData> {
        let target = reference.to_string();
        let oci_ref = reference.as_oci();
        let auth = registry_auth(auth);

        let digest = self
            .client
            .fetch_manifest_digest(oci_ref, &auth)
            .await
            .map_err(|e| registry_err(&target, e))?;

        // Resolves an index to the platform manifest before reading the config.
        let (_, _, config) = self
            .client
            .pull_manifest_and_config(oci_ref, &auth)
            .await
            .map_err(|e| registry_err(&target, e))?;

        let created = parse_created(&target, &config)?;
        tracing::debug!(image = %target, %digest, %created, "Fetched remote image data");

        Ok(RemoteImageData { created, digest })
    }
}

fn registry_auth(entry: Option<&RegistryEntry>) -> RegistryAuth {
    match entry {
        Some(RegistryEntry {
            username: Some(username),
            password,
            ..
        }) => RegistryAuth::Basic(username.clone(), password.clone().unwrap_or_default()),
        _ => RegistryAuth::Anonymous,
    }
}

fn registry_err(target: &str, err: OciDistributionError) -> YacuError {
    match err {
        OciDistributionError::AuthenticationFailure(msg) => {
            YacuError::RegistryAuth(format!("{}: {}", target, msg))
        }
        OciDistributionError::UnauthorizedError { url } => {
            YacuError::RegistryAuth(format!("{}: unauthorized at {}", target, url))
        }
        OciDistributionError::ImageManifestNotFoundError(msg) => {
            YacuError::NotFound(format!("{}: {}", target, msg))
        }
        OciDistributionError::ServerError { code: 404, .. } => {
            YacuError::NotFound(format!("{}: manifest unknown", target))
        }
        OciDistributionError::ServerError {
            code: 401 | 403, ..
        } => YacuError::RegistryAuth(format!("{}: access denied", target)),
        other => YacuError::Registry(format!("{}: {}", target, other)),
    }
}

fn parse_created(target: &str, config: &str) -> YacuResult<DateTime<Utc>> {
    let blob: ImageConfigBlob = serde_json::from_str(config)
        .map_err(|e| YacuError::Registry(format!("{}: malformed image config: {}", target, e)))?;
    let created = blob
        .created
        .ok_or_else(|| YacuError::Registry(format!("{}: image config has no created time", target)))?;

    DateTime::parse_from_rfc3339(&created)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            YacuError::Registry(format!(
                "{}: unknown created time format {}: {}",
                target, created, e
            ))
        })
}
