//! Docker Engine implementation of [`ContainerRuntime`] over `bollard`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, EndpointSettings, HealthStatusEnum, HostConfig,
};
use bollard::network::ConnectNetworkOptions;
use futures::{StreamExt, TryStreamExt};
use yacu_shared::errors::{YacuError, YacuResult};

use super::{
    ContainerDetails, ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary,
    CreatedContainer, HealthStatus, ImageDetails, NetworkAttachment,
};
use crate::image::TaggedReference;
use crate::options::RegistryEntry;

/// Convert a bollard error, keeping 404s distinguishable.
fn docker_err(context: &str, err: DockerError) -> YacuError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404,
            message,
        } => YacuError::NotFound(format!("{}: {}", context, message)),
        other => YacuError::Runtime(format!("{}: {}", context, other)),
    }
}

/// Docker Engine client.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform default socket, negotiating
    /// the API version with the daemon.
    pub async fn connect() -> YacuResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| docker_err("connecting to docker engine failed", e))?;
        let docker = docker
            .negotiate_version()
            .await
            .map_err(|e| docker_err("negotiating docker API version failed", e))?;
        tracing::debug!("docker engine client initialized");
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, filter: &ContainerFilter) -> YacuResult<Vec<ContainerSummary>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(label) = &filter.label {
            filters.insert("label".into(), vec![label.clone()]);
        }
        if filter.running_only {
            filters.insert("status".into(), vec!["running".into()]);
        }

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: !filter.running_only,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| docker_err("listing containers failed", e))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|name| trim_name(&name).to_string())
                    .unwrap_or_default(),
                image_id: c.image_id.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
                running: c.state.as_deref() == Some("running"),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> YacuResult<ContainerDetails> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| docker_err(&format!("inspecting container {} failed", id), e))?;
        details_from_inspect(response)
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> YacuResult<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_secs }))
            .await
            .map_err(|e| docker_err(&format!("stopping container {} failed", id), e))
    }

    async fn start_container(&self, id: &str) -> YacuResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| docker_err(&format!("starting container {} failed", id), e))
    }

    async fn remove_container(&self, id: &str, force: bool, remove_volumes: bool) -> YacuResult<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    v: remove_volumes,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| docker_err(&format!("removing container {} failed", id), e))
    }

    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
        network: Option<&NetworkAttachment>,
    ) -> YacuResult<CreatedContainer> {
        let container_config: ContainerConfig = serde_json::from_value(spec.config.clone())?;
        let mut config = Config::from(container_config);
        let host_config: HostConfig = serde_json::from_value(spec.host_config.clone())?;
        config.host_config = Some(host_config);

        if let Some(network) = network {
            let endpoint: EndpointSettings = serde_json::from_value(network.endpoint.clone())?;
            config.networking_config = Some(NetworkingConfig {
                endpoints_config: HashMap::from([(network.name.clone(), endpoint)]),
            });
        }

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| docker_err(&format!("creating container {} failed", name), e))?;

        Ok(CreatedContainer {
            id: response.id,
            warnings: response.warnings,
        })
    }

    async fn connect_network(&self, network: &NetworkAttachment, container_id: &str) -> YacuResult<()> {
        let endpoint_config: EndpointSettings = serde_json::from_value(network.endpoint.clone())?;
        self.docker
            .connect_network(
                &network.name,
                ConnectNetworkOptions {
                    container: container_id.to_string(),
                    endpoint_config,
                },
            )
            .await
            .map_err(|e| {
                docker_err(
                    &format!("connecting {} to network {} failed", container_id, network.name),
                    e,
                )
            })
    }

    async fn wait_container(&self, id: &str) -> YacuResult<i64> {
        let mut stream = std::pin::pin!(self.docker.wait_container(
            id,
            Some(WaitContainerOptions {
                condition: "not-running".to_string(),
            }),
        ));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(docker_err(&format!("waiting on container {} failed", id), e)),
            None => Err(YacuError::Runtime(format!(
                "wait stream for container {} ended without a result",
                id
            ))),
        }
    }

    async fn pull_image(
        &self,
        reference: &TaggedReference,
        auth: Option<&RegistryEntry>,
    ) -> YacuResult<()> {
        let credentials = auth.map(|entry| DockerCredentials {
            username: entry.username.clone(),
            password: entry.password.clone(),
            serveraddress: Some(entry.domain.clone()),
            ..Default::default()
        });

        let from_image = format!("{}/{}", reference.domain(), reference.path());
        let options = CreateImageOptions {
            from_image: from_image.as_str(),
            tag: reference.tag(),
            ..Default::default()
        };

        // Drain the progress stream; the pull is only complete at its end.
        self.docker
            .create_image(Some(options), None, credentials)
            .try_for_each(|_| async { Ok(()) })
            .await
            .map_err(|e| docker_err(&format!("pulling image {} failed", reference), e))
    }

    async fn inspect_image(&self, image: &str) -> YacuResult<ImageDetails> {
        let response = self
            .docker
            .inspect_image(image)
            .await
            .map_err(|e| docker_err(&format!("inspecting image {} failed", image), e))?;

        Ok(ImageDetails {
            id: response.id.unwrap_or_default(),
            created: response.created.unwrap_or_default(),
            repo_digests: response.repo_digests.unwrap_or_default(),
        })
    }

    async fn remove_image(&self, id: &str, force: bool) -> YacuResult<()> {
        let removed = self
            .docker
            .remove_image(
                id,
                Some(RemoveImageOptions {
                    force,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map_err(|e| docker_err(&format!("removing image {} failed", id), e))?;
        tracing::debug!(id, response = ?removed, "image removed");
        Ok(())
    }
}

fn trim_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

fn health_from_state(status: Option<HealthStatusEnum>) -> HealthStatus {
    match status {
        Some(HealthStatusEnum::HEALTHY) => HealthStatus::Healthy,
        Some(HealthStatusEnum::UNHEALTHY) => HealthStatus::Unhealthy,
        Some(HealthStatusEnum::STARTING) => HealthStatus::Starting,
        _ => HealthStatus::NoHealthcheck,
    }
}

fn details_from_inspect(response: ContainerInspectResponse) -> YacuResult<ContainerDetails> {
    let id = response
        .id
        .ok_or_else(|| YacuError::Runtime("inspect response without container id".into()))?;
    let config = response
        .config
        .ok_or_else(|| YacuError::Runtime(format!("container {} has no config", id)))?;
    let host_config = response.host_config.unwrap_or_default();
    let state = response.state.unwrap_or_default();

    let networks: BTreeMap<String, serde_json::Value> = response
        .network_settings
        .and_then(|settings| settings.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| -> YacuResult<(String, serde_json::Value)> {
            Ok((name, serde_json::to_value(endpoint)?))
        })
        .collect::<YacuResult<_>>()?;

    Ok(ContainerDetails {
        name: response
            .name
            .as_deref()
            .map(trim_name)
            .unwrap_or_default()
            .to_string(),
        image_id: response.image.unwrap_or_default(),
        image: config.image.clone().unwrap_or_default(),
        labels: config.labels.clone().unwrap_or_default(),
        running: state.running.unwrap_or(false),
        health: health_from_state(state.health.and_then(|h| h.status)),
        network_mode: host_config.network_mode.clone().unwrap_or_default(),
        networks,
        spec: ContainerSpec {
            config: serde_json::to_value(&config)?,
            host_config: serde_json::to_value(&host_config)?,
        },
        id,
    })
}
