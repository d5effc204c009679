//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use yacu_shared::errors::{YacuError, YacuResult};

use crate::container::ContainerRecord;
use crate::image::{ImageRecord, TaggedReference};
use crate::notify::Notifier;
use crate::options::RegistryEntry;
use crate::registry::{RegistryClient, RemoteImageData};
use crate::runtime::{
    ContainerDetails, ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary,
    CreatedContainer, HealthStatus, ImageDetails, NetworkAttachment,
};

/// Details of a running container on the default bridge network.
pub fn container_details(id: &str, name: &str, image: &str) -> ContainerDetails {
    ContainerDetails {
        id: id.to_string(),
        name: name.to_string(),
        image_id: local_image_id(image),
        image: image.to_string(),
        labels: HashMap::new(),
        running: true,
        health: HealthStatus::NoHealthcheck,
        network_mode: "bridge".to_string(),
        networks: BTreeMap::from([("bridge".to_string(), json!({}))]),
        spec: ContainerSpec::default(),
    }
}

pub fn image_record(reference: &str, id: &str) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        created: Utc::now(),
        reference: TaggedReference::parse(reference).unwrap(),
        repo_digest: None,
        repo_digests: vec![],
    }
}

fn local_image_id(image: &str) -> String {
    format!("sha256:local-{}", image)
}

fn image_key(image: &str) -> String {
    TaggedReference::parse(image)
        .map(|r| r.familiar_tagged())
        .unwrap_or_else(|_| image.to_string())
}

// ============================================================================
// FakeRuntime
// ============================================================================

#[derive(Default)]
struct RuntimeState {
    containers: BTreeMap<String, ContainerDetails>,
    images: HashMap<String, ImageDetails>,
    /// familiar `repo:tag` -> image id
    tags: HashMap<String, String>,
    /// Images served by `pull_image`, by familiar `repo:tag`.
    remote: HashMap<String, ImageDetails>,
    /// `op:target` -> remaining failures (`None` = always).
    failures: HashMap<String, Option<usize>>,
    health: HashMap<String, VecDeque<HealthStatus>>,
    /// Exit code reported by `wait_container`; `None` never returns.
    exit_codes: HashMap<String, Option<i64>>,
    create_warnings: Vec<String>,
    calls: Vec<String>,
    next_id: usize,
}

impl RuntimeState {
    /// Fails the call if a failure is registered for `op` on the id or name.
    fn check(&mut self, op: &str, targets: &[&str]) -> YacuResult<()> {
        for target in targets {
            let key = format!("{}:{}", op, target);
            if let Some(remaining) = self.failures.get_mut(&key) {
                match remaining {
                    None => return Err(YacuError::Runtime(format!("{} failed", key))),
                    Some(0) => {}
                    Some(n) => {
                        *n -= 1;
                        return Err(YacuError::Runtime(format!("{} failed", key)));
                    }
                }
            }
        }
        Ok(())
    }

    fn name_of(&self, id: &str) -> YacuResult<String> {
        self.containers
            .get(id)
            .map(|c| c.name.clone())
            .ok_or_else(|| YacuError::NotFound(format!("container {}", id)))
    }
}

/// Scriptable [`ContainerRuntime`]. Failures, health and exit codes are
/// keyed by container name so they also apply to recreated containers.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<RuntimeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container and its local image.
    pub fn add_container(
        &self,
        mut details: ContainerDetails,
        image_created: DateTime<Utc>,
        repo_digests: &[&str],
    ) {
        details.spec.config = json!({ "Image": details.image, "Labels": details.labels });
        let mut state = self.state.lock();
        state.images.insert(
            details.image_id.clone(),
            ImageDetails {
                id: details.image_id.clone(),
                created: image_created.to_rfc3339(),
                repo_digests: repo_digests.iter().map(|s| s.to_string()).collect(),
            },
        );
        state
            .tags
            .insert(image_key(&details.image), details.image_id.clone());
        state.containers.insert(details.id.clone(), details);
    }

    /// Make `pull_image(reference)` produce a new local image.
    pub fn add_remote_image(&self, reference: &str, id: &str, created: DateTime<Utc>, digest: &str) {
        let key = image_key(reference);
        let name = key.rsplit_once(':').map(|(n, _)| n).unwrap_or(&key);
        self.state.lock().remote.insert(
            key.clone(),
            ImageDetails {
                id: id.to_string(),
                created: created.to_rfc3339(),
                repo_digests: vec![format!("{}@{}", name, digest)],
            },
        );
    }

    /// Fail every `op` call on a container id/name or image key. Listings
    /// match `*`, or the label filter (`all` when unfiltered).
    pub fn fail(&self, op: &str, target: &str) {
        self.state
            .lock()
            .failures
            .insert(format!("{}:{}", op, target), None);
    }

    /// Fail the next `times` calls only.
    pub fn fail_times(&self, op: &str, target: &str, times: usize) {
        self.state
            .lock()
            .failures
            .insert(format!("{}:{}", op, target), Some(times));
    }

    /// Health reported by successive inspects; the last value repeats.
    pub fn set_health(&self, name: &str, sequence: &[HealthStatus]) {
        self.state
            .lock()
            .health
            .insert(name.to_string(), sequence.iter().copied().collect());
    }

    pub fn set_exit_code(&self, name: &str, code: Option<i64>) {
        self.state
            .lock()
            .exit_codes
            .insert(name.to_string(), code);
    }

    pub fn set_create_warnings(&self, warnings: &[&str]) {
        self.state.lock().create_warnings = warnings.iter().map(|s| s.to_string()).collect();
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn container_by_name(&self, name: &str) -> Option<ContainerDetails> {
        self.state
            .lock()
            .containers
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.container_by_name(name).is_some_and(|c| c.running)
    }

    pub fn has_image(&self, id: &str) -> bool {
        self.state.lock().images.contains_key(id)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self, filter: &ContainerFilter) -> YacuResult<Vec<ContainerSummary>> {
        let mut state = self.state.lock();
        state.check("list", &["*", filter.label.as_deref().unwrap_or("all")])?;
        Ok(state
            .containers
            .values()
            .filter(|c| !filter.running_only || c.running)
            .filter(|c| {
                filter
                    .label
                    .as_ref()
                    .is_none_or(|label| c.labels.contains_key(label))
            })
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image_id: c.image_id.clone(),
                labels: c.labels.clone(),
                running: c.running,
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> YacuResult<ContainerDetails> {
        let mut state = self.state.lock();
        let name = state.name_of(id)?;
        state.check("inspect", &[id, &name])?;

        let health = state.health.get_mut(&name).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().copied()
            }
        });
        let mut details = state
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| YacuError::NotFound(format!("container {}", id)))?;
        if let Some(health) = health {
            details.health = health;
        }
        Ok(details)
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> YacuResult<()> {
        let mut state = self.state.lock();
        let name = state.name_of(id)?;
        state.calls.push(format!("stop:{}:{}", name, timeout_secs));
        state.check("stop", &[id, &name])?;
        if let Some(c) = state.containers.get_mut(id) {
            c.running = false;
        }
        Ok(())
    }

    async fn start_container(&self, id: &str) -> YacuResult<()> {
        let mut state = self.state.lock();
        let name = state.name_of(id)?;
        state.calls.push(format!("start:{}", name));
        state.check("start", &[id, &name])?;
        if let Some(c) = state.containers.get_mut(id) {
            c.running = true;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool, remove_volumes: bool) -> YacuResult<()> {
        let mut state = self.state.lock();
        let name = state.name_of(id)?;
        state
            .calls
            .push(format!("remove:{}:volumes={}", name, remove_volumes));
        state.check("remove", &[id, &name])?;
        state.containers.remove(id);
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
        network: Option<&NetworkAttachment>,
    ) -> YacuResult<CreatedContainer> {
        let mut state = self.state.lock();
        state.calls.push(format!(
            "create:{}:{}",
            name,
            network.map(|n| n.name.as_str()).unwrap_or("-")
        ));
        state.check("create", &[name])?;
        if state.containers.values().any(|c| c.name == name) {
            return Err(YacuError::Runtime(format!("Conflict: name {} in use", name)));
        }

        let image = spec.config["Image"].as_str().unwrap_or_default().to_string();
        let labels: HashMap<String, String> =
            serde_json::from_value(spec.config["Labels"].clone()).unwrap_or_default();
        let image_id = state
            .tags
            .get(&image_key(&image))
            .cloned()
            .unwrap_or_else(|| local_image_id(&image));

        state.next_id += 1;
        let id = format!("new-{}", state.next_id);
        let details = ContainerDetails {
            id: id.clone(),
            name: name.to_string(),
            image_id,
            image,
            labels,
            running: false,
            health: HealthStatus::NoHealthcheck,
            network_mode: spec.host_config["NetworkMode"]
                .as_str()
                .unwrap_or("bridge")
                .to_string(),
            networks: network
                .map(|n| BTreeMap::from([(n.name.clone(), n.endpoint.clone())]))
                .unwrap_or_default(),
            spec: spec.clone(),
        };
        state.containers.insert(id.clone(), details);

        Ok(CreatedContainer {
            id,
            warnings: state.create_warnings.clone(),
        })
    }

    async fn connect_network(&self, network: &NetworkAttachment, container_id: &str) -> YacuResult<()> {
        let mut state = self.state.lock();
        let name = state.name_of(container_id)?;
        state.calls.push(format!("connect:{}:{}", name, network.name));
        state.check("connect", &[&network.name])?;
        if let Some(c) = state.containers.get_mut(container_id) {
            c.networks
                .insert(network.name.clone(), network.endpoint.clone());
        }
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> YacuResult<i64> {
        let code = {
            let mut state = self.state.lock();
            let name = state.name_of(id)?;
            state.check("wait", &[id, &name])?;
            state.exit_codes.get(&name).copied().unwrap_or(Some(0))
        };
        match code {
            Some(code) => Ok(code),
            None => std::future::pending().await,
        }
    }

    async fn pull_image(
        &self,
        reference: &TaggedReference,
        _auth: Option<&RegistryEntry>,
    ) -> YacuResult<()> {
        let key = reference.familiar_tagged();
        let mut state = self.state.lock();
        state.calls.push(format!("pull:{}", key));
        state.check("pull", &[&key])?;
        if let Some(image) = state.remote.get(&key).cloned() {
            state.tags.insert(key, image.id.clone());
            state.images.insert(image.id.clone(), image);
        }
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> YacuResult<ImageDetails> {
        let state = self.state.lock();
        let id = state
            .tags
            .get(&image_key(image))
            .cloned()
            .unwrap_or_else(|| image.to_string());
        state
            .images
            .get(&id)
            .cloned()
            .ok_or_else(|| YacuError::NotFound(format!("image {}", image)))
    }

    async fn remove_image(&self, id: &str, _force: bool) -> YacuResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("remove_image:{}", id));
        state.check("remove_image", &[id])?;
        state
            .images
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| YacuError::NotFound(format!("image {}", id)))
    }
}

// ============================================================================
// FakeRegistry
// ============================================================================

#[derive(Default)]
pub struct FakeRegistry {
    images: Mutex<HashMap<String, RemoteImageData>>,
    calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, familiar_tagged: &str, created: DateTime<Utc>, digest: &str) {
        self.images.lock().insert(
            familiar_tagged.to_string(),
            RemoteImageData {
                created,
                digest: digest.to_string(),
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn fetch_remote_image_data(
        &self,
        reference: &TaggedReference,
        _auth: Option<&RegistryEntry>,
    ) -> YacuResult<RemoteImageData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = reference.familiar_tagged();
        self.images
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| YacuError::NotFound(format!("{}: manifest unknown", key)))
    }
}

// ============================================================================
// RecordingNotifier
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Error { context: String },
    ImageUpdated { image: String },
    ImageError { image: String, context: String },
    ImageRemovalFailed { id: String },
    ContainerUpdated { name: String, warnings: Vec<String> },
    ContainerError { name: String, context: String },
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn error(&self, context: &str, _error: &YacuError) {
        self.push(Event::Error {
            context: context.to_string(),
        });
    }

    async fn image_updated(&self, _previous: &ImageRecord, current: &ImageRecord) {
        self.push(Event::ImageUpdated {
            image: current.reference.familiar_tagged(),
        });
    }

    async fn image_error(&self, image: &ImageRecord, context: &str, _error: &YacuError) {
        self.push(Event::ImageError {
            image: image.reference.familiar_tagged(),
            context: context.to_string(),
        });
    }

    async fn image_removal_failed(&self, image: &ImageRecord, _error: &YacuError) {
        self.push(Event::ImageRemovalFailed {
            id: image.id.clone(),
        });
    }

    async fn container_updated(
        &self,
        _previous: &ContainerRecord,
        current: &ContainerRecord,
        warnings: &[String],
    ) {
        self.push(Event::ContainerUpdated {
            name: current.name.clone(),
            warnings: warnings.to_vec(),
        });
    }

    async fn container_error(&self, container: &ContainerRecord, context: &str, _error: &YacuError) {
        self.push(Event::ContainerError {
            name: container.name.clone(),
            context: context.to_string(),
        });
    }
}
