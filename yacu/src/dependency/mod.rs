//! Containers that declare a `depends_on` relationship.
//!
//! Before a running container is recreated, every running container whose
//! depends-on label names it is stopped; afterwards each is started again
//! once its condition on the new container holds. Nothing here fails the
//! surrounding update: every problem becomes a warning string.

mod wait;

pub use wait::{WaitOutcome, WaitTiming, wait_for};

use tracing::Instrument;
use yacu_shared::errors::YacuResult;

use crate::container::{ContainerSettings, LABEL_DEPENDS_ON};
use crate::runtime::{ContainerFilter, ContainerRuntime, ContainerSummary};
use crate::util::parse_bool;

/// When a dependent may start relative to the container it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyCondition {
    /// As soon as the dependency has been started.
    Started,
    /// After the dependency has exited.
    Completed,
    /// Once the dependency reports healthy, or has no healthcheck.
    Healthy,
}

impl DependencyCondition {
    /// Unknown tokens fall back to `Healthy`.
    pub fn from_label(token: &str) -> Self {
        match token.to_ascii_lowercase().as_str() {
            "service_started" => Self::Started,
            "service_completed_successfully" => Self::Completed,
            _ => Self::Healthy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "service_started",
            Self::Completed => "service_completed_successfully",
            Self::Healthy => "service_healthy",
        }
    }
}

/// One `dependency[:condition[:restart]]` entry of a depends-on label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependsOnEntry {
    pub dependency: String,
    pub condition: DependencyCondition,
    /// Only an explicit, parseable `false` disables restarting.
    pub restart: bool,
}

impl DependsOnEntry {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split(':');
        let dependency = parts.next().filter(|d| !d.is_empty())?.to_string();
        let condition = parts
            .next()
            .map(DependencyCondition::from_label)
            .unwrap_or(DependencyCondition::Healthy);
        let restart = parts.next().and_then(parse_bool).unwrap_or(true);
        Some(Self {
            dependency,
            condition,
            restart,
        })
    }

    /// Entries of a comma-separated label value, empty ones dropped.
    pub fn parse_list(value: &str) -> Vec<Self> {
        value.split(',').filter_map(Self::parse).collect()
    }
}

/// A running container that has to follow `depends_on` through a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Name of the container being updated.
    pub depends_on: String,
    pub dependent_id: String,
    pub dependent_name: String,
    pub condition: DependencyCondition,
    pub stop_timeout: i64,
}

impl DependencyEdge {
    /// Edge from `summary` onto `dependency_name`, if its label declares one.
    /// The first matching entry wins; `restart=false` yields no edge.
    fn from_summary(
        summary: &ContainerSummary,
        dependency_name: &str,
        defaults: &ContainerSettings,
    ) -> Option<Self> {
        let label = summary.labels.get(LABEL_DEPENDS_ON)?;
        let entry = DependsOnEntry::parse_list(label)
            .into_iter()
            .find(|entry| entry.dependency == dependency_name)?;
        if !entry.restart {
            return None;
        }

        Some(Self {
            depends_on: dependency_name.to_string(),
            dependent_id: summary.id.clone(),
            dependent_name: summary.name.clone(),
            condition: entry.condition,
            stop_timeout: defaults.resolve(&summary.labels).stop_timeout,
        })
    }
}

/// Dependents of one container, resolved right before it is stopped.
#[derive(Debug, Clone, Default)]
pub struct Dependents {
    edges: Vec<DependencyEdge>,
}

impl Dependents {
    /// Running containers whose depends-on label names `dependency_name`.
    pub async fn discover(
        runtime: &dyn ContainerRuntime,
        dependency_name: &str,
        defaults: &ContainerSettings,
    ) -> YacuResult<Self> {
        let summaries = runtime
            .list_containers(&ContainerFilter::running_with_label(LABEL_DEPENDS_ON))
            .await?;

        let edges: Vec<_> = summaries
            .iter()
            .filter_map(|summary| DependencyEdge::from_summary(summary, dependency_name, defaults))
            .collect();

        if !edges.is_empty() {
            tracing::debug!(
                container = %dependency_name,
                dependents = edges.len(),
                "Found depending containers"
            );
        }
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Stop every dependent; failures become warnings.
    pub async fn stop(&self, runtime: &dyn ContainerRuntime) -> Vec<String> {
        let mut warnings = Vec::new();
        for edge in &self.edges {
            tracing::debug!(container = %edge.dependent_name, "Stopping depending container");
            if let Err(e) = runtime
                .stop_container(&edge.dependent_id, edge.stop_timeout)
                .await
            {
                tracing::error!(container = %edge.dependent_name, error = %e, "Failed to stop container");
                warnings.push(format!(
                    "failed to stop container {}: {}",
                    edge.dependent_name, e
                ));
            }
        }
        warnings
    }

    /// Start every dependent once its condition on `dependency_id` (the
    /// recreated container) holds.
    pub async fn start(
        &self,
        runtime: &dyn ContainerRuntime,
        dependency_id: &str,
        timing: &WaitTiming,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        for edge in &self.edges {
            warnings.extend(start_dependent(runtime, edge, dependency_id, timing).await);
        }
        warnings
    }
}

async fn start_dependent(
    runtime: &dyn ContainerRuntime,
    edge: &DependencyEdge,
    dependency_id: &str,
    timing: &WaitTiming,
) -> Option<String> {
    let span = tracing::debug_span!(
        "dependent",
        container = %edge.dependent_name,
        depends_on = %edge.depends_on,
        condition = edge.condition.as_str()
    );
    start_after_wait(runtime, edge, dependency_id, timing)
        .instrument(span)
        .await
}

async fn start_after_wait(
    runtime: &dyn ContainerRuntime,
    edge: &DependencyEdge,
    dependency_id: &str,
    timing: &WaitTiming,
) -> Option<String> {
    let warning = match wait_for(runtime, edge.condition, dependency_id, timing).await {
        WaitOutcome::Ready { warning } => warning,
        WaitOutcome::Unhealthy => {
            tracing::warn!("Not starting container, dependency became unhealthy");
            return Some(format!(
                "failed to start container {} because {} became unhealthy",
                edge.dependent_name, edge.depends_on
            ));
        }
        WaitOutcome::TimedOut => {
            tracing::warn!("Timed out waiting on dependency");
            return Some(format!(
                "timed out starting container {} due to {} not reaching {} in a reasonable amount of time",
                edge.dependent_name,
                edge.depends_on,
                edge.condition.as_str()
            ));
        }
        WaitOutcome::Failed(reason) => {
            tracing::error!(error = %reason, "Waiting on dependency failed");
            return Some(format!(
                "failed to start container {} while waiting on {}: {}",
                edge.dependent_name, edge.depends_on, reason
            ));
        }
    };

    let warning = warning.map(|w| format!("container {} {}", edge.depends_on, w));
    if let Err(e) = runtime.start_container(&edge.dependent_id).await {
        tracing::error!(error = %e, "Failed to start container");
        let failure = format!(
            "failed to start container {} depending on {}: {}",
            edge.dependent_name, edge.depends_on, e
        );
        return Some(match warning {
            Some(w) => format!("{}; {}", w, failure),
            None => failure,
        });
    }
    tracing::debug!("Started depending container");
    warning
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRuntime, container_details};
    use chrono::Utc;
    use rstest::rstest;

    #[rstest]
    #[case("api", DependencyCondition::Healthy, true)]
    #[case("api:service_started", DependencyCondition::Started, true)]
    #[case("api:SERVICE_STARTED", DependencyCondition::Started, true)]
    #[case("api:service_completed_successfully", DependencyCondition::Completed, true)]
    #[case("api:service_completed_successfully:false", DependencyCondition::Completed, false)]
    #[case("api:service_healthy:true", DependencyCondition::Healthy, true)]
    #[case("api:bogus:true", DependencyCondition::Healthy, true)]
    #[case("api:service_started:maybe", DependencyCondition::Started, true)]
    fn test_parse_entry(
        #[case] raw: &str,
        #[case] condition: DependencyCondition,
        #[case] restart: bool,
    ) {
        let entry = DependsOnEntry::parse(raw).unwrap();
        assert_eq!(entry.dependency, "api");
        assert_eq!(entry.condition, condition);
        assert_eq!(entry.restart, restart);
    }

    #[test]
    fn test_parse_list_skips_empty_entries() {
        let entries = DependsOnEntry::parse_list("db:service_started,,cache");
        let names: Vec<_> = entries.iter().map(|e| e.dependency.as_str()).collect();
        assert_eq!(names, vec!["db", "cache"]);
        assert!(DependsOnEntry::parse_list("").is_empty());
    }

    fn dependent(runtime: &FakeRuntime, id: &str, name: &str, label: &str) {
        let mut details = container_details(id, name, "app:1");
        details
            .labels
            .insert(LABEL_DEPENDS_ON.to_string(), label.to_string());
        runtime.add_container(details, Utc::now(), &[]);
    }

    #[tokio::test]
    async fn test_discover_matches_dependency_name() {
        let runtime = FakeRuntime::new();
        runtime.add_container(container_details("a", "api", "api:1"), Utc::now(), &[]);
        dependent(&runtime, "w1", "worker", "api:service_started");
        dependent(&runtime, "w2", "job", "db,api:service_completed_successfully:false");
        dependent(&runtime, "w3", "web", "db:service_started,api");
        dependent(&runtime, "w4", "other", "db");
        let mut stopped = container_details("w5", "stopped", "app:1");
        stopped.running = false;
        stopped
            .labels
            .insert(LABEL_DEPENDS_ON.to_string(), "api".to_string());
        runtime.add_container(stopped, Utc::now(), &[]);

        let dependents = Dependents::discover(&runtime, "api", &ContainerSettings::default())
            .await
            .unwrap();
        let found: Vec<_> = dependents
            .edges()
            .iter()
            .map(|e| (e.dependent_name.as_str(), e.condition))
            .collect();
        assert_eq!(
            found,
            vec![
                ("worker", DependencyCondition::Started),
                ("web", DependencyCondition::Healthy),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_collects_warnings_and_continues() {
        let runtime = FakeRuntime::new();
        dependent(&runtime, "w1", "first", "api:service_started");
        dependent(&runtime, "w2", "second", "api:service_started");
        runtime.fail("stop", "first");

        let dependents = Dependents::discover(&runtime, "api", &ContainerSettings::default())
            .await
            .unwrap();
        let warnings = dependents.stop(&runtime).await;

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("first"));
        assert!(runtime.is_running("first"));
        assert!(!runtime.is_running("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_with_unclean_exit_still_starts() {
        let runtime = FakeRuntime::new();
        runtime.add_container(container_details("a", "api", "api:1"), Utc::now(), &[]);
        dependent(&runtime, "w1", "worker", "api:service_completed_successfully");
        runtime.set_exit_code("api", Some(1));

        let dependents = Dependents::discover(&runtime, "api", &ContainerSettings::default())
            .await
            .unwrap();
        dependents.stop(&runtime).await;
        let warnings = dependents.start(&runtime, "a", &WaitTiming::default()).await;

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("exit code"), "{}", warnings[0]);
        assert!(warnings[0].contains('1'));
        assert!(runtime.is_running("worker"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_dependency_blocks_start() {
        let runtime = FakeRuntime::new();
        runtime.add_container(container_details("a", "api", "api:1"), Utc::now(), &[]);
        dependent(&runtime, "w1", "worker", "api");
        runtime.set_health("api", &[crate::runtime::HealthStatus::Unhealthy]);

        let dependents = Dependents::discover(&runtime, "api", &ContainerSettings::default())
            .await
            .unwrap();
        dependents.stop(&runtime).await;
        let warnings = dependents.start(&runtime, "a", &WaitTiming::default()).await;

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unhealthy"));
        assert!(!runtime.is_running("worker"));
    }
}
