//! Waiting on a dependency before starting its dependent.
//!
//! Both blocking conditions are bounded by a deadline on tokio's monotonic
//! clock, so tests drive them with a paused clock.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout_at};

use super::DependencyCondition;
use crate::runtime::{ContainerRuntime, HealthStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTiming {
    /// Give up waiting after this long.
    pub deadline: Duration,
    /// Health polling period.
    pub poll_interval: Duration,
}

impl Default for WaitTiming {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Result of waiting on a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The dependent may start. `warning` notes an unclean dependency exit.
    Ready { warning: Option<String> },
    /// The dependency reported unhealthy.
    Unhealthy,
    TimedOut,
    /// The runtime call backing the wait failed.
    Failed(String),
}

/// Health polling progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthState {
    Pending,
    Ready,
    Unhealthy,
}

impl From<HealthStatus> for HealthState {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::NoHealthcheck | HealthStatus::Healthy => HealthState::Ready,
            HealthStatus::Unhealthy => HealthState::Unhealthy,
            HealthStatus::Starting => HealthState::Pending,
        }
    }
}

/// Block until `condition` holds for container `dependency_id`.
pub async fn wait_for(
    runtime: &dyn ContainerRuntime,
    condition: DependencyCondition,
    dependency_id: &str,
    timing: &WaitTiming,
) -> WaitOutcome {
    let deadline = Instant::now() + timing.deadline;
    match condition {
        DependencyCondition::Started => WaitOutcome::Ready { warning: None },
        DependencyCondition::Completed => wait_exited(runtime, dependency_id, deadline).await,
        DependencyCondition::Healthy => {
            wait_healthy(runtime, dependency_id, deadline, timing.poll_interval).await
        }
    }
}

async fn wait_exited(runtime: &dyn ContainerRuntime, id: &str, deadline: Instant) -> WaitOutcome {
    match timeout_at(deadline, runtime.wait_container(id)).await {
        Err(_) => WaitOutcome::TimedOut,
        Ok(Err(e)) => WaitOutcome::Failed(e.to_string()),
        Ok(Ok(0)) => WaitOutcome::Ready { warning: None },
        Ok(Ok(code)) => {
            tracing::warn!(exit_code = code, "Dependency exit code not clean");
            WaitOutcome::Ready {
                warning: Some(format!("exit code not clean: {}", code)),
            }
        }
    }
}

async fn wait_healthy(
    runtime: &dyn ContainerRuntime,
    id: &str,
    deadline: Instant,
    poll_interval: Duration,
) -> WaitOutcome {
    // First check one period in, giving a fresh container time to boot.
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expired = sleep_until(deadline);
    tokio::pin!(expired);

    let mut state = HealthState::Pending;
    while state == HealthState::Pending {
        tokio::select! {
            biased;
            _ = &mut expired => return WaitOutcome::TimedOut,
            _ = ticker.tick() => {
                tracing::debug!("Waiting on dependency to start or become healthy");
                state = match runtime.inspect_container(id).await {
                    Ok(details) => details.health.into(),
                    Err(e) => return WaitOutcome::Failed(e.to_string()),
                };
            }
        }
    }

    match state {
        HealthState::Unhealthy => WaitOutcome::Unhealthy,
        _ => WaitOutcome::Ready { warning: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRuntime, container_details};
    use chrono::Utc;

    fn runtime_with_api() -> FakeRuntime {
        let runtime = FakeRuntime::new();
        runtime.add_container(container_details("a", "api", "api:1"), Utc::now(), &[]);
        runtime
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_does_not_wait() {
        let runtime = runtime_with_api();
        let start = Instant::now();
        let outcome = wait_for(
            &runtime,
            DependencyCondition::Started,
            "a",
            &WaitTiming::default(),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::Ready { warning: None });
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_clean_and_unclean_exit() {
        let runtime = runtime_with_api();
        let timing = WaitTiming::default();

        runtime.set_exit_code("api", Some(0));
        let outcome = wait_for(&runtime, DependencyCondition::Completed, "a", &timing).await;
        assert_eq!(outcome, WaitOutcome::Ready { warning: None });

        runtime.set_exit_code("api", Some(1));
        let outcome = wait_for(&runtime, DependencyCondition::Completed, "a", &timing).await;
        assert_eq!(
            outcome,
            WaitOutcome::Ready {
                warning: Some("exit code not clean: 1".to_string())
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_times_out_at_deadline() {
        let runtime = runtime_with_api();
        runtime.set_exit_code("api", None);

        let start = Instant::now();
        let outcome = wait_for(
            &runtime,
            DependencyCondition::Completed,
            "a",
            &WaitTiming::default(),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_wait_error() {
        let runtime = runtime_with_api();
        runtime.fail("wait", "api");
        let outcome = wait_for(
            &runtime,
            DependencyCondition::Completed,
            "a",
            &WaitTiming::default(),
        )
        .await;
        assert!(matches!(outcome, WaitOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_polls_until_healthy() {
        let runtime = runtime_with_api();
        runtime.set_health(
            "api",
            &[
                HealthStatus::Starting,
                HealthStatus::Starting,
                HealthStatus::Healthy,
            ],
        );

        let start = Instant::now();
        let outcome = wait_for(
            &runtime,
            DependencyCondition::Healthy,
            "a",
            &WaitTiming::default(),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::Ready { warning: None });
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_healthcheck_is_ready() {
        let runtime = runtime_with_api();
        runtime.set_health("api", &[HealthStatus::NoHealthcheck]);
        let outcome = wait_for(
            &runtime,
            DependencyCondition::Healthy,
            "a",
            &WaitTiming::default(),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::Ready { warning: None });
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_times_out() {
        let runtime = runtime_with_api();
        runtime.set_health("api", &[HealthStatus::Starting]);

        let start = Instant::now();
        let outcome = wait_for(
            &runtime,
            DependencyCondition::Healthy,
            "a",
            &WaitTiming::default(),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_aborts() {
        let runtime = runtime_with_api();
        runtime.set_health("api", &[HealthStatus::Starting, HealthStatus::Unhealthy]);
        let outcome = wait_for(
            &runtime,
            DependencyCondition::Healthy,
            "a",
            &WaitTiming::default(),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::Unhealthy);
    }
}
