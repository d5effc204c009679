//! Scheduler loop: sleep until the next cron tick, run a batch, repeat.

use anyhow::{Context, bail};
use chrono::{DateTime, Local, TimeZone};
use yacu::util::humanize_duration;
use yacu::{BatchReport, Schedule, Updater, YacuOptions};

pub async fn run(options: YacuOptions, once: bool) -> anyhow::Result<()> {
    let schedule = Schedule::parse(&options.scanner.interval)?;
    let updater = Updater::from_options(&options)
        .await
        .context("initialization failed")?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        interval = %options.scanner.interval,
        "Initialization completed"
    );

    if once {
        log_report(&updater.run().await);
        return Ok(());
    }

    run_scheduled(
        &schedule,
        &options.scanner.interval,
        || updater.run(),
        shutdown_signal(),
    )
    .await
}

/// Run a batch at every tick of `schedule` until `shutdown` resolves.
///
/// A signal that arrives during a batch lets that batch finish and ends the
/// loop before the next wait.
async fn run_scheduled<F, Fut, S>(
    schedule: &Schedule,
    interval: &str,
    mut run_batch: F,
    shutdown: S,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BatchReport>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let now = Local::now();
        let Some(next) = schedule.next_after(&now) else {
            bail!("interval '{}' has no further runs", interval);
        };
        let wait = until(&now, &next);
        tracing::info!(at = %next.to_rfc3339(), "Next run in {}", humanize_duration(wait));

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }
        log_report(&run_batch().await);
    }
}

fn until<Tz: TimeZone>(now: &DateTime<Tz>, next: &DateTime<Tz>) -> std::time::Duration {
    next.clone()
        .signed_duration_since(now.clone())
        .to_std()
        .unwrap_or_default()
}

fn log_report(report: &BatchReport) {
    tracing::info!(
        candidates = report.candidates,
        updated = report.updated,
        failed = report.failed,
        images_removed = report.images_removed,
        "Run finished"
    );
}

/// Resolves on SIGINT or SIGTERM. The listeners are registered before this
/// returns, so a signal delivered before the future is first polled is kept.
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    fn listen(kind: SignalKind, name: &str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| tracing::warn!(error = %e, "Cannot listen for {}", name))
            .ok()
    }

    async fn recv(signal: Option<Signal>) {
        match signal {
            Some(mut signal) => {
                signal.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let interrupt = listen(SignalKind::interrupt(), "SIGINT");
    let terminate = listen(SignalKind::terminate(), "SIGTERM");
    async move {
        tokio::select! {
            _ = recv(interrupt) => {}
            _ = recv(terminate) => {}
        }
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl Future<Output = ()> {
    let ctrl_c = tokio::signal::windows::ctrl_c()
        .inspect_err(|e| tracing::warn!(error = %e, "Cannot listen for Ctrl-C"))
        .ok();
    async move {
        match ctrl_c {
            Some(mut ctrl_c) => {
                ctrl_c.recv().await;
            }
            None => std::future::pending().await,
        }
    }
}
