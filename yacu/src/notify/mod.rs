//! Notification fan-out.
//!
//! Sinks implement [`Notifier`]; [`Notifications`] holds them with their
//! per-kind gates and forwards each event to the sinks that accept it.
//! Sinks log their own delivery failures, nothing is returned to the caller.

mod discord;

pub use discord::DiscordWebhook;

use async_trait::async_trait;
use yacu_shared::errors::YacuError;

use crate::container::ContainerRecord;
use crate::image::ImageRecord;
use crate::options::{WebhookKind, WebhookOptions};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Batch-level failure, e.g. the scan could not run.
    async fn error(&self, context: &str, error: &YacuError);

    async fn image_updated(&self, previous: &ImageRecord, current: &ImageRecord);

    async fn image_error(&self, image: &ImageRecord, context: &str, error: &YacuError);

    async fn image_removal_failed(&self, image: &ImageRecord, error: &YacuError);

    async fn container_updated(
        &self,
        previous: &ContainerRecord,
        current: &ContainerRecord,
        warnings: &[String],
    );

    async fn container_error(&self, container: &ContainerRecord, context: &str, error: &YacuError);
}

/// Which event kinds a sink receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gates {
    pub errors: bool,
    pub image_success: bool,
    pub container_success: bool,
}

impl Gates {
    pub fn all() -> Self {
        Self {
            errors: true,
            image_success: true,
            container_success: true,
        }
    }
}

impl From<&WebhookKind> for Gates {
    fn from(kind: &WebhookKind) -> Self {
        Self {
            errors: kind.errors.unwrap_or(true),
            image_success: kind.image_success.unwrap_or(true),
            container_success: kind.container_success.unwrap_or(true),
        }
    }
}

struct Sink {
    notifier: Box<dyn Notifier>,
    gates: Gates,
}

#[derive(Default)]
pub struct Notifications {
    sinks: Vec<Sink>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build sinks from the `webhooks` config section.
    ///
    /// Entries without a URL are skipped. Unknown kinds and sinks that fail
    /// to set up are logged and skipped; notifications never block startup.
    pub fn from_options<'a>(
        webhooks: impl IntoIterator<Item = (&'a String, &'a WebhookOptions)>,
    ) -> Self {
        let mut notifications = Self::new();
        for (kind, options) in webhooks {
            if options.url.is_empty() {
                tracing::debug!(webhook = %kind, "Webhook has no url, skipping");
                continue;
            }
            match kind.as_str() {
                "discord" => match DiscordWebhook::new(options) {
                    Ok(hook) => {
                        notifications.add(Box::new(hook), Gates::from(&options.kind));
                        tracing::debug!(webhook = %kind, "Notification sink configured");
                    }
                    Err(e) => {
                        tracing::error!(webhook = %kind, error = %e, "Setting up webhook client failed")
                    }
                },
                other => tracing::warn!(webhook = %other, "Unknown webhook kind, ignoring"),
            }
        }
        notifications
    }

    pub fn add(&mut self, notifier: Box<dyn Notifier>, gates: Gates) {
        self.sinks.push(Sink { notifier, gates });
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn gated(&self, gate: impl Fn(&Gates) -> bool) -> impl Iterator<Item = &dyn Notifier> {
        self.sinks
            .iter()
            .filter(move |sink| gate(&sink.gates))
            .map(|sink| sink.notifier.as_ref())
    }

    pub async fn error(&self, context: &str, error: &YacuError) {
        for sink in self.gated(|g| g.errors) {
            sink.error(context, error).await;
        }
    }

    pub async fn image_updated(&self, previous: &ImageRecord, current: &ImageRecord) {
        for sink in self.gated(|g| g.image_success) {
            sink.image_updated(previous, current).await;
        }
    }

    pub async fn image_error(&self, image: &ImageRecord, context: &str, error: &YacuError) {
        for sink in self.gated(|g| g.errors) {
            sink.image_error(image, context, error).await;
        }
    }

    pub async fn image_removal_failed(&self, image: &ImageRecord, error: &YacuError) {
        for sink in self.gated(|g| g.errors) {
            sink.image_removal_failed(image, error).await;
        }
    }

    pub async fn container_updated(
        &self,
        previous: &ContainerRecord,
        current: &ContainerRecord,
        warnings: &[String],
    ) {
        for sink in self.gated(|g| g.container_success) {
            sink.container_updated(previous, current, warnings).await;
        }
    }

    pub async fn container_error(
        &self,
        container: &ContainerRecord,
        context: &str,
        error: &YacuError,
    ) {
        for sink in self.gated(|g| g.errors) {
            sink.container_error(container, context, error).await;
        }
    }
}
