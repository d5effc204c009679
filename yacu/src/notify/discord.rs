//! Discord webhook sink.
//!
//! Every event becomes a single embed posted to the configured webhook URL.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use yacu_shared::errors::{YacuError, YacuResult};

use super::Notifier;
use crate::container::ContainerRecord;
use crate::image::ImageRecord;
use crate::options::{WebhookAuthor, WebhookOptions};
use crate::util::{id_encoded, short_id};

const COLOR_ERROR: u32 = 12723739;
const COLOR_IMAGE: u32 = 881812;
const COLOR_CONTAINER: u32 = 2597142;
const FOOTER: &str = "YACU by Terrails";

pub struct DiscordWebhook {
    http_client: reqwest::Client,
    url: reqwest::Url,
    author: WebhookAuthor,
}

impl DiscordWebhook {
    pub fn new(options: &WebhookOptions) -> YacuResult<Self> {
        let url = reqwest::Url::parse(options.url.trim()).map_err(|e| {
            YacuError::Config(format!("invalid discord webhook url '{}': {}", options.url, e))
        })?;
        Ok(Self {
            http_client: reqwest::Client::new(),
            url,
            author: options.author.clone(),
        })
    }

    async fn send(&self, embed: Embed) {
        let payload = json!({ "embeds": [embed.build(&self.author)] });
        if let Err(e) = self.post(&payload).await {
            tracing::error!(error = %e, "Encountered an error while sending a Discord webhook");
        }
    }

    async fn post(&self, payload: &Value) -> YacuResult<()> {
        let response = self
            .http_client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| YacuError::Notify(format!("Failed to call Discord webhook: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(YacuError::Notify(format!(
                "Discord webhook returned HTTP {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn error(&self, context: &str, error: &YacuError) {
        self.send(error_embed(context, error)).await;
    }

    async fn image_updated(&self, previous: &ImageRecord, current: &ImageRecord) {
        self.send(image_updated_embed(previous, current)).await;
    }

    async fn image_error(&self, image: &ImageRecord, context: &str, error: &YacuError) {
        self.send(image_error_embed(image, context, error)).await;
    }

    async fn image_removal_failed(&self, image: &ImageRecord, error: &YacuError) {
        self.send(image_removal_embed(image, error)).await;
    }

    async fn container_updated(
        &self,
        _previous: &ContainerRecord,
        current: &ContainerRecord,
        warnings: &[String],
    ) {
        self.send(container_updated_embed(current, warnings)).await;
    }

    async fn container_error(&self, container: &ContainerRecord, context: &str, error: &YacuError) {
        self.send(container_error_embed(container, context, error))
            .await;
    }
}

// ============================================================================
// Embeds
// ============================================================================

#[derive(Debug, Default)]
struct Embed {
    title: String,
    description: Option<String>,
    url: Option<String>,
    color: u32,
    fields: Vec<(String, String, bool)>,
}

impl Embed {
    fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            color,
            ..Default::default()
        }
    }

    fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn field(mut self, name: &str, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push((name.to_string(), value.into(), inline));
        self
    }

    fn build(self, author: &WebhookAuthor) -> Value {
        let mut embed = json!({
            "title": self.title,
            "color": self.color,
            "timestamp": Utc::now().to_rfc3339(),
            "footer": { "text": FOOTER },
        });
        if let Some(description) = self.description {
            embed["description"] = json!(description);
        }
        if let Some(url) = self.url {
            embed["url"] = json!(url);
        }
        if !self.fields.is_empty() {
            embed["fields"] = self
                .fields
                .into_iter()
                .map(|(name, value, inline)| json!({"name": name, "value": value, "inline": inline}))
                .collect();
        }

        let mut block = serde_json::Map::new();
        for (key, value) in [
            ("name", &author.name),
            ("url", &author.url),
            ("icon_url", &author.icon_url),
        ] {
            if !value.is_empty() {
                block.insert(key.to_string(), json!(value));
            }
        }
        if !block.is_empty() {
            embed["author"] = Value::Object(block);
        }
        embed
    }
}

fn failure(context: &str, error: &YacuError) -> String {
    format!("**{}**\n```{}```", context, error)
}

fn error_embed(context: &str, error: &YacuError) -> Embed {
    Embed::new("An error occurred during update", COLOR_ERROR).description(failure(context, error))
}

fn image_updated_embed(previous: &ImageRecord, current: &ImageRecord) -> Embed {
    let digest = |image: &ImageRecord| {
        image
            .repo_digest
            .as_deref()
            .map(|d| id_encoded(d).to_string())
            .unwrap_or_else(|| "none".to_string())
    };
    Embed::new(
        format!(
            "{} ({}) has been updated",
            current.reference.familiar_tagged(),
            short_id(&current.id)
        ),
        COLOR_IMAGE,
    )
    .field("Previous Digest", digest(previous), false)
    .field("New Digest", digest(current), false)
}

fn image_error_embed(image: &ImageRecord, context: &str, error: &YacuError) -> Embed {
    Embed::new(
        format!(
            "{} ({}) threw an error during update",
            image.reference.familiar_tagged(),
            short_id(&image.id)
        ),
        COLOR_ERROR,
    )
    .description(failure(context, error))
}

fn image_removal_embed(image: &ImageRecord, error: &YacuError) -> Embed {
    Embed::new(
        format!("{} threw an error during removal", short_id(&image.id)),
        COLOR_ERROR,
    )
    .description(format!("```{}```", error))
    .field("Long ID", image.id.clone(), false)
    .field("Last Tag", image.reference.familiar_tagged(), false)
}

fn container_updated_embed(current: &ContainerRecord, warnings: &[String]) -> Embed {
    let mut embed = Embed::new(
        format!(
            "{} ({}) has been updated",
            current.name,
            current.reference().familiar_tagged()
        ),
        COLOR_CONTAINER,
    )
    .field("Container Id", short_id(&current.id), true)
    .field("Image Id", short_id(&current.image.id), true);

    embed.url = current.webui_url().map(str::to_string);

    if !warnings.is_empty() {
        let mut description = String::from("__Following errors occurred during update:__\n");
        for warning in warnings {
            description.push_str(&format!("* {}\n", warning));
        }
        embed = embed.description(description);
    }
    embed
}

fn container_error_embed(container: &ContainerRecord, context: &str, error: &YacuError) -> Embed {
    Embed::new(
        format!(
            "{} ({}) threw an error during update",
            container.name,
            container.reference().familiar_tagged()
        ),
        COLOR_ERROR,
    )
    .description(failure(context, error))
    .field("Container Id", short_id(&container.id), true)
    .field("Image Id", short_id(&container.image.id), true)
}
