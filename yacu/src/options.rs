//! Configuration for yacu.
//!
//! Every section has serde defaults so a partial (or missing) config file
//! yields a working setup. Per-container overrides come from labels, see
//! [`crate::container::ContainerSettings`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use yacu_shared::errors::{YacuError, YacuResult};

use crate::schedule::Schedule;

// ============================================================================
// Top-level options
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct YacuOptions {
    #[serde(default)]
    pub database: DatabaseOptions,

    #[serde(default)]
    pub logging: LoggingOptions,

    #[serde(default)]
    pub scanner: ScannerOptions,

    #[serde(default)]
    pub updater: UpdaterOptions,

    /// Credentials and transport settings per registry domain.
    #[serde(default)]
    pub registries: RegistryEntries,

    /// Notification sinks keyed by kind (currently `discord`).
    #[serde(default)]
    pub webhooks: BTreeMap<String, WebhookOptions>,
}

impl YacuOptions {
    /// Validate option combinations that serde cannot express.
    pub fn sanitize(&self) -> YacuResult<()> {
        let schedule = Schedule::parse(&self.scanner.interval)?;
        if schedule.next_after(&Utc::now()).is_none() {
            return Err(YacuError::Config(format!(
                "interval '{}' never fires",
                self.scanner.interval
            )));
        }

        if self.scanner.image_age < 0 {
            return Err(YacuError::Config(format!(
                "scanner.image_age must not be negative, got {}",
                self.scanner.image_age
            )));
        }
        if self.updater.stop_timeout < 0 {
            return Err(YacuError::Config(format!(
                "updater.stop_timeout must not be negative, got {}",
                self.updater.stop_timeout
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Database
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseOptions {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data.db")
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoggingOptions {
    #[serde(default)]
    pub console: ConsoleLogging,

    #[serde(default)]
    pub file: FileLogging,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsoleLogging {
    #[serde(default = "default_console_level")]
    pub level: String,
}

fn default_console_level() -> String {
    "info".into()
}

impl Default for ConsoleLogging {
    fn default() -> Self {
        Self {
            level: default_console_level(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileLogging {
    /// Directory for `yacu.log`. Empty disables file logging.
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_file_level")]
    pub level: String,
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_file_level() -> String {
    "debug".into()
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            level: default_file_level(),
        }
    }
}

// ============================================================================
// Scanner / Updater
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScannerOptions {
    /// Cron expression or macro (`@weekly`, `@daily`, ...).
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Minimum image age in days before an update is considered. Also the
    /// minimum number of days between two registry checks of one image.
    #[serde(default = "default_image_age")]
    pub image_age: i64,

    /// Scan containers without a `yacu.enable` label.
    #[serde(default)]
    pub scan_all: bool,

    /// Scan containers that are not running.
    #[serde(default)]
    pub scan_stopped: bool,
}

fn default_interval() -> String {
    "@weekly".into()
}

fn default_image_age() -> i64 {
    7
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            image_age: default_image_age(),
            scan_all: false,
            scan_stopped: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdaterOptions {
    /// Seconds to wait for a container to stop before it is killed.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: i64,

    /// Remove anonymous volumes together with the old container.
    #[serde(default)]
    pub remove_volumes: bool,

    /// Remove replaced images once no container references them.
    #[serde(default)]
    pub remove_images: bool,
}

fn default_stop_timeout() -> i64 {
    30
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self {
            stop_timeout: default_stop_timeout(),
            remove_volumes: false,
            remove_images: false,
        }
    }
}

// ============================================================================
// Registries
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Talk plain HTTP to this registry.
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryEntries(pub Vec<RegistryEntry>);

impl RegistryEntries {
    /// Entry configured for `domain`, if any.
    pub fn find(&self, domain: &str) -> Option<&RegistryEntry> {
        self.0.iter().find(|entry| entry.domain == domain)
    }

    /// Domains marked `insecure`.
    pub fn insecure_domains(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|entry| entry.insecure)
            .map(|entry| entry.domain.clone())
            .collect()
    }
}

// ============================================================================
// Webhooks
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WebhookOptions {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub author: WebhookAuthor,

    #[serde(default)]
    pub kind: WebhookKind,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WebhookAuthor {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub icon_url: String,
}

/// Which event kinds a sink receives. Unset flags default to enabled.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WebhookKind {
    #[serde(default)]
    pub errors: Option<bool>,

    #[serde(default)]
    pub image_success: Option<bool>,

    #[serde(default)]
    pub container_success: Option<bool>,
}
