//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::Res;

/// Default Genie poll interval in seconds.
fn default_poll_interval_secs() -> u64 {
    2
}

/// Default maximum wait for a Genie answer in seconds.
fn default_max_wait_secs() -> u64 {
    90
}

/// Configuration for the genie-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared, immutable configuration values.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Immutable configuration values shared behind an [`Arc`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack app token (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Slack signing secret (`SLACK_SIGNING_SECRET`).
    pub slack_signing_secret: String,
    /// Databricks workspace URL (`DATABRICKS_HOST`).
    pub databricks_host: String,
    /// Databricks PAT token used for all Genie calls (`DATABRICKS_TOKEN`).
    pub databricks_token: String,
    /// Genie space that questions are routed to (`GENIE_SPACE_ID`).
    pub genie_space_id: String,
    /// Seconds between Genie status polls (`GENIE_POLL_INTERVAL_SECS`).
    #[serde(default = "default_poll_interval_secs")]
    pub genie_poll_interval_secs: u64,
    /// Maximum seconds to wait for a Genie answer (`GENIE_MAX_WAIT_SECS`).
    #[serde(default = "default_max_wait_secs")]
    pub genie_max_wait_secs: u64,
}

impl Config {
    /// Load configuration from the environment and an optional config file.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("GENIE_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        if result.databricks_host.is_empty() || result.databricks_token.is_empty() || result.genie_space_id.is_empty() {
            return Err(anyhow::anyhow!("Databricks host, token, and Genie space id must all be set."));
        }

        if result.genie_poll_interval_secs < 1 {
            return Err(anyhow::anyhow!("Genie poll interval must be at least 1 second."));
        }

        if result.genie_max_wait_secs < result.genie_poll_interval_secs {
            return Err(anyhow::anyhow!("Genie max wait must be at least one poll interval."));
        }

        Ok(result)
    }

    /// Interval between Genie status polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.genie_poll_interval_secs)
    }

    /// Maximum wall-clock wait for a Genie answer.
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.genie_max_wait_secs)
    }
}
