use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::domain::dispatch::dispatcher::RetryPolicy;
use crate::domain::ids::HostName;

/// Runtime settings of the reconciler, read from a YAML file.
///
/// Every field has a default, so a partial file or no file at all is
/// fine. A file that does not parse is reported and ignored.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CoreConfig {
    pub poll_interval_secs: u64,
    pub command_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub audit_file: Option<String>,
    pub remote_api: Option<RemoteApiConf>,
    pub hosts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteApiConf {
    pub base_url: String,
    pub user_name: String,
    pub auth_token: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            command_timeout_secs: 60,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            audit_file: None,
            remote_api: None,
            hosts: Vec::new(),
        }
    }
}

impl CoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn host_names(&self) -> Vec<HostName> {
        self.hosts.iter().map(HostName::new).collect()
    }
}

/// Reads the config file named by `CRM_RECONCILER_CONFIG`, defaulting to
/// `reconciler.yaml` in the working directory.
pub async fn load_config() -> CoreConfig {
    let path = std::env::var("CRM_RECONCILER_CONFIG").unwrap_or_else(|_| "reconciler.yaml".into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: &str) -> CoreConfig {
    if Path::new(path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return CoreConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            log::warn!("Config file '{}' is invalid, falling back to defaults: {}", path, e);
            CoreConfig::default()
        })
    } else {
        log::info!("No config file at '{}', using defaults.", path);
        CoreConfig::default()
    }
}
