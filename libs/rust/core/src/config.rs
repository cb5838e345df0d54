//! Layered configuration for the promotion services.
//!
//! Sources, later ones winning: built-in defaults, an optional YAML file
//! (`PROMOTER_CONFIG_FILE`), an optional HTTP endpoint serving YAML
//! (`PROMOTER_CONFIG_HTTP`), then environment variables prefixed `PROMOTER`
//! with `__` as the section separator (e.g. `PROMOTER__REGISTRY_CONTAINER`).

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct PromoterConfig {
    pub service_name: String,
    pub health_port: u16,

    /// Object store account endpoint holding the model registry container.
    pub storage_url: String,
    /// Change-notification queue endpoint.
    pub queue_url: String,
    pub registry_container: String,
    /// Suffix identifying metadata documents in the registry container.
    pub metadata_suffix: String,
    /// Suffix of the serialized model artifact next to each metadata document.
    pub artifact_suffix: String,

    /// Sleep between poll cycles once the queue is observed empty.
    pub poll_idle_hours: f64,
    /// Sleep between receives while draining a burst of queued messages.
    pub drain_pause_secs: u64,
    /// Back-off after a transient queue/store failure.
    pub error_backoff_secs: u64,
    pub receive_timeout_secs: u64,

    pub deploy_subscription: String,
    pub deploy_resource_group: String,
    /// Serving app whose settings point at the live model artifact.
    pub deploy_app_name: String,
    /// Settings key the serving app reads the artifact location from.
    pub model_setting_key: String,
}

impl PromoterConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_idle_hours * 3600.0)
    }
    pub fn drain_pause(&self) -> Duration {
        Duration::from_secs(self.drain_pause_secs)
    }
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }
}

pub async fn load_config(service: &str) -> Result<PromoterConfig> {
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("health_port", 8080)?
        .set_default("storage_url", "http://127.0.0.1:10000/devstore")?
        .set_default("queue_url", "http://127.0.0.1:10001/devqueue")?
        .set_default("registry_container", "models")?
        .set_default("metadata_suffix", ".metadata.json")?
        .set_default("artifact_suffix", ".onnx")?
        .set_default("poll_idle_hours", 6.0)?
        .set_default("drain_pause_secs", 5)?
        .set_default("error_backoff_secs", 300)?
        .set_default("receive_timeout_secs", 30)?
        .set_default("deploy_subscription", "")?
        .set_default("deploy_resource_group", "")?
        .set_default("deploy_app_name", "forecast-api")?
        .set_default("model_setting_key", "MODEL_ARTIFACT_URL")?;

    if let Ok(file) = std::env::var("PROMOTER_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    if let Ok(http_url) = std::env::var("PROMOTER_CONFIG_HTTP") {
        if let Ok(resp) = reqwest::get(http_url.clone()).await {
            if let Ok(text) = resp.text().await {
                builder = builder.add_source(config::File::from_str(&text, config::FileFormat::Yaml));
            }
        }
    }
    builder = builder.add_source(config::Environment::with_prefix("PROMOTER").separator("__"));
    let cfg = builder.build()?;
    Ok(cfg.try_deserialize()?)
}
