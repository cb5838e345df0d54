//! Deployment trigger: repoints the serving endpoint at the winning model.
//!
//! Runs on every `EvaluationOutcome`. Failures propagate to the broadcasting
//! caller instead of being swallowed; a failed promotion is operationally
//! significant, and retry policy belongs to the resource-management client,
//! not here.

use crate::clients::{DeployApp, DeployTarget};
use crate::metrics::PROMOTION_METRICS;
use crate::model::ModelRecord;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct DeploymentTrigger {
    target: Arc<dyn DeployTarget>,
    app: DeployApp,
    model_setting_key: String,
}

impl DeploymentTrigger {
    pub fn new(target: Arc<dyn DeployTarget>, app: DeployApp, model_setting_key: String) -> Self {
        Self { target, app, model_setting_key }
    }

    /// Point the serving app's model-location setting at the winner's
    /// artifact and persist the updated settings map.
    pub async fn promote(&self, winner: &ModelRecord) -> Result<()> {
        let mut settings = self
            .target
            .fetch_settings(&self.app)
            .await
            .with_context(|| format!("fetch settings for app `{}`", self.app.name))?;
        settings.insert(self.model_setting_key.clone(), winner.download_url().to_string());
        self.target
            .apply_settings(&self.app, settings)
            .await
            .with_context(|| format!("apply settings for app `{}`", self.app.name))?;
        PROMOTION_METRICS.promotions_total.inc();
        info!(
            family = winner.family(),
            version = winner.version(),
            url = winner.download_url(),
            app = %self.app.name,
            "model_promoted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::InMemoryDeployTarget;
    use crate::model::decode_model_metadata;

    fn winner() -> ModelRecord {
        let doc = serde_json::json!({
            "model_type": "Ridge (Linear)",
            "training_timestamp": "2024-06-01",
            "target": "minutes_until_dry",
            "alpha": 0.5,
            "cross_val_splits": 5,
            "rmse_cv": 40.0,
            "r2": 0.8
        });
        decode_model_metadata(
            &serde_json::to_vec(&doc).unwrap(),
            "https://store/models/2024-06-01.onnx".into(),
        )
        .unwrap()
    }

    fn app() -> DeployApp {
        DeployApp { subscription: "sub".into(), resource_group: "rg".into(), name: "forecast-api".into() }
    }

    #[tokio::test]
    async fn promotion_updates_the_settings_map() {
        let target = Arc::new(InMemoryDeployTarget::new());
        target.register_app("forecast-api");
        let trigger = DeploymentTrigger::new(target.clone(), app(), "MODEL_ARTIFACT_URL".into());
        trigger.promote(&winner()).await.unwrap();
        let settings = target.settings("forecast-api").unwrap();
        assert_eq!(
            settings.get("MODEL_ARTIFACT_URL").map(String::as_str),
            Some("https://store/models/2024-06-01.onnx")
        );
    }

    #[tokio::test]
    async fn missing_app_propagates_the_failure() {
        let target = Arc::new(InMemoryDeployTarget::new());
        let trigger = DeploymentTrigger::new(target, app(), "MODEL_ARTIFACT_URL".into());
        assert!(trigger.promote(&winner()).await.is_err());
    }
}
