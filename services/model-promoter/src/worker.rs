//! Background worker that wires and drives the pipeline.
//!
//! Owns the subscriptions (evaluation listens to the monitor, deployment
//! listens to evaluation), the startup bulk load, the poll-loop task and
//! graceful shutdown.

use crate::cache::ModelCache;
use crate::deployment::DeploymentTrigger;
use crate::evaluation::EvaluationEngine;
use crate::events::{EvaluationOutcome, ModelsAdded, SubscriberId};
use crate::monitor::RegistryMonitor;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct PromotionWorker {
    monitor: Arc<RegistryMonitor>,
    engine: Arc<EvaluationEngine>,
    evaluation_subscription: SubscriberId,
    deployment_subscription: SubscriberId,
    shutdown: watch::Sender<bool>,
    poll_task: JoinHandle<()>,
}

impl PromotionWorker {
    /// Wire the subscriptions, bulk-load the registry when the cache starts
    /// empty, then spawn the poll loop.
    pub async fn start(
        monitor: Arc<RegistryMonitor>,
        engine: Arc<EvaluationEngine>,
        trigger: Arc<DeploymentTrigger>,
        cache: Arc<ModelCache>,
    ) -> Result<Self> {
        let evaluation_subscription = {
            let engine = engine.clone();
            monitor.models_added().subscribe(Arc::new(move |_signal: ModelsAdded| {
                let engine = engine.clone();
                Box::pin(async move { engine.run_pass().await })
            }))
        };
        let deployment_subscription = {
            let trigger = trigger.clone();
            engine.evaluated().subscribe(Arc::new(move |outcome: EvaluationOutcome| {
                let trigger = trigger.clone();
                Box::pin(async move { trigger.promote(&outcome.winner).await })
            }))
        };

        if cache.is_empty() {
            match monitor.bootstrap_load().await {
                Ok(loaded) => info!(loaded, "bootstrap_load_complete"),
                // the poll loop still runs; the registry backfills via messages
                Err(e) => warn!(error=?e, "bootstrap_load_failed"),
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let poll_monitor = monitor.clone();
        let poll_task = tokio::spawn(async move { poll_monitor.run(shutdown_rx).await });
        info!("promotion_worker_started");
        Ok(Self {
            monitor,
            engine,
            evaluation_subscription,
            deployment_subscription,
            shutdown,
            poll_task,
        })
    }

    /// Stop the poll loop, letting it settle any in-flight message, then
    /// detach every listener.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.poll_task.await {
            warn!(error=?e, "poll_task_join_failed");
        }
        self.monitor.models_added().unsubscribe(self.evaluation_subscription);
        self.engine.evaluated().unsubscribe(self.deployment_subscription);
        info!("promotion_worker_stopped");
    }
}
