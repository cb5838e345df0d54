use anyhow::Result;
use model_promoter::cache::ModelCache;
use model_promoter::clients::{
    DeployApp, InMemoryChangeQueue, InMemoryDeployTarget, InMemoryObjectStore,
};
use model_promoter::deployment::DeploymentTrigger;
use model_promoter::evaluation::EvaluationEngine;
use model_promoter::monitor::{MonitorConfig, RegistryMonitor};
use model_promoter::worker::PromotionWorker;
use promoter_core::{init_tracing, load_config, mark_ready, start_health_server};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("model-promoter")?;
    let cfg = load_config("model-promoter").await?;
    start_health_server(cfg.health_port).await?;
    info!(
        container = %cfg.registry_container,
        app = %cfg.deploy_app_name,
        "starting model-promoter"
    );

    // In-memory clients back local runs; the SDK wrappers for the object
    // store, change queue and resource-management API implement the same
    // traits and slot in here.
    let store = Arc::new(InMemoryObjectStore::new(cfg.storage_url.trim_end_matches('/').to_string()));
    let queue = Arc::new(InMemoryChangeQueue::new());
    let target = Arc::new(InMemoryDeployTarget::new());
    target.register_app(&cfg.deploy_app_name);

    let cache = Arc::new(ModelCache::new());
    let monitor = Arc::new(RegistryMonitor::new(
        queue,
        store,
        cache.clone(),
        MonitorConfig::from(&cfg),
    ));
    let engine = Arc::new(EvaluationEngine::new(cache.clone()));
    let trigger = Arc::new(DeploymentTrigger::new(
        target,
        DeployApp {
            subscription: cfg.deploy_subscription.clone(),
            resource_group: cfg.deploy_resource_group.clone(),
            name: cfg.deploy_app_name.clone(),
        },
        cfg.model_setting_key.clone(),
    ));

    let worker = PromotionWorker::start(monitor, engine, trigger, cache).await?;
    mark_ready();

    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");
    promoter_core::clear_ready();
    worker.shutdown().await;
    Ok(())
}
