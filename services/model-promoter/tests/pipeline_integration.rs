//! End-to-end pipeline tests over the in-memory collaborators: a created
//! event in the queue ends with the serving app's settings pointing at the
//! winning artifact.

use model_promoter::cache::ModelCache;
use model_promoter::clients::{
    DeployApp, InMemoryChangeQueue, InMemoryDeployTarget, InMemoryObjectStore, ObjectStore,
};
use model_promoter::deployment::DeploymentTrigger;
use model_promoter::envelope::{encode_change_envelope, OBJECT_CREATED_EVENT};
use model_promoter::evaluation::EvaluationEngine;
use model_promoter::monitor::{MonitorConfig, RegistryMonitor};
use model_promoter::worker::PromotionWorker;
use promoter_core::BackoffPolicy;
use std::sync::Arc;
use std::time::Duration;

const SETTING_KEY: &str = "MODEL_ARTIFACT_URL";

struct Harness {
    queue: Arc<InMemoryChangeQueue>,
    store: Arc<InMemoryObjectStore>,
    target: Arc<InMemoryDeployTarget>,
    cache: Arc<ModelCache>,
    monitor: Arc<RegistryMonitor>,
    engine: Arc<EvaluationEngine>,
    trigger: Arc<DeploymentTrigger>,
}

fn harness() -> Harness {
    let queue = Arc::new(InMemoryChangeQueue::new());
    let store = Arc::new(InMemoryObjectStore::new("https://store.example.net"));
    let target = Arc::new(InMemoryDeployTarget::new());
    target.register_app("forecast-api");
    let cache = Arc::new(ModelCache::new());
    let cfg = MonitorConfig {
        container: "models".into(),
        metadata_suffix: ".metadata.json".into(),
        artifact_suffix: ".onnx".into(),
        idle_interval: Duration::from_millis(10),
        drain_pause: Duration::from_millis(1),
        error_backoff: Duration::from_millis(5),
        receive_timeout: Duration::from_millis(5),
        download_retry: BackoffPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
        },
    };
    let monitor = Arc::new(RegistryMonitor::new(queue.clone(), store.clone(), cache.clone(), cfg));
    let engine = Arc::new(EvaluationEngine::new(cache.clone()));
    let trigger = Arc::new(DeploymentTrigger::new(
        target.clone(),
        DeployApp {
            subscription: "sub".into(),
            resource_group: "rg".into(),
            name: "forecast-api".into(),
        },
        SETTING_KEY.into(),
    ));
    Harness { queue, store, target, cache, monitor, engine, trigger }
}

fn metadata_doc(version: &str, rmse_cv: f64, r2: f64, splits: u32) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "model_type": "Ridge (Linear)",
        "training_timestamp": version,
        "target": "minutes_until_dry",
        "feature_names": ["humidity", "temperature", "wind_speed"],
        "alpha": 0.5,
        "cross_val_splits": splits,
        "rmse_cv": rmse_cv,
        "r2": r2
    }))
    .unwrap()
}

fn seed_and_notify(h: &Harness, version: &str, rmse_cv: f64, r2: f64, splits: u32) {
    let name = format!("{version}.metadata.json");
    h.store.put_object("models", &name, metadata_doc(version, rmse_cv, r2, splits));
    let url = h.store.object_uri("models", &name);
    h.queue.push(encode_change_envelope(OBJECT_CREATED_EVENT, &url));
}

async fn wait_for_setting(target: &InMemoryDeployTarget, expected: &str) {
    for _ in 0..200 {
        if target
            .settings("forecast-api")
            .and_then(|s| s.get(SETTING_KEY).cloned())
            .as_deref()
            == Some(expected)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("serving app never pointed at `{expected}`");
}

#[tokio::test]
async fn created_event_flows_through_to_deployment() {
    let h = harness();
    seed_and_notify(&h, "2024-05-02T08-30-00", 43.93, 0.85, 5);

    let worker = PromotionWorker::start(
        h.monitor.clone(),
        h.engine.clone(),
        h.trigger.clone(),
        h.cache.clone(),
    )
    .await
    .unwrap();

    wait_for_setting(&h.target, "https://store.example.net/models/2024-05-02T08-30-00.onnx").await;
    assert_eq!(h.cache.size(), 1);
    let record = h
        .cache
        .find("LinearRegression", "2024-05-02T08-30-00")
        .unwrap();
    assert!(record.download_url().ends_with(".onnx"));
    worker.shutdown().await;
}

#[tokio::test]
async fn best_of_a_burst_wins_the_promotion() {
    let h = harness();
    // a shaky candidate with few folds and a solid one; the solid one must
    // win even though the shaky score arrives first
    seed_and_notify(&h, "2024-01-01", 252.93, 0.42, 3);
    seed_and_notify(&h, "2024-01-02", 43.93, 0.85, 5);

    let worker = PromotionWorker::start(
        h.monitor.clone(),
        h.engine.clone(),
        h.trigger.clone(),
        h.cache.clone(),
    )
    .await
    .unwrap();

    wait_for_setting(&h.target, "https://store.example.net/models/2024-01-02.onnx").await;
    assert_eq!(h.cache.size(), 2);
    worker.shutdown().await;
}

#[tokio::test]
async fn bootstrap_populates_cache_before_polling() {
    let h = harness();
    // registry already holds a model; no queue message for it
    let name = "2023-12-01.metadata.json";
    h.store.put_object("models", name, metadata_doc("2023-12-01", 50.0, 0.8, 5));

    let worker = PromotionWorker::start(
        h.monitor.clone(),
        h.engine.clone(),
        h.trigger.clone(),
        h.cache.clone(),
    )
    .await
    .unwrap();

    assert_eq!(h.cache.size(), 1, "bulk load runs before the poll loop");
    // the first idle cycle broadcasts and promotes the bootstrapped model
    wait_for_setting(&h.target, "https://store.example.net/models/2023-12-01.onnx").await;
    worker.shutdown().await;
}

#[tokio::test]
async fn malformed_metadata_never_reaches_deployment() {
    let h = harness();
    h.store.put_object("models", "bad.metadata.json", b"{broken".to_vec());
    let url = h.store.object_uri("models", "bad.metadata.json");
    h.queue.push(encode_change_envelope(OBJECT_CREATED_EVENT, &url));

    let worker = PromotionWorker::start(
        h.monitor.clone(),
        h.engine.clone(),
        h.trigger.clone(),
        h.cache.clone(),
    )
    .await
    .unwrap();

    // give the loop time to settle the poison message
    for _ in 0..100 {
        if h.queue.deleted_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.queue.deleted_count(), 1, "poison message is consumed, not retried");
    assert_eq!(h.cache.size(), 0);
    assert_eq!(
        h.target.settings("forecast-api").unwrap().get(SETTING_KEY),
        None,
        "nothing was promoted"
    );
    worker.shutdown().await;
}
