//! Registry monitor: the queue poll loop and the startup bulk load.
//!
//! Each poll cycle walks Idle -> Polling -> (MessageReceived | Empty) ->
//! [Processing ->] Idle. Messages are consumed at-least-once: undecodable
//! ones are deleted so they cannot poison the queue, transient failures keep
//! the message for redelivery and the cache insert is idempotent. The
//! `ModelsAdded` broadcast fires only once the queue is observed empty, so a
//! burst of uploads triggers a single evaluation pass.

use crate::cache::{CacheError, ModelCache};
use crate::clients::{ChangeQueue, ObjectStore};
use crate::envelope::{decode_change_envelope, OBJECT_CREATED_EVENT};
use crate::events::{Broadcaster, ModelsAdded};
use crate::metrics::PROMOTION_METRICS;
use crate::model::decode_model_metadata;
use anyhow::{Context, Result};
use promoter_core::{with_backoff, BackoffPolicy, PromoterConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

const BOOTSTRAP_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub container: String,
    pub metadata_suffix: String,
    pub artifact_suffix: String,
    pub idle_interval: Duration,
    pub drain_pause: Duration,
    pub error_backoff: Duration,
    pub receive_timeout: Duration,
    pub download_retry: BackoffPolicy,
}

impl From<&PromoterConfig> for MonitorConfig {
    fn from(cfg: &PromoterConfig) -> Self {
        Self {
            container: cfg.registry_container.clone(),
            metadata_suffix: cfg.metadata_suffix.clone(),
            artifact_suffix: cfg.artifact_suffix.clone(),
            idle_interval: cfg.idle_interval(),
            drain_pause: cfg.drain_pause(),
            error_backoff: cfg.error_backoff(),
            receive_timeout: cfg.receive_timeout(),
            download_retry: BackoffPolicy::default(),
        }
    }
}

/// What the next sleep should be after a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleStep {
    /// Queue observed empty; sleep the long idle interval.
    Idle,
    /// More messages pending; pause briefly and keep draining.
    Draining,
    /// Transient failure; back off before retrying.
    Backoff,
}

/// How a single message was settled.
enum Disposition {
    Ingested { key: String },
    AlreadyCached { key: String },
    Ignored { reason: &'static str },
    Undecodable { detail: String },
}

pub struct RegistryMonitor {
    queue: Arc<dyn ChangeQueue>,
    store: Arc<dyn ObjectStore>,
    cache: Arc<ModelCache>,
    cfg: MonitorConfig,
    models_added: Broadcaster<ModelsAdded>,
}

impl RegistryMonitor {
    pub fn new(
        queue: Arc<dyn ChangeQueue>,
        store: Arc<dyn ObjectStore>,
        cache: Arc<ModelCache>,
        cfg: MonitorConfig,
    ) -> Self {
        Self { queue, store, cache, cfg, models_added: Broadcaster::new("models_added") }
    }

    pub fn models_added(&self) -> &Broadcaster<ModelsAdded> {
        &self.models_added
    }

    /// Poll until the shutdown signal flips. The in-flight message is always
    /// settled before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("registry_monitor_started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let step = self.cycle().await;
            let pause = match step {
                CycleStep::Idle => self.cfg.idle_interval,
                CycleStep::Draining => self.cfg.drain_pause,
                CycleStep::Backoff => self.cfg.error_backoff,
            };
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("registry_monitor_stopped");
    }

    async fn cycle(&self) -> CycleStep {
        let received = match self.queue.receive_one(self.cfg.receive_timeout).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error=?e, "queue_receive_failed");
                return CycleStep::Backoff;
            }
        };
        if let Some(message) = received {
            PROMOTION_METRICS.queue_messages_total.inc();
            match self.handle_message(&message.body).await {
                Ok(disposition) => {
                    self.log_disposition(&disposition);
                    if let Err(e) = self.queue.delete(&message.handle).await {
                        warn!(error=?e, "queue_delete_failed");
                        return CycleStep::Backoff;
                    }
                }
                // transient: leave the message for redelivery
                Err(e) => {
                    warn!(error=?e, "message_processing_failed");
                    return CycleStep::Backoff;
                }
            }
            match self.queue.has_pending().await {
                Ok(true) => return CycleStep::Draining,
                Ok(false) => {}
                Err(e) => {
                    warn!(error=?e, "queue_peek_failed");
                    return CycleStep::Backoff;
                }
            }
        }
        // queue observed empty: tell subscribers to re-query the cache
        if let Err(e) = self.models_added.broadcast(ModelsAdded).await {
            error!(error=?e, "models_added_subscriber_failed");
        }
        CycleStep::Idle
    }

    /// Settle one message body. `Err` means a transient failure the queue
    /// should redeliver; every `Ok` disposition consumes the message.
    async fn handle_message(&self, body: &str) -> Result<Disposition> {
        let event = match decode_change_envelope(body) {
            Ok(event) => event,
            Err(e) => return Ok(Disposition::Undecodable { detail: e.to_string() }),
        };
        if event.event_type != OBJECT_CREATED_EVENT {
            return Ok(Disposition::Ignored { reason: "event_type_not_actionable" });
        }
        let url = event.data.url;
        let Some(name) = object_name_from_url(&url, &self.cfg.container) else {
            return Ok(Disposition::Ignored { reason: "url_outside_registry_container" });
        };
        if !name.ends_with(&self.cfg.metadata_suffix) {
            return Ok(Disposition::Ignored { reason: "not_a_metadata_document" });
        }
        let raw = with_backoff(&self.cfg.download_retry, |_attempt| {
            self.store.download_object(&self.cfg.container, &name)
        })
        .await
        .with_context(|| format!("download metadata `{name}`"))?;
        let Some(download_url) = swap_suffix(&url, &self.cfg.metadata_suffix, &self.cfg.artifact_suffix) else {
            return Ok(Disposition::Undecodable { detail: format!("url `{url}` lacks the metadata suffix") });
        };
        match decode_model_metadata(&raw, download_url) {
            Ok(record) => {
                let key = record.cache_key();
                match self.cache.add(record) {
                    Ok(()) => {
                        PROMOTION_METRICS.cached_models.set(self.cache.size() as i64);
                        Ok(Disposition::Ingested { key })
                    }
                    Err(CacheError::AlreadyExists(key)) => Ok(Disposition::AlreadyCached { key }),
                    Err(e) => Ok(Disposition::Undecodable { detail: e.to_string() }),
                }
            }
            Err(e) => Ok(Disposition::Undecodable { detail: e.to_string() }),
        }
    }

    fn log_disposition(&self, disposition: &Disposition) {
        match disposition {
            Disposition::Ingested { key } => info!(key = %key, "model_record_cached"),
            Disposition::AlreadyCached { key } => debug!(key = %key, "duplicate_delivery_ignored"),
            Disposition::Ignored { reason } => debug!(reason, "message_discarded"),
            Disposition::Undecodable { detail } => {
                PROMOTION_METRICS.decode_failures_total.inc();
                error!(detail = %detail, "message_dropped_undecodable");
            }
        }
    }

    /// List the registry container and load every metadata document into the
    /// cache with bounded parallelism. Per-item failures are logged and
    /// skipped; only a failure to list aborts.
    pub async fn bootstrap_load(&self) -> Result<usize> {
        let names = self
            .store
            .list_objects(&self.cfg.container)
            .await
            .context("list registry container")?;
        let metadata: Vec<String> = names
            .into_iter()
            .filter(|name| name.ends_with(&self.cfg.metadata_suffix))
            .collect();
        info!(documents = metadata.len(), "bootstrap_load_started");
        let semaphore = Arc::new(Semaphore::new(BOOTSTRAP_CONCURRENCY));
        let mut tasks = Vec::with_capacity(metadata.len());
        for name in metadata {
            let permit = semaphore.clone().acquire_owned().await.context("bootstrap semaphore closed")?;
            let store = self.store.clone();
            let cache = self.cache.clone();
            let cfg = self.cfg.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                load_one(store, cache, &cfg, &name).await
            }));
        }
        let mut loaded = 0usize;
        for task in tasks {
            match task.await {
                Ok(true) => loaded += 1,
                Ok(false) => {}
                Err(e) => warn!(error=?e, "bootstrap_task_panicked"),
            }
        }
        PROMOTION_METRICS.cached_models.set(self.cache.size() as i64);
        info!(loaded, "bootstrap_load_finished");
        Ok(loaded)
    }
}

async fn load_one(
    store: Arc<dyn ObjectStore>,
    cache: Arc<ModelCache>,
    cfg: &MonitorConfig,
    name: &str,
) -> bool {
    let raw = match with_backoff(&cfg.download_retry, |_attempt| {
        store.download_object(&cfg.container, name)
    })
    .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(name, error=?e, "bootstrap_download_failed");
            return false;
        }
    };
    let uri = store.object_uri(&cfg.container, name);
    let Some(download_url) = swap_suffix(&uri, &cfg.metadata_suffix, &cfg.artifact_suffix) else {
        warn!(name, "bootstrap_uri_suffix_mismatch");
        return false;
    };
    match decode_model_metadata(&raw, download_url) {
        Ok(record) => match cache.add(record) {
            Ok(()) => true,
            Err(CacheError::AlreadyExists(key)) => {
                debug!(key = %key, "bootstrap_record_already_cached");
                false
            }
            Err(e) => {
                warn!(name, error=%e, "bootstrap_record_rejected");
                false
            }
        },
        Err(e) => {
            warn!(name, error=%e, "bootstrap_metadata_undecodable");
            false
        }
    }
}

fn object_name_from_url(url: &str, container: &str) -> Option<String> {
    let marker = format!("/{container}/");
    let idx = url.find(&marker)?;
    let name = &url[idx + marker.len()..];
    (!name.is_empty()).then(|| name.to_string())
}

fn swap_suffix(url: &str, from: &str, to: &str) -> Option<String> {
    url.strip_suffix(from).map(|stem| format!("{stem}{to}"))
}
