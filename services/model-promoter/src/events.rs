//! In-process typed pub/sub.
//!
//! Each producer owns a `Broadcaster<T>`; consumers register an async handler
//! and get back a token that removes exactly that handler. Handlers run
//! sequentially, in subscription order, on the broadcasting task; a handler
//! error aborts the remaining handlers for that broadcast and propagates to
//! the broadcaster's caller.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::model::ModelRecord;

/// Signal that the registry monitor finished a drain cycle; carries no data,
/// subscribers re-query the cache.
#[derive(Debug, Clone, Copy)]
pub struct ModelsAdded;

/// Outcome of an evaluation pass, carrying the winning record.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub winner: ModelRecord,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Handler<T> = Arc<dyn Fn(T) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

pub struct Broadcaster<T> {
    event_name: &'static str,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriberId, Handler<T>)>>,
}

impl<T: Clone> Broadcaster<T> {
    pub fn new(event_name: &'static str) -> Self {
        Self { event_name, next_id: AtomicU64::new(1), handlers: Mutex::new(Vec::new()) }
    }

    pub fn subscribe(&self, handler: Handler<T>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, handler));
        id
    }

    /// Remove exactly the handler registered under `id`. Safe to call twice;
    /// the second call reports `false`.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() < before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Invoke every handler with a clone of `payload`, in subscription order,
    /// on the calling task. Broadcasting with zero subscribers succeeds.
    pub async fn broadcast(&self, payload: T) -> Result<()> {
        let handlers: Vec<(SubscriberId, Handler<T>)> = self.handlers.lock().clone();
        if handlers.is_empty() {
            info!(event = self.event_name, "broadcast_without_subscribers");
            return Ok(());
        }
        for (id, handler) in handlers {
            handler(payload.clone())
                .await
                .with_context(|| format!("subscriber {:?} failed handling `{}`", id, self.event_name))?;
        }
        Ok(())
    }
}
