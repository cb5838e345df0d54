//! Model promotion pipeline.
//!
//! Watches the model registry for new candidates, caches their metadata,
//! scores candidates of the same family against each other and repoints the
//! serving endpoint at the winner. Components communicate through typed
//! in-process events rather than direct calls:
//!
//! store change -> queue message -> `RegistryMonitor` -> `ModelCache` ->
//! `ModelsAdded` -> `EvaluationEngine` -> `EvaluationOutcome` ->
//! `DeploymentTrigger` -> serving endpoint settings.

pub mod cache;
pub mod clients;
pub mod deployment;
pub mod envelope;
pub mod evaluation;
pub mod events;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod worker;

pub use cache::{CacheError, ModelCache};
pub use deployment::DeploymentTrigger;
pub use evaluation::EvaluationEngine;
pub use events::{Broadcaster, EvaluationOutcome, ModelsAdded, SubscriberId};
pub use model::{ModelRecord, MetadataError};
pub use monitor::{MonitorConfig, RegistryMonitor};
pub use worker::PromotionWorker;
