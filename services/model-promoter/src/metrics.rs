//! Prometheus metrics for the promotion pipeline, exposed by the core
//! health server's `/metrics` endpoint.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};

pub struct PromotionMetrics {
    pub queue_messages_total: IntCounter,
    pub decode_failures_total: IntCounter,
    pub cached_models: IntGauge,
    pub evaluation_passes_total: IntCounter,
    pub promotions_total: IntCounter,
    pub evaluation_latency_ms: Histogram,
}

pub static PROMOTION_METRICS: Lazy<PromotionMetrics> = Lazy::new(|| PromotionMetrics {
    queue_messages_total: register_int_counter!(
        "promoter_queue_messages_total",
        "Change-notification messages received from the queue"
    )
    .expect("register promoter_queue_messages_total"),
    decode_failures_total: register_int_counter!(
        "promoter_decode_failures_total",
        "Envelope or metadata documents dropped as undecodable"
    )
    .expect("register promoter_decode_failures_total"),
    cached_models: register_int_gauge!(
        "promoter_cached_models",
        "Model records currently held in the in-memory registry"
    )
    .expect("register promoter_cached_models"),
    evaluation_passes_total: register_int_counter!(
        "promoter_evaluation_passes_total",
        "Evaluation passes run over the cached candidate set"
    )
    .expect("register promoter_evaluation_passes_total"),
    promotions_total: register_int_counter!(
        "promoter_promotions_total",
        "Successful serving-endpoint repoints"
    )
    .expect("register promoter_promotions_total"),
    evaluation_latency_ms: register_histogram!(
        "promoter_evaluation_latency_ms",
        "Latency of a full evaluation pass (ms)"
    )
    .expect("register promoter_evaluation_latency_ms"),
});
