//! Candidate evaluation and scoring.
//!
//! Runs on every `ModelsAdded` signal: snapshot the cache, partition by
//! family, run the family scoring workflow, broadcast the winner. Scoring is
//! a pure function of the candidate set; no I/O happens here.

use crate::cache::ModelCache;
use crate::events::{Broadcaster, EvaluationOutcome};
use crate::metrics::PROMOTION_METRICS;
use crate::model::{LinearRegressionModel, ModelRecord};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Assumed worst-case prediction horizon: one week in minutes.
const HORIZON_MINUTES: f64 = 10080.0;
const R2_LOWER_BOUND: f64 = 0.7;
const R2_UPPER_BOUND: f64 = 0.9;
/// Fold counts below this shrink rewards and deepen penalties.
const MIN_TRUSTED_SPLITS: u32 = 5;
const RMSE_WEIGHT: f64 = 0.6;
const R2_WEIGHT: f64 = 0.4;

/// Linear reward approaching 100 as the error approaches 0; past
/// `sqrt(horizon)` the reward flips into a linear penalty.
pub fn score_from_rmse(rmse_cv: f64) -> f64 {
    let limit = HORIZON_MINUTES.sqrt();
    if rmse_cv > limit {
        -(rmse_cv / HORIZON_MINUTES) * 100.0
    } else {
        100.0 - (rmse_cv / HORIZON_MINUTES) * 100.0
    }
}

/// Three bands: reward inside [0.7, 0.9], penalty below, doubled-slope
/// penalty above (an r2 close to 1 on this data means overfitting).
pub fn score_from_r2(r2: f64) -> f64 {
    if r2 > R2_UPPER_BOUND {
        -((r2 - R2_UPPER_BOUND) / (1.0 - R2_UPPER_BOUND)) * 100.0 * 2.0
    } else if r2 >= R2_LOWER_BOUND {
        ((r2 - R2_LOWER_BOUND) / (R2_UPPER_BOUND - R2_LOWER_BOUND)) * 100.0
    } else {
        -((R2_LOWER_BOUND - r2) / R2_LOWER_BOUND) * 100.0
    }
}

/// Metrics computed from too few folds are not trusted: rewards shrink to a
/// quarter and penalties deepen, so a low-split result never outranks a
/// well-validated one.
fn confidence_adjusted(score: f64, cross_val_splits: u32) -> f64 {
    if cross_val_splits >= MIN_TRUSTED_SPLITS {
        return score;
    }
    if score < 0.0 {
        score * 1.25
    } else {
        score * 0.25
    }
}

pub fn composite_score(model: &LinearRegressionModel) -> f64 {
    let blended = score_from_rmse(model.rmse_cv) * RMSE_WEIGHT + score_from_r2(model.r2) * R2_WEIGHT;
    confidence_adjusted(blended, model.cross_val_splits)
}

/// Pick the winner among the linear-regression candidates. Ties on the final
/// score go to the lexicographically greatest version (training timestamps
/// sort lexicographically, so the newest model wins), keeping reruns
/// deterministic regardless of enumeration order.
pub fn pick_linear_regression_winner(
    candidates: Vec<LinearRegressionModel>,
) -> Option<LinearRegressionModel> {
    let mut best: Option<(LinearRegressionModel, f64)> = None;
    for mut candidate in candidates {
        let score = composite_score(&candidate);
        candidate.computed_score = Some(score);
        debug!(version = %candidate.common.version, score, "candidate_scored");
        best = Some(match best.take() {
            None => (candidate, score),
            Some((incumbent, incumbent_score)) => {
                if score > incumbent_score
                    || (score == incumbent_score
                        && candidate.common.version > incumbent.common.version)
                {
                    (candidate, score)
                } else {
                    (incumbent, incumbent_score)
                }
            }
        });
    }
    best.map(|(winner, _)| winner)
}

pub struct EvaluationEngine {
    cache: Arc<ModelCache>,
    evaluated: Broadcaster<EvaluationOutcome>,
}

impl EvaluationEngine {
    pub fn new(cache: Arc<ModelCache>) -> Self {
        Self { cache, evaluated: Broadcaster::new("evaluation_complete") }
    }

    pub fn evaluated(&self) -> &Broadcaster<EvaluationOutcome> {
        &self.evaluated
    }

    /// Run one evaluation pass over a cache snapshot and broadcast the
    /// winner. An empty cache logs and returns without broadcasting.
    pub async fn run_pass(&self) -> Result<()> {
        let snapshot = self.cache.list();
        if snapshot.is_empty() {
            info!("evaluation_skipped_empty_cache");
            return Ok(());
        }
        let started = Instant::now();
        PROMOTION_METRICS.evaluation_passes_total.inc();

        let mut linear: Vec<LinearRegressionModel> = Vec::new();
        for record in snapshot {
            match record {
                ModelRecord::LinearRegression(m) => linear.push(m),
            }
        }
        let candidates = linear.len();

        // One winner per family; the overall stage is trivial while only one
        // family has a scoring workflow, and is where a cross-family
        // comparison rule would plug in.
        let mut family_winners: Vec<ModelRecord> = Vec::new();
        if let Some(winner) = pick_linear_regression_winner(linear) {
            family_winners.push(ModelRecord::LinearRegression(winner));
        }
        let overall = family_winners.into_iter().next();

        PROMOTION_METRICS
            .evaluation_latency_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        match overall {
            Some(winner) => {
                info!(
                    family = winner.family(),
                    version = winner.version(),
                    score = ?winner.computed_score(),
                    candidates,
                    "evaluation_winner_selected"
                );
                self.evaluated.broadcast(EvaluationOutcome { winner }).await
            }
            None => {
                info!(candidates, "evaluation_found_no_scorable_candidates");
                Ok(())
            }
        }
    }
}
