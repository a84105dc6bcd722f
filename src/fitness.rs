//! Fitness Tracker & Ensemble (§4.5): per-`(item_id, model)` rolling
//! accuracy, weighted ensemble prediction, and model auto-selection.

use crate::domain::ALL_MODEL_FAMILIES;
use crate::error::{Error, Result};
use crate::predict::{Estimate, Predictor, Stage};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

const HISTORY_CAPACITY: usize = 100;
const RECENT_WINDOW: usize = 20;
const ERROR_EMA_ALPHA: f64 = 0.1;
const RECENCY_DECAY: f64 = 0.1;

/// One recorded `UpdateFitness` outcome (§4.5).
#[derive(Debug, Clone)]
pub struct FitnessDataPoint {
    pub timestamp: DateTime<Utc>,
    pub actual: f64,
    pub predicted: f64,
    pub error: f64,
    pub score: f64,
}

#[derive(Debug, Clone)]
struct FitnessRecord {
    current_fitness: f64,
    prediction_count: u64,
    average_error: f64,
    error_variance: f64,
    history: VecDeque<FitnessDataPoint>,
}

impl FitnessRecord {
    fn new() -> Self {
        Self {
            current_fitness: 0.0,
            prediction_count: 0,
            average_error: 0.0,
            error_variance: 0.0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }
}

/// A read-only view of a `(item, model)` fitness record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessSnapshot {
    pub current_fitness: f64,
    pub prediction_count: u64,
    pub average_error: f64,
    pub error_variance: f64,
}

/// Process-wide `(item_id, model_family) -> fitness` map (§5 "shared
/// process-wide structure ... guarded such that reads and writes never
/// observe torn state"). A single `RwLock` over the whole map is the
/// simplest discipline that satisfies that; §9 flags sharding by item_id
/// hash as a contention mitigation if this ever becomes a bottleneck.
pub struct FitnessTracker {
    records: RwLock<HashMap<(Uuid, &'static str), FitnessRecord>>,
}

impl FitnessTracker {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// `UpdateFitness`: records one prediction-vs-actual outcome and
    /// recomputes `current_fitness` over the most recent window (§4.5).
    pub fn update_fitness(
        &self,
        item_id: Uuid,
        model_family: &'static str,
        actual: f64,
        predicted: f64,
        at: DateTime<Utc>,
    ) -> FitnessSnapshot {
        let error = relative_error(actual, predicted);
        let score = (-error).exp();

        let mut guard = self.records.write();
        let record = guard
            .entry((item_id, model_family))
            .or_insert_with(FitnessRecord::new);

        record.prediction_count += 1;
        let delta = error - record.average_error;
        record.average_error += ERROR_EMA_ALPHA * delta;
        record.error_variance =
            (1.0 - ERROR_EMA_ALPHA) * (record.error_variance + ERROR_EMA_ALPHA * delta * delta);

        if record.history.len() >= HISTORY_CAPACITY {
            record.history.pop_front();
        }
        record.history.push_back(FitnessDataPoint {
            timestamp: at,
            actual,
            predicted,
            error,
            score,
        });

        record.current_fitness = Self::recompute_current_fitness(&record.history, at);

        FitnessSnapshot {
            current_fitness: record.current_fitness,
            prediction_count: record.prediction_count,
            average_error: record.average_error,
            error_variance: record.error_variance,
        }
    }

    /// `CurrentFitness`, recomputed over the last 20 points weighted by
    /// `exp(-0.1 * days_since)` (§4.5).
    fn recompute_current_fitness(history: &VecDeque<FitnessDataPoint>, now: DateTime<Utc>) -> f64 {
        let recent: Vec<&FitnessDataPoint> = history.iter().rev().take(RECENT_WINDOW).collect();
        if recent.is_empty() {
            return 0.0;
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for point in recent {
            let days_since = (now - point.timestamp).num_seconds() as f64 / 86_400.0;
            let weight = (-RECENCY_DECAY * days_since.max(0.0)).exp();
            weighted_sum += weight * point.score;
            weight_total += weight;
        }
        if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        }
    }

    pub fn current_fitness(&self, item_id: Uuid, model_family: &str) -> Option<FitnessSnapshot> {
        self.records
            .read()
            .iter()
            .find(|((id, family), _)| *id == item_id && *family == model_family)
            .map(|(_, r)| FitnessSnapshot {
                current_fitness: r.current_fitness,
                prediction_count: r.prediction_count,
                average_error: r.average_error,
                error_variance: r.error_variance,
            })
    }

    /// Recommended-model selection (§4.5): the enabled family with the
    /// highest `current_fitness`, defaulting to the first enabled family
    /// when nothing has recorded fitness yet.
    pub fn best_model(&self, item_id: Uuid, enabled: &[&'static str]) -> Option<&'static str> {
        let guard = self.records.read();
        enabled.iter().copied().max_by(|a, b| {
            let fitness_of = |family: &str| {
                guard
                    .get(&(item_id, family))
                    .map(|r| r.current_fitness)
                    .unwrap_or(0.0)
            };
            fitness_of(a)
                .partial_cmp(&fitness_of(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

impl Default for FitnessTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn default_enabled_families() -> Vec<&'static str> {
    ALL_MODEL_FAMILIES.to_vec()
}

fn relative_error(actual: f64, predicted: f64) -> f64 {
    if actual.abs() < f64::EPSILON {
        (predicted - actual).abs()
    } else {
        ((predicted - actual) / actual).abs()
    }
}

/// `GetEnsemblePrediction` (§4.5, P8): accuracy-weighted average over every
/// predictor that is `Trained` with self-reported accuracy > 0. Errors if
/// no predictor is eligible.
pub fn ensemble_predict(
    predictors: &[&dyn Predictor],
    target_time: DateTime<Utc>,
) -> Result<Estimate> {
    let eligible: Vec<(f64, Estimate)> = predictors
        .iter()
        .filter_map(|p| {
            let status = p.training_status();
            (status.stage == Stage::Trained && status.accuracy > 0.0)
                .then(|| (status.accuracy, p.predict(target_time)))
        })
        .collect();

    if eligible.is_empty() {
        return Err(Error::FailedPrecondition(
            "no predictor is trained with positive accuracy".into(),
        ));
    }

    let total_weight: f64 = eligible.iter().map(|(w, _)| w).sum();
    let weighted = |f: fn(&Estimate) -> f64| -> f64 {
        eligible.iter().map(|(w, e)| w * f(e)).sum::<f64>() / total_weight
    };

    Ok(Estimate {
        point: weighted(|e| e.point),
        lower_bound: weighted(|e| e.lower_bound),
        upper_bound: weighted(|e| e.upper_bound),
        confidence: weighted(|e| e.confidence),
        next_check: target_time,
        model_tag: "ensemble",
        recommendation: format!("ensemble of {} eligible predictors", eligible.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_fitness_rewards_accurate_predictions() {
        let tracker = FitnessTracker::new();
        let item_id = Uuid::new_v4();
        let now = Utc::now();

        tracker.update_fitness(item_id, "croston", 100.0, 100.0, now);
        tracker.update_fitness(item_id, "croston", 90.0, 90.0, now + chrono::Duration::days(1));

        let snapshot = tracker.current_fitness(item_id, "croston").unwrap();
        assert!(snapshot.current_fitness > 0.9);
        assert_eq!(snapshot.prediction_count, 2);
    }

    #[test]
    fn best_model_prefers_higher_fitness() {
        let tracker = FitnessTracker::new();
        let item_id = Uuid::new_v4();
        let now = Utc::now();

        tracker.update_fitness(item_id, "croston", 100.0, 50.0, now);
        tracker.update_fitness(item_id, "markov", 100.0, 99.0, now);

        let best = tracker.best_model(item_id, &["croston", "markov"]);
        assert_eq!(best, Some("markov"));
    }

    #[test]
    fn ensemble_requires_at_least_one_eligible_predictor() {
        use crate::predict::MarkovPredictor;
        let p = MarkovPredictor::new();
        let predictors: Vec<&dyn Predictor> = vec![&p];
        let err = ensemble_predict(&predictors, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }
}
