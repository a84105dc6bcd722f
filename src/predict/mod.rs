//! Predictor Framework (§4.3): the uniform contract every consumption
//! estimator implements, plus the dispatch enum wrapping the six concrete
//! predictors (§4.4).

mod bayesian;
mod croston;
mod drift_impulse;
mod markov;
mod memory_window;
mod parametric;

pub use bayesian::BayesianPredictor;
pub use croston::CrostonPredictor;
pub use drift_impulse::DriftImpulsePredictor;
pub use markov::MarkovPredictor;
pub use memory_window::MemoryWindowPredictor;
pub use parametric::ParametricPredictor;

use crate::domain::{Metadata, PredictionModelConfig};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Training lifecycle stage (§4.3). Transitions:
/// `Collecting -> Learning -> Trained -> Retraining -> Learning -> Trained`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Collecting,
    Learning,
    Trained,
    Retraining,
}

#[derive(Debug, Clone)]
pub struct TrainingStatus {
    pub stage: Stage,
    pub samples_collected: usize,
    pub min_samples: usize,
    pub accuracy: f64,
    pub last_updated: DateTime<Utc>,
    pub parameters: HashMap<String, f64>,
}

/// A single level observation fed to `Predictor::update` (§4.3).
#[derive(Debug, Clone)]
pub struct ConsumptionReport {
    pub item_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: f64,
    pub context: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct Estimate {
    pub point: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence: f64,
    pub next_check: DateTime<Utc>,
    pub model_tag: &'static str,
    pub recommendation: String,
}

impl Estimate {
    /// A degenerate estimate for when training is incomplete (§4.3):
    /// centered on the last observed level, confidence capped at 0.4.
    pub fn collecting(model_tag: &'static str, last_level: f64, now: DateTime<Utc>) -> Self {
        Self {
            point: last_level,
            lower_bound: last_level,
            upper_bound: last_level,
            confidence: 0.3,
            next_check: now + chrono::Duration::hours(24),
            model_tag,
            recommendation: "collecting data".into(),
        }
    }
}

/// The uniform predictor contract (§4.3).
pub trait Predictor: Send {
    fn name(&self) -> &'static str;

    fn predict(&self, target_time: DateTime<Utc>) -> Estimate;

    /// Must be commutative with respect to report order only up to
    /// permutations of equal-timestamp reports (§4.3).
    fn update(&mut self, report: &ConsumptionReport);

    fn start_training(&mut self, min_samples: usize, parameters: HashMap<String, f64>);

    fn training_status(&self) -> TrainingStatus;

    fn is_training_complete(&self) -> bool {
        self.training_status().stage == Stage::Trained
    }

    fn get_model(&self) -> PredictionModelConfig;

    fn set_parameters(&mut self, parameters: HashMap<String, f64>);

    fn get_parameters(&self) -> HashMap<String, f64>;
}

/// Accuracy is `1 - mean_relative_error`, clipped to `[0, 1]` (§4.3).
pub fn accuracy_from_relative_errors(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    let mean = errors.iter().sum::<f64>() / errors.len() as f64;
    (1.0 - mean).clamp(0.0, 1.0)
}

/// Confidence blends accuracy with how many samples back it, bounded to
/// `[0.3, 0.95]` (§4.3). Individual predictors may override this (Markov
/// uses the chosen transition's probability directly — §4.4.1).
pub fn confidence_from(accuracy: f64, samples: usize) -> f64 {
    let sample_weight = samples as f64 / (samples as f64 + 10.0);
    (0.3 + 0.65 * accuracy * sample_weight).clamp(0.3, 0.95)
}

fn relative_error(actual: f64, predicted: f64) -> f64 {
    if actual.abs() < f64::EPSILON {
        (predicted - actual).abs()
    } else {
        ((predicted - actual) / actual).abs()
    }
}

/// Shared training-stage bookkeeping every concrete predictor embeds. Not
/// part of the `Predictor` trait itself — each predictor owns one of these
/// and reports through it, keeping the state machine's transitions
/// (§4.3) in exactly one place.
pub(crate) struct Lifecycle {
    pub stage: Stage,
    pub samples_collected: usize,
    pub min_samples: usize,
    pub last_updated: DateTime<Utc>,
    pub parameters: HashMap<String, f64>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            stage: Stage::Collecting,
            samples_collected: 0,
            min_samples: 10,
            last_updated: Utc::now(),
            parameters: HashMap::new(),
        }
    }

    pub fn start_training(&mut self, min_samples: usize, parameters: HashMap<String, f64>) {
        self.min_samples = min_samples.max(1);
        self.parameters = parameters;
    }

    /// Records one observation; returns `true` if this observation crosses
    /// `min_samples` and the caller should now run its fit routine.
    pub fn observe(&mut self, at: DateTime<Utc>) -> bool {
        self.samples_collected += 1;
        self.last_updated = at;
        if self.stage == Stage::Collecting && self.samples_collected >= self.min_samples {
            self.stage = Stage::Learning;
            true
        } else {
            false
        }
    }

    pub fn complete_fit(&mut self) {
        if self.stage == Stage::Learning {
            self.stage = Stage::Trained;
        }
    }

    /// `SetParameters` on a trained predictor: Trained -> Retraining ->
    /// Learning, with the fit running once learning is re-entered.
    pub fn begin_retrain(&mut self) {
        if self.stage == Stage::Trained {
            self.stage = Stage::Retraining;
            self.stage = Stage::Learning;
        }
    }

    pub fn to_status(&self, accuracy: f64) -> TrainingStatus {
        TrainingStatus {
            stage: self.stage,
            samples_collected: self.samples_collected,
            min_samples: self.min_samples,
            accuracy,
            last_updated: self.last_updated,
            parameters: self.parameters.clone(),
        }
    }
}

/// Dispatch table keyed by kind (§9 "Predictor polymorphism") — a sum type
/// over the six concrete predictors behind the one `Predictor` contract.
pub enum PredictorHandle {
    Markov(MarkovPredictor),
    Croston(CrostonPredictor),
    DriftImpulse(DriftImpulsePredictor),
    Bayesian(BayesianPredictor),
    MemoryWindow(MemoryWindowPredictor),
    Parametric(ParametricPredictor),
}

impl PredictorHandle {
    pub fn new(model: &PredictionModelConfig) -> Self {
        match model {
            PredictionModelConfig::Markov => PredictorHandle::Markov(MarkovPredictor::new()),
            PredictionModelConfig::Croston => PredictorHandle::Croston(CrostonPredictor::new()),
            PredictionModelConfig::DriftImpulse => {
                PredictorHandle::DriftImpulse(DriftImpulsePredictor::new())
            }
            PredictionModelConfig::Bayesian => {
                PredictorHandle::Bayesian(BayesianPredictor::new())
            }
            PredictionModelConfig::MemoryWindow => {
                PredictorHandle::MemoryWindow(MemoryWindowPredictor::new())
            }
            PredictionModelConfig::Parametric(kind) => {
                PredictorHandle::Parametric(ParametricPredictor::new(*kind))
            }
        }
    }

    pub fn as_predictor(&self) -> &dyn Predictor {
        match self {
            PredictorHandle::Markov(p) => p,
            PredictorHandle::Croston(p) => p,
            PredictorHandle::DriftImpulse(p) => p,
            PredictorHandle::Bayesian(p) => p,
            PredictorHandle::MemoryWindow(p) => p,
            PredictorHandle::Parametric(p) => p,
        }
    }

    pub fn as_predictor_mut(&mut self) -> &mut dyn Predictor {
        match self {
            PredictorHandle::Markov(p) => p,
            PredictorHandle::Croston(p) => p,
            PredictorHandle::DriftImpulse(p) => p,
            PredictorHandle::Bayesian(p) => p,
            PredictorHandle::MemoryWindow(p) => p,
            PredictorHandle::Parametric(p) => p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_clips_to_unit_interval() {
        assert_eq!(accuracy_from_relative_errors(&[]), 0.0);
        assert_eq!(accuracy_from_relative_errors(&[2.0, 3.0]), 0.0);
        assert_eq!(accuracy_from_relative_errors(&[0.0, 0.0]), 1.0);
        let acc = accuracy_from_relative_errors(&[0.1, 0.3]);
        assert!((0.0..=1.0).contains(&acc));
    }

    #[test]
    fn confidence_bounded() {
        for acc in [0.0, 0.5, 1.0] {
            for samples in [0, 5, 1000] {
                let c = confidence_from(acc, samples);
                assert!((0.3..=0.95).contains(&c));
            }
        }
    }
}
