//! §4.4.4 BayesianPredictor — conjugate normal-mean update over observed
//! consumption rates.

use super::{
    accuracy_from_relative_errors, relative_error, ConsumptionReport, Estimate, Lifecycle,
    Predictor, TrainingStatus,
};
use crate::domain::PredictionModelConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const PRIOR_MEAN: f64 = 1.0;
const PRIOR_PRECISION: f64 = 1.0;

pub struct BayesianPredictor {
    observations: Vec<f64>, // consumed_per_day samples
    last_level: Option<f64>,
    last_timestamp: Option<DateTime<Utc>>,
    lifecycle: Lifecycle,
}

impl BayesianPredictor {
    pub fn new() -> Self {
        Self {
            observations: Vec::new(),
            last_level: None,
            last_timestamp: None,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Posterior mean/variance given the observations seen so far, per the
    /// conjugate update in §4.4.4.
    fn posterior(observations: &[f64]) -> (f64, f64) {
        let n = observations.len() as f64;
        if n == 0.0 {
            return (PRIOR_MEAN, 1.0 / PRIOR_PRECISION);
        }
        let sample_mean = observations.iter().sum::<f64>() / n;
        let posterior_precision = PRIOR_PRECISION + n;
        let posterior_mean =
            (PRIOR_PRECISION * PRIOR_MEAN + n * sample_mean) / posterior_precision;
        let posterior_variance = 1.0 / posterior_precision;
        (posterior_mean, posterior_variance)
    }

    fn hold_one_out_errors(observations: &[f64]) -> Vec<f64> {
        let mut errors = Vec::new();
        for i in 1..observations.len() {
            let (mean, _) = Self::posterior(&observations[..i]);
            errors.push(relative_error(observations[i], mean));
        }
        errors
    }
}

impl Default for BayesianPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for BayesianPredictor {
    fn name(&self) -> &'static str {
        "bayesian"
    }

    fn predict(&self, target_time: DateTime<Utc>) -> Estimate {
        let last_level = self.last_level.unwrap_or(0.0);
        if !self.is_training_complete() {
            return Estimate::collecting("bayesian", last_level, target_time);
        }

        let days_ahead = self
            .last_timestamp
            .map(|t| (target_time - t).num_seconds() as f64 / 86_400.0)
            .unwrap_or(0.0)
            .max(0.0);

        let (posterior_mean, posterior_variance) = Self::posterior(&self.observations);
        let point = (last_level - posterior_mean * days_ahead).max(0.0);
        let spread = 1.96 * (posterior_variance * days_ahead.max(0.0)).sqrt();

        Estimate {
            point,
            lower_bound: (point - spread).max(0.0),
            upper_bound: point + spread,
            confidence: super::confidence_from(
                self.training_status().accuracy,
                self.observations.len(),
            ),
            next_check: target_time,
            model_tag: "bayesian",
            recommendation: format!("posterior mean rate {posterior_mean:.3}/day"),
        }
    }

    fn update(&mut self, report: &ConsumptionReport) {
        if let (Some(last_level), Some(last_ts)) = (self.last_level, self.last_timestamp) {
            let delta = last_level - report.level;
            if delta > 0.0 {
                let days =
                    ((report.timestamp - last_ts).num_seconds() as f64 / 86_400.0).max(0.01);
                self.observations.push(delta / days);
            }
        }

        self.last_level = Some(report.level);
        self.last_timestamp = Some(report.timestamp);

        let crossed = self.lifecycle.observe(report.timestamp);
        if crossed {
            self.lifecycle.complete_fit();
        }
    }

    fn start_training(&mut self, min_samples: usize, parameters: HashMap<String, f64>) {
        self.lifecycle.start_training(min_samples, parameters);
    }

    fn training_status(&self) -> TrainingStatus {
        let errors = Self::hold_one_out_errors(&self.observations);
        let accuracy = accuracy_from_relative_errors(&errors);
        self.lifecycle.to_status(accuracy)
    }

    fn get_model(&self) -> PredictionModelConfig {
        PredictionModelConfig::Bayesian
    }

    fn set_parameters(&mut self, parameters: HashMap<String, f64>) {
        self.lifecycle.parameters = parameters;
        self.lifecycle.begin_retrain();
        self.lifecycle.complete_fit();
    }

    fn get_parameters(&self) -> HashMap<String, f64> {
        let (mean, variance) = Self::posterior(&self.observations);
        let mut params = HashMap::new();
        params.insert("posterior_mean".to_string(), mean);
        params.insert("posterior_variance".to_string(), variance);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn report(level: f64, t: DateTime<Utc>) -> ConsumptionReport {
        ConsumptionReport {
            item_id: Uuid::new_v4(),
            timestamp: t,
            level,
            context: "test".into(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn posterior_interval_clipped_at_zero() {
        let mut p = BayesianPredictor::new();
        p.start_training(2, HashMap::new());
        let mut t = Utc::now();
        let mut level = 10.0;
        for _ in 0..3 {
            t += chrono::Duration::days(1);
            level -= 3.0;
            p.update(&report(level.max(0.0), t));
        }
        let est = p.predict(t + chrono::Duration::days(30));
        assert!(est.lower_bound >= 0.0);
        assert!(est.lower_bound <= est.point && est.point <= est.upper_bound);
    }
}
