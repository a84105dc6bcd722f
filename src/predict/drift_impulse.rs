//! §4.4.3 DriftImpulsePredictor — `level(t+Δ) = level(t) - DriftRate·Δ + Σ
//! impulses`. Positive deltas are impulses (restocks); negative deltas give
//! a drift-rate sample.

use super::{
    accuracy_from_relative_errors, relative_error, ConsumptionReport, Estimate, Lifecycle,
    Predictor, TrainingStatus,
};
use crate::domain::PredictionModelConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const SMOOTHING_GRID: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];

struct DriftSample {
    rate_per_day: f64,
}

pub struct DriftImpulsePredictor {
    smoothing: f64,
    drift_rate: Option<f64>,
    variance: f64,
    last_level: Option<f64>,
    last_timestamp: Option<DateTime<Utc>>,
    samples: Vec<DriftSample>,
    lifecycle: Lifecycle,
}

impl DriftImpulsePredictor {
    pub fn new() -> Self {
        Self {
            smoothing: 0.5,
            drift_rate: None,
            variance: 0.0,
            last_level: None,
            last_timestamp: None,
            samples: Vec::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    fn simulate(samples: &[DriftSample], smoothing: f64) -> (f64, f64, Vec<f64>) {
        let mut rate = 0.0;
        let mut initialized = false;
        let mut errors = Vec::new();
        let mut sq_residuals = Vec::new();

        for s in samples {
            if initialized {
                errors.push(relative_error(s.rate_per_day, rate));
                sq_residuals.push((s.rate_per_day - rate).powi(2));
                rate = smoothing * s.rate_per_day + (1.0 - smoothing) * rate;
            } else {
                rate = s.rate_per_day;
                initialized = true;
            }
        }

        let variance = if sq_residuals.is_empty() {
            0.0
        } else {
            sq_residuals.iter().sum::<f64>() / sq_residuals.len() as f64
        };

        (rate, variance, errors)
    }

    fn refit(&mut self) {
        let mut best_smoothing = self.smoothing;
        let mut best_accuracy = f64::MIN;
        let mut best_state = (self.drift_rate.unwrap_or(0.0), self.variance);

        for &smoothing in &SMOOTHING_GRID {
            let (rate, variance, errors) = Self::simulate(&self.samples, smoothing);
            let accuracy = accuracy_from_relative_errors(&errors);
            if accuracy > best_accuracy {
                best_accuracy = accuracy;
                best_smoothing = smoothing;
                best_state = (rate, variance);
            }
        }

        self.smoothing = best_smoothing;
        self.drift_rate = Some(best_state.0);
        self.variance = best_state.1;
    }
}

impl Default for DriftImpulsePredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for DriftImpulsePredictor {
    fn name(&self) -> &'static str {
        "drift_impulse"
    }

    fn predict(&self, target_time: DateTime<Utc>) -> Estimate {
        let last_level = self.last_level.unwrap_or(0.0);
        if !self.is_training_complete() {
            return Estimate::collecting("drift_impulse", last_level, target_time);
        }

        let days_ahead = self
            .last_timestamp
            .map(|t| (target_time - t).num_seconds() as f64 / 86_400.0)
            .unwrap_or(0.0)
            .max(0.0);

        let rate = self.drift_rate.unwrap_or(0.0);
        let point = (last_level - rate * days_ahead).max(0.0);
        let spread = (self.variance.max(0.0)).sqrt() * days_ahead.max(1.0).sqrt();
        let accuracy = self.training_status().accuracy;

        Estimate {
            point,
            lower_bound: (point - spread).max(0.0),
            upper_bound: point + spread,
            confidence: super::confidence_from(accuracy, self.samples.len()),
            next_check: target_time,
            model_tag: "drift_impulse",
            recommendation: format!("drift rate {rate:.3}/day"),
        }
    }

    fn update(&mut self, report: &ConsumptionReport) {
        if let (Some(last_level), Some(last_ts)) = (self.last_level, self.last_timestamp) {
            let delta = report.level - last_level;
            if delta < 0.0 {
                let days = ((report.timestamp - last_ts).num_seconds() as f64 / 86_400.0).max(0.01);
                self.samples.push(DriftSample {
                    rate_per_day: -delta / days,
                });
            }
            // positive deltas are impulses (restocks): no drift sample, but
            // still observed for training-progress purposes.
        }

        self.last_level = Some(report.level);
        self.last_timestamp = Some(report.timestamp);

        let crossed = self.lifecycle.observe(report.timestamp);
        if crossed {
            self.refit();
            self.lifecycle.complete_fit();
        }
    }

    fn start_training(&mut self, min_samples: usize, parameters: HashMap<String, f64>) {
        if let Some(s) = parameters.get("smoothing") {
            self.smoothing = *s;
        }
        self.lifecycle.start_training(min_samples, parameters);
    }

    fn training_status(&self) -> TrainingStatus {
        let (_, _, errors) = Self::simulate(&self.samples, self.smoothing);
        let accuracy = accuracy_from_relative_errors(&errors);
        self.lifecycle.to_status(accuracy)
    }

    fn get_model(&self) -> PredictionModelConfig {
        PredictionModelConfig::DriftImpulse
    }

    fn set_parameters(&mut self, parameters: HashMap<String, f64>) {
        if let Some(s) = parameters.get("smoothing") {
            self.smoothing = *s;
        }
        self.lifecycle.parameters = parameters;
        self.lifecycle.begin_retrain();
        self.refit();
        self.lifecycle.complete_fit();
    }

    fn get_parameters(&self) -> HashMap<String, f64> {
        let mut params = HashMap::new();
        params.insert("smoothing".to_string(), self.smoothing);
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
    fn impulses_do_not_feed_drift_samples() {
        let mut p = DriftImpulsePredictor::new();
        p.start_training(2, HashMap::new());
        let mut t = Utc::now();
        p.update(&report(100.0, t));
        t += chrono::Duration::days(1);
        p.update(&report(150.0, t)); // restock, impulse
        t += chrono::Duration::days(1);
        p.update(&report(140.0, t)); // drift sample #1
        t += chrono::Duration::days(1);
        p.update(&report(130.0, t)); // drift sample #2 -> crosses min_samples via updates but
                                      // training completion is driven by total update count
        assert!(p.training_status().samples_collected >= 2);
    }

    #[test]
    fn bounds_hold_once_trained() {
        let mut p = DriftImpulsePredictor::new();
        p.start_training(2, HashMap::new());
        let mut t = Utc::now();
        let mut level = 100.0;
        for _ in 0..4 {
            t += chrono::Duration::days(1);
            level -= 10.0;
            p.update(&report(level, t));
        }
        let est = p.predict(t + chrono::Duration::days(3));
        assert!(est.lower_bound <= est.point && est.point <= est.upper_bound);
    }
}
