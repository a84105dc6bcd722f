//! §4.4.2 CrostonPredictor — intermittent demand via exponentially weighted
//! averages of demand size and inter-arrival interval.

use super::{
    accuracy_from_relative_errors, relative_error, ConsumptionReport, Estimate, Lifecycle,
    Predictor, TrainingStatus,
};
use crate::domain::PredictionModelConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const ALPHA_GRID: [f64; 6] = [0.05, 0.1, 0.15, 0.2, 0.25, 0.3];

struct DemandEvent {
    delta: f64,
    interval_days: f64,
}

pub struct CrostonPredictor {
    alpha: f64,
    mean_demand: Option<f64>,
    mean_interval: Option<f64>,
    last_level: Option<f64>,
    last_timestamp: Option<DateTime<Utc>>,
    last_demand_timestamp: Option<DateTime<Utc>>,
    demand_events: Vec<DemandEvent>,
    lifecycle: Lifecycle,
}

impl CrostonPredictor {
    pub fn new() -> Self {
        Self {
            alpha: 0.1,
            mean_demand: None,
            mean_interval: None,
            last_level: None,
            last_timestamp: None,
            last_demand_timestamp: None,
            demand_events: Vec::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    fn rate_per_day(&self) -> f64 {
        match (self.mean_demand, self.mean_interval) {
            (Some(d), Some(i)) if i > 0.0 => d / i,
            _ => 0.0,
        }
    }

    /// Replays `demand_events` from scratch with `alpha`, returning the
    /// final (mean_demand, mean_interval) and the one-step-ahead relative
    /// errors used to score this candidate.
    fn simulate(events: &[DemandEvent], alpha: f64) -> (f64, f64, Vec<f64>) {
        let mut mean_demand = 0.0;
        let mut mean_interval = 0.0;
        let mut initialized = false;
        let mut errors = Vec::new();

        for e in events {
            if initialized {
                let predicted_rate = if mean_interval > 0.0 {
                    mean_demand / mean_interval
                } else {
                    0.0
                };
                let actual_rate = if e.interval_days > 0.0 {
                    e.delta / e.interval_days
                } else {
                    e.delta
                };
                errors.push(relative_error(actual_rate, predicted_rate));

                mean_demand = alpha * e.delta + (1.0 - alpha) * mean_demand;
                mean_interval = alpha * e.interval_days + (1.0 - alpha) * mean_interval;
            } else {
                mean_demand = e.delta;
                mean_interval = e.interval_days;
                initialized = true;
            }
        }

        (mean_demand, mean_interval, errors)
    }

    fn refit(&mut self) {
        let mut best_alpha = self.alpha;
        let mut best_accuracy = f64::MIN;
        let mut best_state = (self.mean_demand.unwrap_or(0.0), self.mean_interval.unwrap_or(0.0));

        for &alpha in &ALPHA_GRID {
            let (demand, interval, errors) = Self::simulate(&self.demand_events, alpha);
            let accuracy = accuracy_from_relative_errors(&errors);
            if accuracy > best_accuracy {
                best_accuracy = accuracy;
                best_alpha = alpha;
                best_state = (demand, interval);
            }
        }

        self.alpha = best_alpha;
        self.mean_demand = Some(best_state.0);
        self.mean_interval = Some(best_state.1);
    }
}

impl Default for CrostonPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for CrostonPredictor {
    fn name(&self) -> &'static str {
        "croston"
    }

    fn predict(&self, target_time: DateTime<Utc>) -> Estimate {
        let last_level = self.last_level.unwrap_or(0.0);
        if !self.is_training_complete() {
            return Estimate::collecting("croston", last_level, target_time);
        }

        let days_ahead = self
            .last_timestamp
            .map(|t| (target_time - t).num_seconds() as f64 / 86_400.0)
            .unwrap_or(0.0)
            .max(0.0);

        let rate = self.rate_per_day();
        let point = (last_level - rate * days_ahead).max(0.0);
        let accuracy = self.training_status().accuracy;
        let spread = (1.0 - accuracy) * rate.abs().max(0.1) * days_ahead.max(1.0);

        Estimate {
            point,
            lower_bound: (point - spread).max(0.0),
            upper_bound: point + spread,
            confidence: super::confidence_from(accuracy, self.demand_events.len()),
            next_check: target_time,
            model_tag: "croston",
            recommendation: format!("intermittent demand rate {rate:.3}/day"),
        }
    }

    fn update(&mut self, report: &ConsumptionReport) {
        if let Some(last_level) = self.last_level {
            if report.level < last_level {
                let delta = last_level - report.level;
                let interval_days = self
                    .last_demand_timestamp
                    .or(self.last_timestamp)
                    .map(|t| ((report.timestamp - t).num_seconds() as f64 / 86_400.0).max(0.01))
                    .unwrap_or(1.0);

                self.mean_demand = Some(match self.mean_demand {
                    Some(m) => self.alpha * delta + (1.0 - self.alpha) * m,
                    None => delta,
                });
                self.mean_interval = Some(match self.mean_interval {
                    Some(m) => self.alpha * interval_days + (1.0 - self.alpha) * m,
                    None => interval_days,
                });

                self.demand_events.push(DemandEvent {
                    delta,
                    interval_days,
                });
                self.last_demand_timestamp = Some(report.timestamp);
            }
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
        if let Some(a) = parameters.get("alpha") {
            self.alpha = *a;
        }
        self.lifecycle.start_training(min_samples, parameters);
    }

    fn training_status(&self) -> TrainingStatus {
        let (_, _, errors) = Self::simulate(&self.demand_events, self.alpha);
        let accuracy = accuracy_from_relative_errors(&errors);
        self.lifecycle.to_status(accuracy)
    }

    fn get_model(&self) -> PredictionModelConfig {
        PredictionModelConfig::Croston
    }

    fn set_parameters(&mut self, parameters: HashMap<String, f64>) {
        if let Some(a) = parameters.get("alpha") {
            self.alpha = *a;
        }
        self.lifecycle.parameters = parameters;
        self.lifecycle.begin_retrain();
        self.refit();
        self.lifecycle.complete_fit();
    }

    fn get_parameters(&self) -> HashMap<String, f64> {
        let mut params = HashMap::new();
        params.insert("alpha".to_string(), self.alpha);
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
    fn trains_and_predicts_within_bounds() {
        let mut p = CrostonPredictor::new();
        p.start_training(3, HashMap::new());
        let mut t = Utc::now();
        let mut level = 100.0;
        for _ in 0..5 {
            t += chrono::Duration::days(2);
            level -= 5.0;
            p.update(&report(level, t));
        }
        assert!(p.is_training_complete());
        let est = p.predict(t + chrono::Duration::days(5));
        assert!(est.lower_bound <= est.point && est.point <= est.upper_bound);
        assert!((0.0..=1.0).contains(&est.confidence));
    }
}
