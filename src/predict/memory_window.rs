//! §4.4.5 MemoryWindowPredictor — ring buffer of consumption events weighted
//! by recency.

use super::{
    accuracy_from_relative_errors, relative_error, ConsumptionReport, Estimate, Lifecycle,
    Predictor, TrainingStatus,
};
use crate::domain::PredictionModelConfig;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

const DEFAULT_CAPACITY: usize = 20;
const DECAY_GRID: [f64; 6] = [0.01, 0.02, 0.05, 0.1, 0.15, 0.2];

struct ConsumptionEvent {
    timestamp: DateTime<Utc>,
    rate_per_day: f64,
}

pub struct MemoryWindowPredictor {
    capacity: usize,
    decay: f64,
    events: VecDeque<ConsumptionEvent>,
    last_level: Option<f64>,
    last_timestamp: Option<DateTime<Utc>>,
    lifecycle: Lifecycle,
}

impl MemoryWindowPredictor {
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            decay: 0.05,
            events: VecDeque::with_capacity(DEFAULT_CAPACITY),
            last_level: None,
            last_timestamp: None,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Weighted mean and variance of the ring buffer's rates as of `now`,
    /// using weight `exp(-decay * days_since)`.
    fn weighted_stats(events: &[&ConsumptionEvent], decay: f64, now: DateTime<Utc>) -> (f64, f64) {
        if events.is_empty() {
            return (0.0, 0.0);
        }
        let weights: Vec<f64> = events
            .iter()
            .map(|e| {
                let days_since = (now - e.timestamp).num_seconds() as f64 / 86_400.0;
                (-decay * days_since.max(0.0)).exp()
            })
            .collect();
        let total_weight: f64 = weights.iter().sum();
        if total_weight <= 0.0 {
            return (0.0, 0.0);
        }
        let mean = events
            .iter()
            .zip(&weights)
            .map(|(e, w)| w * e.rate_per_day)
            .sum::<f64>()
            / total_weight;
        let variance = events
            .iter()
            .zip(&weights)
            .map(|(e, w)| w * (e.rate_per_day - mean).powi(2))
            .sum::<f64>()
            / total_weight;
        (mean, variance)
    }

    /// Leave-one-out accuracy: for each event, predict its rate from the
    /// weighted mean of every other event as of its own timestamp.
    fn hold_one_out_errors(events: &VecDeque<ConsumptionEvent>, decay: f64) -> Vec<f64> {
        let all: Vec<&ConsumptionEvent> = events.iter().collect();
        let mut errors = Vec::with_capacity(all.len());
        for i in 0..all.len() {
            let rest: Vec<&ConsumptionEvent> = all
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, e)| *e)
                .collect();
            if rest.is_empty() {
                continue;
            }
            let (mean, _) = Self::weighted_stats(&rest, decay, all[i].timestamp);
            errors.push(relative_error(all[i].rate_per_day, mean));
        }
        errors
    }

    fn refit(&mut self) {
        let mut best_decay = self.decay;
        let mut best_accuracy = f64::MIN;
        for &decay in &DECAY_GRID {
            let errors = Self::hold_one_out_errors(&self.events, decay);
            let accuracy = accuracy_from_relative_errors(&errors);
            if accuracy > best_accuracy {
                best_accuracy = accuracy;
                best_decay = decay;
            }
        }
        self.decay = best_decay;
    }

    fn current_estimate(&self, now: DateTime<Utc>) -> (f64, f64) {
        let all: Vec<&ConsumptionEvent> = self.events.iter().collect();
        Self::weighted_stats(&all, self.decay, now)
    }
}

impl Default for MemoryWindowPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for MemoryWindowPredictor {
    fn name(&self) -> &'static str {
        "memory_window"
    }

    fn predict(&self, target_time: DateTime<Utc>) -> Estimate {
        let last_level = self.last_level.unwrap_or(0.0);
        if !self.is_training_complete() {
            return Estimate::collecting("memory_window", last_level, target_time);
        }

        let last_ts = self.last_timestamp.unwrap_or(target_time);
        let (rate, variance) = self.current_estimate(last_ts);
        let days_ahead = ((target_time - last_ts).num_seconds() as f64 / 86_400.0).max(0.0);
        let point = (last_level - rate * days_ahead).max(0.0);
        let spread = variance.max(0.0).sqrt() * days_ahead.max(1.0).sqrt();

        Estimate {
            point,
            lower_bound: (point - spread).max(0.0),
            upper_bound: point + spread,
            confidence: super::confidence_from(self.training_status().accuracy, self.events.len()),
            next_check: target_time,
            model_tag: "memory_window",
            recommendation: format!("recency-weighted rate {rate:.3}/day"),
        }
    }

    fn update(&mut self, report: &ConsumptionReport) {
        if let (Some(last_level), Some(last_ts)) = (self.last_level, self.last_timestamp) {
            let delta = last_level - report.level;
            if delta > 0.0 {
                let days =
                    ((report.timestamp - last_ts).num_seconds() as f64 / 86_400.0).max(0.01);
                if self.events.len() >= self.capacity {
                    self.events.pop_front();
                }
                self.events.push_back(ConsumptionEvent {
                    timestamp: report.timestamp,
                    rate_per_day: delta / days,
                });
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
        if let Some(c) = parameters.get("capacity") {
            self.capacity = (*c as usize).max(1);
        }
        if let Some(d) = parameters.get("decay") {
            self.decay = *d;
        }
        self.lifecycle.start_training(min_samples, parameters);
    }

    fn training_status(&self) -> TrainingStatus {
        let errors = Self::hold_one_out_errors(&self.events, self.decay);
        let accuracy = accuracy_from_relative_errors(&errors);
        self.lifecycle.to_status(accuracy)
    }

    fn get_model(&self) -> PredictionModelConfig {
        PredictionModelConfig::MemoryWindow
    }

    fn set_parameters(&mut self, parameters: HashMap<String, f64>) {
        if let Some(d) = parameters.get("decay") {
            self.decay = *d;
        }
        if let Some(c) = parameters.get("capacity") {
            self.capacity = (*c as usize).max(1);
        }
        self.lifecycle.parameters = parameters;
        self.lifecycle.begin_retrain();
        self.refit();
        self.lifecycle.complete_fit();
    }

    fn get_parameters(&self) -> HashMap<String, f64> {
        let mut params = HashMap::new();
        params.insert("decay".to_string(), self.decay);
        params.insert("capacity".to_string(), self.capacity as f64);
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
    fn ring_buffer_caps_at_capacity() {
        let mut p = MemoryWindowPredictor::new();
        p.start_training(2, HashMap::from([("capacity".to_string(), 3.0)]));
        let mut t = Utc::now();
        let mut level = 100.0;
        for _ in 0..6 {
            t += chrono::Duration::days(1);
            level -= 2.0;
            p.update(&report(level, t));
        }
        assert_eq!(p.events.len(), 3);
    }

    #[test]
    fn predict_within_bounds() {
        let mut p = MemoryWindowPredictor::new();
        p.start_training(2, HashMap::new());
        let mut t = Utc::now();
        let mut level = 100.0;
        for _ in 0..5 {
            t += chrono::Duration::days(1);
            level -= 4.0;
            p.update(&report(level, t));
        }
        let est = p.predict(t + chrono::Duration::days(2));
        assert!(est.lower_bound <= est.point && est.point <= est.upper_bound);
    }
}
