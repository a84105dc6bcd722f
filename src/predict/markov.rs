//! §4.4.1 MarkovPredictor — discrete-state transitions over {Depleted, Low,
//! Stocked}.

use super::{ConsumptionReport, Estimate, Lifecycle, Predictor, Stage, TrainingStatus};
use crate::domain::PredictionModelConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkovState {
    Depleted,
    Low,
    Stocked,
}

impl MarkovState {
    fn from_level(level: f64, depleted_threshold: f64, low_threshold: f64) -> Self {
        if level <= depleted_threshold {
            MarkovState::Depleted
        } else if level <= low_threshold {
            MarkovState::Low
        } else {
            MarkovState::Stocked
        }
    }

    fn canonical_level(self) -> f64 {
        match self {
            MarkovState::Depleted => 0.0,
            MarkovState::Low => 3.0,
            MarkovState::Stocked => 10.0,
        }
    }

    fn all() -> [MarkovState; 3] {
        [MarkovState::Depleted, MarkovState::Low, MarkovState::Stocked]
    }
}

struct StateTransition {
    from: MarkovState,
    to: MarkovState,
}

pub struct MarkovPredictor {
    depleted_threshold: f64,
    low_threshold: f64,
    current_state: Option<MarkovState>,
    transitions: Vec<StateTransition>,
    matrix: HashMap<MarkovState, HashMap<MarkovState, f64>>,
    lifecycle: Lifecycle,
}

impl MarkovPredictor {
    pub fn new() -> Self {
        Self {
            depleted_threshold: 0.5,
            low_threshold: 3.0,
            current_state: None,
            transitions: Vec::new(),
            matrix: HashMap::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Recomputes the full transition matrix from recorded history (§4.4.1
    /// "Training completion recomputes the full transition matrix").
    fn refit(&mut self) {
        let mut counts: HashMap<MarkovState, HashMap<MarkovState, u64>> = HashMap::new();
        for t in &self.transitions {
            *counts.entry(t.from).or_default().entry(t.to).or_insert(0) += 1;
        }

        let mut matrix = HashMap::new();
        for from in MarkovState::all() {
            let row = counts.get(&from);
            let total: u64 = row.map(|r| r.values().sum()).unwrap_or(0);
            let mut probs = HashMap::new();
            if total > 0 {
                for to in MarkovState::all() {
                    let c = row.and_then(|r| r.get(&to)).copied().unwrap_or(0);
                    probs.insert(to, c as f64 / total as f64);
                }
            }
            matrix.insert(from, probs);
        }
        self.matrix = matrix;
    }

    fn most_likely_next(&self, from: MarkovState) -> (MarkovState, f64) {
        match self.matrix.get(&from) {
            Some(row) if !row.is_empty() => row
                .iter()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(state, prob)| (*state, *prob))
                .unwrap_or((from, 0.5)),
            _ => (from, 0.5),
        }
    }
}

impl Default for MarkovPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for MarkovPredictor {
    fn name(&self) -> &'static str {
        "markov"
    }

    fn predict(&self, target_time: DateTime<Utc>) -> Estimate {
        if !self.is_training_complete() {
            let last = self
                .current_state
                .map(MarkovState::canonical_level)
                .unwrap_or(0.0);
            return Estimate::collecting("markov", last, target_time);
        }

        let from = self.current_state.unwrap_or(MarkovState::Stocked);
        let (next, confidence) = self.most_likely_next(from);
        let point = next.canonical_level();
        let spread = (1.0 - confidence) * 5.0;

        Estimate {
            point,
            lower_bound: (point - spread).max(0.0),
            upper_bound: point + spread,
            confidence,
            next_check: target_time,
            model_tag: "markov",
            recommendation: format!("most likely state: {next:?}"),
        }
    }

    fn update(&mut self, report: &ConsumptionReport) {
        let new_state =
            MarkovState::from_level(report.level, self.depleted_threshold, self.low_threshold);

        if let Some(prev) = self.current_state {
            if prev != new_state {
                self.transitions.push(StateTransition {
                    from: prev,
                    to: new_state,
                });
            }
        }
        self.current_state = Some(new_state);

        let crossed = self.lifecycle.observe(report.timestamp);
        if crossed {
            self.refit();
            self.lifecycle.complete_fit();
        }
    }

    fn start_training(&mut self, min_samples: usize, parameters: HashMap<String, f64>) {
        if let Some(d) = parameters.get("depleted_threshold") {
            self.depleted_threshold = *d;
        }
        if let Some(l) = parameters.get("low_threshold") {
            self.low_threshold = *l;
        }
        self.lifecycle.start_training(min_samples, parameters);
    }

    fn training_status(&self) -> TrainingStatus {
        let accuracy = if self.transitions.is_empty() {
            0.0
        } else {
            let hits = self
                .transitions
                .windows(2)
                .filter(|w| {
                    let (predicted, _) = self.most_likely_next(w[0].from);
                    predicted == w[1].from
                })
                .count();
            let total = self.transitions.len().saturating_sub(1).max(1);
            hits as f64 / total as f64
        };
        self.lifecycle.to_status(accuracy)
    }

    fn get_model(&self) -> PredictionModelConfig {
        PredictionModelConfig::Markov
    }

    fn set_parameters(&mut self, parameters: HashMap<String, f64>) {
        if let Some(d) = parameters.get("depleted_threshold") {
            self.depleted_threshold = *d;
        }
        if let Some(l) = parameters.get("low_threshold") {
            self.low_threshold = *l;
        }
        self.lifecycle.parameters = parameters;
        self.lifecycle.begin_retrain();
        self.refit();
        self.lifecycle.complete_fit();
    }

    fn get_parameters(&self) -> HashMap<String, f64> {
        let mut params = HashMap::new();
        params.insert("depleted_threshold".to_string(), self.depleted_threshold);
        params.insert("low_threshold".to_string(), self.low_threshold);
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
    fn stage_progresses_without_skipping() {
        let mut p = MarkovPredictor::new();
        p.start_training(3, HashMap::new());
        assert_eq!(p.training_status().stage, Stage::Collecting);

        let now = Utc::now();
        p.update(&report(10.0, now));
        assert_eq!(p.training_status().stage, Stage::Collecting);
        p.update(&report(2.0, now));
        p.update(&report(0.1, now));
        assert_eq!(p.training_status().stage, Stage::Trained);
    }

    #[test]
    fn predict_bounds_hold() {
        let mut p = MarkovPredictor::new();
        p.start_training(2, HashMap::new());
        let now = Utc::now();
        p.update(&report(10.0, now));
        p.update(&report(0.1, now));
        let est = p.predict(now);
        assert!(est.lower_bound <= est.point);
        assert!(est.point <= est.upper_bound);
        assert!((0.0..=1.0).contains(&est.confidence));
    }
}
