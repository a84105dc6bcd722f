use serde::{Deserialize, Serialize};

/// The variant of a `Parametric` predictor (§3, §4.4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ParametricKind {
    Linear { slope: f64, base: f64, noise: f64 },
    Logistic { r: f64, k: f64, p0: f64 },
}

/// An item's active prediction model selection. Structural equality
/// (`PartialEq`) is what `SetActivePredictionModel` uses to compute
/// `model_changed` (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PredictionModelConfig {
    Parametric(ParametricKind),
    Markov,
    Croston,
    DriftImpulse,
    Bayesian,
    MemoryWindow,
}

impl PredictionModelConfig {
    pub fn tag(&self) -> &'static str {
        match self {
            PredictionModelConfig::Parametric(ParametricKind::Linear { .. }) => {
                "parametric_linear"
            }
            PredictionModelConfig::Parametric(ParametricKind::Logistic { .. }) => {
                "parametric_logistic"
            }
            PredictionModelConfig::Markov => "markov",
            PredictionModelConfig::Croston => "croston",
            PredictionModelConfig::DriftImpulse => "drift_impulse",
            PredictionModelConfig::Bayesian => "bayesian",
            PredictionModelConfig::MemoryWindow => "memory_window",
        }
    }

    /// The coarser predictor family this config belongs to, ignoring
    /// `Parametric`'s Linear/Logistic split — this is what the fitness
    /// tracker and model registry key on (§4.5 "six predictor families").
    pub fn family(&self) -> &'static str {
        match self {
            PredictionModelConfig::Parametric(_) => "parametric",
            PredictionModelConfig::Markov => "markov",
            PredictionModelConfig::Croston => "croston",
            PredictionModelConfig::DriftImpulse => "drift_impulse",
            PredictionModelConfig::Bayesian => "bayesian",
            PredictionModelConfig::MemoryWindow => "memory_window",
        }
    }
}

/// The six predictor families enabled by default (§4.5).
pub const ALL_MODEL_FAMILIES: [&str; 6] = [
    "parametric",
    "markov",
    "croston",
    "drift_impulse",
    "bayesian",
    "memory_window",
];
