//! Per-layer training settings
//!
//! Every field is optional so a setting can be inherited from the
//! fine-tune override or from the nearest preceding layer.

use serde::{Deserialize, Serialize};

/// Gradient updater used when the layer is trained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Updater {
    Sgd,
    Adam,
    Nesterovs,
    RmsProp,
}

/// Training hyperparameters attached to a layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub updater: Option<Updater>,
    pub learning_rate: Option<f64>,
    pub l1: Option<f64>,
    pub l2: Option<f64>,
    pub dropout: Option<f64>,
}

impl TrainingConfig {
    /// Create an empty config (everything inherited)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_updater(mut self, updater: Updater) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = Some(learning_rate);
        self
    }

    pub fn with_l1(mut self, l1: f64) -> Self {
        self.l1 = Some(l1);
        self
    }

    pub fn with_l2(mut self, l2: f64) -> Self {
        self.l2 = Some(l2);
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = Some(dropout);
        self
    }

    /// Apply `over` on top of this config: fields set in `over` win
    pub fn overlay(&self, over: &TrainingConfig) -> TrainingConfig {
        TrainingConfig {
            updater: over.updater.or(self.updater),
            learning_rate: over.learning_rate.or(self.learning_rate),
            l1: over.l1.or(self.l1),
            l2: over.l2.or(self.l2),
            dropout: over.dropout.or(self.dropout),
        }
    }

    /// Fill unset fields from `fallback`: fields set here win
    pub fn or_else(&self, fallback: &TrainingConfig) -> TrainingConfig {
        fallback.overlay(self)
    }

    /// Check whether no field is set
    pub fn is_empty(&self) -> bool {
        *self == TrainingConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_prefers_override() {
        let base = TrainingConfig::new()
            .with_updater(Updater::Sgd)
            .with_learning_rate(0.1)
            .with_l2(1e-4);
        let over = TrainingConfig::new().with_learning_rate(0.01);

        let merged = base.overlay(&over);
        assert_eq!(merged.updater, Some(Updater::Sgd));
        assert_eq!(merged.learning_rate, Some(0.01));
        assert_eq!(merged.l2, Some(1e-4));
    }

    #[test]
    fn test_or_else_prefers_self() {
        let own = TrainingConfig::new().with_dropout(0.5);
        let fallback = TrainingConfig::new()
            .with_dropout(0.2)
            .with_updater(Updater::Adam);

        let merged = own.or_else(&fallback);
        assert_eq!(merged.dropout, Some(0.5));
        assert_eq!(merged.updater, Some(Updater::Adam));
    }

    #[test]
    fn test_is_empty() {
        assert!(TrainingConfig::new().is_empty());
        assert!(!TrainingConfig::new().with_l1(0.1).is_empty());
    }
}
