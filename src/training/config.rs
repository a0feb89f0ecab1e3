//! Training configuration

use super::random_forest::MaxFeatures;
use super::xgboost::BoostingConfig;
use crate::error::{ModelingError, Result};
use serde::{Deserialize, Serialize};

/// Hyperparameters for the four model families
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Random seed shared by the tree, the forest and the booster
    pub random_state: u64,

    // Tree-specific parameters
    /// Maximum depth of the single tree (None = grow until pure)
    pub max_depth: Option<usize>,

    /// Minimum samples to split a node
    pub min_samples_split: usize,

    /// Minimum samples per leaf
    pub min_samples_leaf: usize,

    /// Number of trees in the bagged ensemble
    pub n_estimators: usize,

    /// Maximum depth of each ensemble tree
    pub forest_max_depth: Option<usize>,

    /// Features each ensemble tree considers per split
    pub forest_max_features: MaxFeatures,

    /// Draw a bootstrap sample per ensemble tree
    pub forest_bootstrap: bool,

    /// Booster parameters; its `random_state` is overridden by the shared seed
    pub boosting: BoostingConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            random_state: 42,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            n_estimators: 100,
            forest_max_depth: None,
            forest_max_features: MaxFeatures::All,
            forest_bootstrap: true,
            boosting: BoostingConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_forest_max_depth(mut self, depth: usize) -> Self {
        self.forest_max_depth = Some(depth);
        self
    }

    pub fn with_forest_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.forest_max_features = max_features;
        self
    }

    pub fn with_forest_bootstrap(mut self, bootstrap: bool) -> Self {
        self.forest_bootstrap = bootstrap;
        self
    }

    pub fn with_boosting(mut self, boosting: BoostingConfig) -> Self {
        self.boosting = boosting;
        self
    }

    /// Booster parameters with the shared seed applied
    pub(crate) fn boosting_config(&self) -> BoostingConfig {
        BoostingConfig {
            random_state: self.random_state,
            ..self.boosting.clone()
        }
    }

    /// Reject hyperparameters no family can fit with
    pub fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(ModelingError::Configuration(format!(
                "min_samples_split must be >= 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf < 1 {
            return Err(ModelingError::Configuration(
                "min_samples_leaf must be >= 1".to_string(),
            ));
        }
        if self.n_estimators == 0 || self.boosting.n_estimators == 0 {
            return Err(ModelingError::Configuration(
                "ensemble and booster need at least one estimator".to_string(),
            ));
        }

        match self.forest_max_features {
            MaxFeatures::Fraction(f) if !(f > 0.0 && f <= 1.0) => {
                return Err(ModelingError::Configuration(format!(
                    "forest_max_features fraction must lie in (0, 1], got {f}"
                )));
            }
            MaxFeatures::Fixed(0) => {
                return Err(ModelingError::Configuration(
                    "forest_max_features must be at least 1".to_string(),
                ));
            }
            _ => {}
        }

        let b = &self.boosting;
        if !(b.learning_rate > 0.0) {
            return Err(ModelingError::Configuration(format!(
                "learning_rate must be positive, got {}",
                b.learning_rate
            )));
        }
        if !(b.subsample > 0.0 && b.subsample <= 1.0) || !(b.colsample_bytree > 0.0 && b.colsample_bytree <= 1.0) {
            return Err(ModelingError::Configuration(
                "subsample and colsample_bytree must lie in (0, 1]".to_string(),
            ));
        }
        if b.reg_lambda < 0.0 || b.reg_alpha < 0.0 || b.min_child_weight < 0.0 || b.gamma < 0.0 {
            return Err(ModelingError::Configuration(
                "regularization terms must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_estimators, 100);
        assert_eq!(config.boosting.max_depth, 6);
    }

    #[test]
    fn test_shared_seed_reaches_booster() {
        let config = TrainingConfig::new().with_random_state(7);
        assert_eq!(config.boosting_config().random_state, 7);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TrainingConfig::new().with_n_estimators(0).validate().is_err());
        assert!(TrainingConfig::new().with_min_samples_leaf(0).validate().is_err());
        assert!(TrainingConfig::new()
            .with_forest_max_features(MaxFeatures::Fraction(1.5))
            .validate()
            .is_err());
        assert!(TrainingConfig::new()
            .with_forest_max_features(MaxFeatures::Fixed(0))
            .validate()
            .is_err());

        let boosting = BoostingConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            TrainingConfig::new().with_boosting(boosting).validate(),
            Err(ModelingError::Configuration(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrainingConfig = serde_json::from_str(r#"{"n_estimators": 10}"#).unwrap();
        assert_eq!(config.n_estimators, 10);
        assert_eq!(config.random_state, 42);
        assert_eq!(config.forest_max_features, MaxFeatures::All);
        assert!(config.forest_bootstrap);

        let config: TrainingConfig =
            serde_json::from_str(r#"{"forest_max_features": "sqrt", "forest_bootstrap": false}"#).unwrap();
        assert_eq!(config.forest_max_features, MaxFeatures::Sqrt);
        assert!(!config.forest_bootstrap);
        let config: TrainingConfig = serde_json::from_str(r#"{"forest_max_features": {"fraction": 0.5}}"#).unwrap();
        assert_eq!(config.forest_max_features, MaxFeatures::Fraction(0.5));
    }
}
