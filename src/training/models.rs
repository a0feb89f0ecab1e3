//! Model capability trait shared by every model family

use crate::error::{ModelingError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four model families trained for every target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Ordinary least squares
    Linear,
    /// Single regression tree
    Tree,
    /// Bagged ensemble of regression trees
    Ensemble,
    /// Second-order gradient boosted trees
    Boosted,
}

impl ModelFamily {
    /// Bundle order
    pub const ALL: [ModelFamily; 4] = [
        ModelFamily::Linear,
        ModelFamily::Tree,
        ModelFamily::Ensemble,
        ModelFamily::Boosted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Linear => "linear",
            ModelFamily::Tree => "tree",
            ModelFamily::Ensemble => "ensemble",
            ModelFamily::Boosted => "boosted",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for ML models
pub trait Model: Send + Sync + fmt::Debug {
    /// Family this model belongs to
    fn family(&self) -> ModelFamily;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Positive-class probabilities, for models with a native probability output
    fn predict_proba(&self, _x: &Array2<f64>) -> Option<Result<Array1<f64>>> {
        None
    }

    /// Get feature importances (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Shared fit-time validation: matching lengths, at least one row, finite values.
pub(crate) fn validate_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(ModelingError::Shape {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(ModelingError::InsufficientData(
            "cannot fit on an empty training set".to_string(),
        ));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(ModelingError::Data(
            "training data contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

/// Prediction-time check that the feature count matches the fitted model.
pub(crate) fn check_n_features(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(ModelingError::Shape {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
