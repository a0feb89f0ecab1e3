//! Feature scaling implementations

use super::{float_values, normalize_name};
use crate::error::{ModelingError, Result};
use crate::schema::AttributeSchema;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

/// Type of scaling applied to numeric columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingStrategy {
    /// Standard scaling (z-score normalization): (x - mean) / std
    Standardize,
    /// Min-Max scaling: (x - min) / (max - min)
    MinMax,
    /// Log with offset: ln(x + 1)
    Log1p,
    /// No scaling
    #[default]
    Identity,
}

impl ScalingStrategy {
    /// Parse a strategy name, falling back to [`ScalingStrategy::Identity`]
    /// with a warning when the name is not recognized.
    pub fn parse_or_identity(name: &str) -> Self {
        match name.parse() {
            Ok(strategy) => strategy,
            Err(_) => {
                warn!(strategy = name, "unrecognized scaling strategy, data passes through unchanged");
                ScalingStrategy::Identity
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingStrategy::Standardize => "standardize",
            ScalingStrategy::MinMax => "min_max",
            ScalingStrategy::Log1p => "log1p",
            ScalingStrategy::Identity => "identity",
        }
    }
}

impl fmt::Display for ScalingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalingStrategy {
    type Err = ModelingError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_name(s).as_str() {
            "standardize" | "standard" | "standardscaler" => Ok(ScalingStrategy::Standardize),
            "min_max" | "minmax" | "minmaxscaler" => Ok(ScalingStrategy::MinMax),
            "log1p" | "log" | "nplog" => Ok(ScalingStrategy::Log1p),
            "identity" | "none" => Ok(ScalingStrategy::Identity),
            _ => Err(ModelingError::Configuration(format!(
                "unknown scaling strategy '{s}', expected one of standardize, min_max, log1p, identity"
            ))),
        }
    }
}

/// Parameters for a fitted column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    center: f64, // mean or min
    scale: f64,  // std or range
}

/// Feature scaler.
///
/// Parameters are learned by [`Scaler::fit`] and frozen; [`Scaler::transform`]
/// applies them to any frame, so a scaler fitted on a training partition can be
/// reused on its holdout partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    strategy: ScalingStrategy,
    params: Vec<(String, ScalerParams)>,
    is_fitted: bool,
}

impl Scaler {
    /// Create a new scaler
    pub fn new(strategy: ScalingStrategy) -> Self {
        Self {
            strategy,
            params: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn strategy(&self) -> ScalingStrategy {
        self.strategy
    }

    /// Names of the columns this scaler rewrites
    pub fn columns(&self) -> Vec<&str> {
        self.params.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Fit the scaler to the numeric columns of `df`
    pub fn fit(&mut self, df: &DataFrame, schema: &AttributeSchema) -> Result<&mut Self> {
        self.params.clear();

        if self.strategy != ScalingStrategy::Identity {
            for col_name in schema.present_numeric(df) {
                let values = float_values(df, col_name)?;
                let params = self.compute_params(&values);
                debug!(column = col_name, center = params.center, scale = params.scale, "fitted scaler");
                self.params.push((col_name.to_string(), params));
            }
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Transform the data.
    /// Builds all replacement columns first, then applies them in a single pass.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(ModelingError::ModelNotFitted);
        }

        let replacements: Vec<Series> = self
            .params
            .par_iter()
            .filter(|(col_name, _)| df.column(col_name).is_ok())
            .map(|(col_name, params)| self.scale_column(df, col_name, params))
            .collect::<Result<Vec<_>>>()?;

        let mut result = df.clone();
        for scaled in replacements {
            result.with_column(scaled)?;
        }

        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, schema: &AttributeSchema) -> Result<DataFrame> {
        self.fit(df, schema)?;
        self.transform(df)
    }

    fn compute_params(&self, ca: &Float64Chunked) -> ScalerParams {
        match self.strategy {
            ScalingStrategy::Standardize => {
                let mean = ca.mean().unwrap_or(0.0);
                let std = ca.std(0).unwrap_or(1.0);
                ScalerParams {
                    center: mean,
                    scale: if std == 0.0 || !std.is_finite() { 1.0 } else { std },
                }
            }
            ScalingStrategy::MinMax => {
                let min = ca.min().unwrap_or(0.0);
                let max = ca.max().unwrap_or(1.0);
                let range = max - min;
                ScalerParams {
                    center: min,
                    scale: if range == 0.0 { 1.0 } else { range },
                }
            }
            ScalingStrategy::Log1p | ScalingStrategy::Identity => ScalerParams {
                center: 0.0,
                scale: 1.0,
            },
        }
    }

    fn scale_column(&self, df: &DataFrame, col_name: &str, params: &ScalerParams) -> Result<Series> {
        let ca = float_values(df, col_name)?;

        let scaled: Float64Chunked = match self.strategy {
            ScalingStrategy::Log1p => {
                if let Some(value) = ca.into_iter().flatten().find(|v| *v <= -1.0) {
                    return Err(ModelingError::Domain {
                        column: col_name.to_string(),
                        value,
                    });
                }
                ca.into_iter().map(|opt| opt.map(f64::ln_1p)).collect()
            }
            _ => ca
                .into_iter()
                .map(|opt| opt.map(|v| (v - params.center) / params.scale))
                .collect(),
        };

        Ok(scaled.with_name(col_name.into()).into_series())
    }
}

/// Scale the numeric attributes of `df`, fitting parameters on `df` itself.
///
/// Use [`Scaler`] directly to fit on one frame and apply to another.
#[instrument(skip(df, schema), fields(rows = df.height()))]
pub fn scale(strategy: ScalingStrategy, df: &DataFrame, schema: &AttributeSchema) -> Result<DataFrame> {
    Scaler::new(strategy).fit_transform(df, schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> AttributeSchema {
        AttributeSchema::new().with_numeric(&["a", "b", "absent"])
    }

    fn sample_df() -> DataFrame {
        df!(
            "a" => &[1.0, 2.0, 3.0, 4.0, 5.0],
            "b" => &[10i64, 20, 30, 40, 90],
            "label" => &["x", "y", "x", "y", "x"],
        )
        .unwrap()
    }

    fn column(df: &DataFrame, name: &str) -> Vec<f64> {
        df.column(name).unwrap().f64().unwrap().into_no_null_iter().collect()
    }

    #[test]
    fn test_standardize() {
        let result = scale(ScalingStrategy::Standardize, &sample_df(), &schema()).unwrap();

        for name in ["a", "b"] {
            let values = column(&result, name);
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            assert!(mean.abs() < 1e-10);
            assert!((var.sqrt() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_minmax() {
        let result = scale(ScalingStrategy::MinMax, &sample_df(), &schema()).unwrap();

        let values = column(&result, "b");
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((values[0] - 0.0).abs() < 1e-12);
        assert!((values[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_minmax() {
        let df = df!("a" => &[3.0, 3.0, 3.0]).unwrap();
        let result = scale(ScalingStrategy::MinMax, &df, &schema()).unwrap();
        assert_eq!(column(&result, "a"), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_log1p() {
        let df = df!("a" => &[0.0, 1.0, 9.0]).unwrap();
        let result = scale(ScalingStrategy::Log1p, &df, &schema()).unwrap();
        let values = column(&result, "a");
        assert!((values[2] - 10f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log1p_domain_error() {
        let df = df!("a" => &[1.0, -2.0, 3.0]).unwrap();
        let err = scale(ScalingStrategy::Log1p, &df, &schema()).unwrap_err();
        match err {
            ModelingError::Domain { column, value } => {
                assert_eq!(column, "a");
                assert_eq!(value, -2.0);
            }
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_columns_untouched() {
        let df = sample_df();
        let result = scale(ScalingStrategy::Standardize, &df, &schema()).unwrap();
        assert_eq!(result.column("label").unwrap().dtype(), &DataType::String);
        assert_eq!(result.get_column_names(), df.get_column_names());
    }

    #[test]
    fn test_fit_on_one_frame_apply_to_another() {
        let train = df!("a" => &[0.0, 10.0]).unwrap();
        let test = df!("a" => &[5.0, 20.0]).unwrap();

        let mut scaler = Scaler::new(ScalingStrategy::MinMax);
        scaler.fit(&train, &schema()).unwrap();
        let scaled = scaler.transform(&test).unwrap();
        assert_eq!(column(&scaled, "a"), vec![0.5, 2.0]);
        assert_eq!(scaler.columns(), vec!["a"]);
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("npLog".parse::<ScalingStrategy>().unwrap(), ScalingStrategy::Log1p);
        assert_eq!("min-max".parse::<ScalingStrategy>().unwrap(), ScalingStrategy::MinMax);
        assert!("robust".parse::<ScalingStrategy>().is_err());

        let df = sample_df();
        let result = scale(ScalingStrategy::parse_or_identity("robust"), &df, &schema()).unwrap();
        assert!(result.equals(&df));
    }
}
