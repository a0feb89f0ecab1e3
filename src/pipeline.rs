//! End-to-end modeling run for one target
//!
//! encode → label/feature extraction → split → scale (fitted on train) →
//! train → evaluate

use crate::error::{ModelingError, Result};
use crate::evaluation::{evaluate_bundle, EvaluationReport, MetricKind};
use crate::preprocessing::{encode, float_values, EncodingStrategy, Scaler, ScalingStrategy};
use crate::schema::AttributeSchema;
use crate::split::{split, DEFAULT_TEST_FRACTION};
use crate::target::{TargetType, LABEL_COLUMNS};
use crate::training::{train, ModelBundle, ModelFamily, TrainingConfig};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Settings of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target: TargetType,
    pub encoding: EncodingStrategy,
    pub scaling: ScalingStrategy,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
    /// Seed of the train/test split
    pub seed: u64,
    /// Severity runs keep only rows with a positive claim amount
    pub claims_only: bool,
    /// Extra columns never used as features
    pub exclude_columns: Vec<String>,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: TargetType::Risk,
            encoding: EncodingStrategy::OneHot,
            scaling: ScalingStrategy::Standardize,
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: 42,
            claims_only: true,
            exclude_columns: Vec::new(),
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(target: TargetType) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingStrategy) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingStrategy) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    /// Seed for both the split and the model families
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.training.random_state = seed;
        self
    }

    pub fn with_claims_only(mut self, claims_only: bool) -> Self {
        self.claims_only = claims_only;
        self
    }

    pub fn with_exclude_columns<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.exclude_columns = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }
}

/// Holdout report of one model family
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub family: ModelFamily,
    pub report: EvaluationReport,
}

impl ModelReport {
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.report.get(key)
    }
}

/// Everything a run produces
#[derive(Debug, Serialize)]
pub struct PipelineOutcome {
    pub target: TargetType,
    /// Feature columns in matrix order
    pub feature_names: Vec<String>,
    pub n_train: usize,
    pub n_test: usize,
    /// One entry per family, in bundle order
    pub reports: Vec<ModelReport>,
    #[serde(skip)]
    pub bundle: ModelBundle,
}

impl PipelineOutcome {
    /// Highest ROC AUC for risk, lowest RMSE for continuous targets
    pub fn best(&self) -> Option<&ModelReport> {
        match MetricKind::for_target(self.target) {
            MetricKind::Classification => self.reports.iter().max_by(|a, b| {
                let a = a.metric("roc_auc").unwrap_or(f64::NEG_INFINITY);
                let b = b.metric("roc_auc").unwrap_or(f64::NEG_INFINITY);
                a.total_cmp(&b)
            }),
            MetricKind::Regression => self.reports.iter().min_by(|a, b| {
                let a = a.metric("rmse").unwrap_or(f64::INFINITY);
                let b = b.metric("rmse").unwrap_or(f64::INFINITY);
                a.total_cmp(&b)
            }),
        }
    }

    pub fn report(&self, family: ModelFamily) -> Option<&ModelReport> {
        self.reports.iter().find(|r| r.family == family)
    }
}

/// Pipeline runner
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on a cleaned dataset. The input frame is not modified.
    #[instrument(skip_all, fields(target = %self.config.target, rows = df.height()))]
    pub fn run(&self, df: &DataFrame, schema: &AttributeSchema) -> Result<PipelineOutcome> {
        let config = &self.config;
        let target = config.target;
        info!(encoding = %config.encoding, scaling = %config.scaling, "starting pipeline");

        let mut encoded = encode(config.encoding, df, schema)?;

        if target == TargetType::Severity && config.claims_only {
            encoded = positive_label_rows(&encoded, target.label_column())?;
            info!(rows = encoded.height(), "kept rows with a claim");
        }

        let labels = extract_labels(&encoded, target)?;
        let (features, feature_names) = self.feature_frame(&encoded, schema)?;
        info!(n_features = feature_names.len(), "extracted features");

        let parts = split(&features, &labels, target, config.test_fraction, config.seed)?;

        let mut scaler = Scaler::new(config.scaling);
        scaler.fit(&parts.x_train, schema)?;
        let x_train = to_matrix(&scaler.transform(&parts.x_train)?)?;
        let x_test = to_matrix(&scaler.transform(&parts.x_test)?)?;

        let bundle = train(&x_train, &parts.y_train, target, &config.training)?;
        let reports: Vec<ModelReport> = evaluate_bundle(&bundle, &x_test, &parts.y_test)?
            .into_iter()
            .map(|(family, report)| ModelReport { family, report })
            .collect();

        for r in &reports {
            info!(family = %r.family, metrics = ?r.report.metrics, "holdout metrics");
        }

        Ok(PipelineOutcome {
            target,
            feature_names,
            n_train: parts.n_train(),
            n_test: parts.n_test(),
            reports,
            bundle,
        })
    }

    /// Feature columns as `f64` with nulls filled by 0.
    ///
    /// Label columns, the schema's label sources and date columns, and the
    /// configured exclusions never become features. Schema boolean columns are
    /// read as 0/1; any other column must be numeric after encoding.
    fn feature_frame(&self, df: &DataFrame, schema: &AttributeSchema) -> Result<(DataFrame, Vec<String>)> {
        let mut columns = Vec::new();
        let mut names = Vec::new();

        for column in df.get_columns() {
            let name = column.name().as_str();
            if LABEL_COLUMNS.contains(&name)
                || schema.is_label_source(name)
                || self.config.exclude_columns.iter().any(|c| c == name)
            {
                continue;
            }
            if schema.is_date(name) {
                debug!(column = name, "dropping date column from features");
                continue;
            }

            let values = if schema.is_boolean(name) {
                boolean_values(df, name)?
            } else {
                let dtype = column.dtype();
                if !(dtype.is_float() || dtype.is_integer() || dtype == &DataType::Boolean) {
                    warn!(column = name, %dtype, "dropping non-numeric column from features");
                    continue;
                }
                float_values(df, name)?
            };

            let filled: Float64Chunked = values.into_iter().map(|v| Some(v.unwrap_or(0.0))).collect();
            columns.push(filled.with_name(name.into()).into_series().into_column());
            names.push(name.to_string());
        }

        if columns.is_empty() {
            return Err(ModelingError::InsufficientData(
                "no numeric feature columns remain after encoding".to_string(),
            ));
        }

        Ok((DataFrame::new(columns)?, names))
    }
}

/// Read a boolean attribute as 0/1. Text flags accept true/false, yes/no and 1/0.
fn boolean_values(df: &DataFrame, name: &str) -> Result<Float64Chunked> {
    let column = df
        .column(name)
        .map_err(|_| ModelingError::FeatureNotFound(name.to_string()))?;
    if column.dtype() != &DataType::String {
        return float_values(df, name);
    }

    column
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|v| match v.map(|s| s.trim().to_ascii_lowercase()) {
            None => Ok(None),
            Some(s) => match s.as_str() {
                "true" | "yes" | "1" => Ok(Some(1.0)),
                "false" | "no" | "0" => Ok(Some(0.0)),
                _ => Err(ModelingError::Data(format!(
                    "boolean column '{name}' contains '{s}'"
                ))),
            },
        })
        .collect()
}

fn positive_label_rows(df: &DataFrame, label: &str) -> Result<DataFrame> {
    let mask: BooleanChunked = float_values(df, label)?
        .into_iter()
        .map(|v| Some(v.is_some_and(|v| v > 0.0)))
        .collect();
    Ok(df.filter(&mask)?)
}

fn extract_labels(df: &DataFrame, target: TargetType) -> Result<Array1<f64>> {
    let name = target.label_column();
    let values = float_values(df, name)?;
    if values.null_count() > 0 {
        return Err(ModelingError::Data(format!(
            "label column '{name}' has {} missing value(s)",
            values.null_count()
        )));
    }
    Ok(values.into_no_null_iter().collect())
}

/// Row-major matrix of an all-numeric frame
fn to_matrix(df: &DataFrame) -> Result<Array2<f64>> {
    let columns = df
        .get_columns()
        .iter()
        .map(|c| -> Result<Vec<f64>> {
            let series = c.as_materialized_series().cast(&DataType::Float64)?;
            Ok(series.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect())
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Array2::from_shape_fn((df.height(), df.width()), |(i, j)| columns[j][i]))
}
