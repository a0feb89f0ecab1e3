//! Holdout evaluation with target-appropriate metrics

use crate::error::{ModelingError, Result};
use crate::target::TargetType;
use crate::training::{Model, ModelBundle, ModelFamily};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Metric family used for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// `accuracy`, `roc_auc`
    Classification,
    /// `mae`, `mse`, `rmse`, `r2`
    Regression,
}

impl MetricKind {
    pub fn for_target(target: TargetType) -> Self {
        if target.is_classification() {
            MetricKind::Classification
        } else {
            MetricKind::Regression
        }
    }

    /// Keys present in every report of this kind
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            MetricKind::Classification => &["accuracy", "roc_auc"],
            MetricKind::Regression => &["mae", "mse", "rmse", "r2"],
        }
    }
}

/// Metrics of one model on the holdout partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub kind: MetricKind,
    pub metrics: BTreeMap<String, f64>,
    /// Scores for classification, predictions for regression
    pub predictions: Vec<f64>,
}

impl EvaluationReport {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}

/// Evaluate `model` on the holdout data of a `target` run.
///
/// Risk scores come from [`Model::predict_proba`] when the model has one and
/// from [`Model::predict`] otherwise.
pub fn evaluate(
    model: &dyn Model,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
    target: TargetType,
) -> Result<EvaluationReport> {
    if x_test.nrows() != y_test.len() {
        return Err(ModelingError::Shape {
            expected: format!("{} labels", x_test.nrows()),
            actual: format!("{} labels", y_test.len()),
        });
    }
    if y_test.is_empty() {
        return Err(ModelingError::InsufficientData(
            "cannot evaluate on an empty test set".to_string(),
        ));
    }

    let kind = MetricKind::for_target(target);
    let scores = match kind {
        MetricKind::Classification => match model.predict_proba(x_test) {
            Some(proba) => proba?,
            None => model.predict(x_test)?,
        },
        MetricKind::Regression => model.predict(x_test)?,
    };

    let metrics = match kind {
        MetricKind::Classification => classification_metrics(y_test, &scores)?,
        MetricKind::Regression => regression_metrics(y_test, &scores),
    };
    debug!(family = %model.family(), ?metrics, "evaluated");

    Ok(EvaluationReport {
        kind,
        metrics,
        predictions: scores.to_vec(),
    })
}

/// Evaluate every model of the bundle, in bundle order
#[instrument(skip_all, fields(target = %bundle.target(), rows = y_test.len()))]
pub fn evaluate_bundle(
    bundle: &ModelBundle,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
) -> Result<Vec<(ModelFamily, EvaluationReport)>> {
    bundle
        .iter()
        .map(|model| Ok((model.family(), evaluate(model, x_test, y_test, bundle.target())?)))
        .collect()
}

fn classification_metrics(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<BTreeMap<String, f64>> {
    let correct = y_true
        .iter()
        .zip(scores.iter())
        .filter(|(t, s)| (**t > 0.5) == (**s > 0.5))
        .count();
    let accuracy = correct as f64 / y_true.len() as f64;

    let mut metrics = BTreeMap::new();
    metrics.insert("accuracy".to_string(), accuracy);
    metrics.insert("roc_auc".to_string(), roc_auc(y_true, scores)?);
    Ok(metrics)
}

/// Area under the ROC curve as the Mann-Whitney rank statistic; tied scores
/// share their average rank.
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<f64> {
    let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(ModelingError::InsufficientData(
            "ROC AUC needs both positive and negative labels in the test set".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based
        let avg_rank = (start + end + 1) as f64 / 2.0;
        pos_rank_sum += avg_rank * order[start..end].iter().filter(|&&i| y_true[i] > 0.5).count() as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

fn regression_metrics(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> BTreeMap<String, f64> {
    let n = y_true.len() as f64;
    let errors: Vec<f64> = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p).collect();

    let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
    let mae: f64 = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

    let y_mean: f64 = y_true.iter().sum::<f64>() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    BTreeMap::from([
        ("mae".to_string(), mae),
        ("mse".to_string(), mse),
        ("rmse".to_string(), mse.sqrt()),
        ("r2".to_string(), r2),
    ])
}
