//! Boosted trees with a per-target objective
//!
//! | Target   | Objective        | Link     | Internal metric |
//! |----------|------------------|----------|-----------------|
//! | risk     | `BinaryLogistic` | logit    | log-loss        |
//! | severity | `Gamma`          | log      | RMSE            |
//! | margin   | `SquaredError`   | identity | RMSE            |
//!
//! Each round fits one tree to the objective's gradient and hessian on the raw
//! (link) scale. A leaf weight is `-G / (H + lambda)` after soft-thresholding
//! `G` by `alpha`; a candidate split must gain more than `gamma` and leave at
//! least `min_child_weight` hessian on each side. Predictions pass the raw
//! score through the inverse link, so severity predictions are always positive
//! and risk predictions are probabilities.

use super::models::{check_n_features, validate_training_data, Model, ModelFamily};
use crate::error::{ModelingError, Result};
use crate::target::TargetType;
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Loss minimized by the booster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Log loss on a sigmoid link, labels in {0, 1}
    BinaryLogistic,
    /// Gamma deviance on a log link, labels strictly positive
    Gamma,
    /// Squared error on the identity link
    SquaredError,
}

impl Objective {
    pub fn for_target(target: TargetType) -> Self {
        match target {
            TargetType::Risk => Objective::BinaryLogistic,
            TargetType::Severity => Objective::Gamma,
            TargetType::Margin => Objective::SquaredError,
        }
    }

    /// Metric tracked on the training set after every round
    pub fn eval_metric(&self) -> EvalMetric {
        match self {
            Objective::BinaryLogistic => EvalMetric::LogLoss,
            Objective::Gamma | Objective::SquaredError => EvalMetric::Rmse,
        }
    }

    fn validate_labels(&self, y: &Array1<f64>) -> Result<()> {
        match self {
            Objective::BinaryLogistic => {
                if let Some(v) = y.iter().find(|v| !(0.0..=1.0).contains(*v)) {
                    return Err(ModelingError::Data(format!(
                        "binary logistic labels must lie in [0, 1], found {v}"
                    )));
                }
            }
            Objective::Gamma => {
                if let Some(v) = y.iter().find(|v| **v <= 0.0) {
                    return Err(ModelingError::Data(format!(
                        "gamma objective requires strictly positive labels, found {v}"
                    )));
                }
            }
            Objective::SquaredError => {}
        }
        Ok(())
    }

    /// Initial raw score (margin space)
    fn base_score(&self, y: &Array1<f64>) -> f64 {
        let mean = y.mean().unwrap_or(0.0);
        match self {
            Objective::BinaryLogistic => {
                let p = mean.clamp(1e-7, 1.0 - 1e-7);
                (p / (1.0 - p)).ln()
            }
            Objective::Gamma => mean.ln(),
            Objective::SquaredError => mean,
        }
    }

    /// Gradient and hessian of the loss at raw score `f` for label `y`
    fn grad_hess(&self, f: f64, y: f64) -> (f64, f64) {
        match self {
            Objective::BinaryLogistic => {
                let p = sigmoid(f);
                (p - y, (p * (1.0 - p)).max(1e-7))
            }
            Objective::Gamma => {
                let r = y * (-f).exp();
                (1.0 - r, r.max(1e-7))
            }
            Objective::SquaredError => (f - y, 1.0),
        }
    }

    /// Map raw score to the prediction scale
    fn transform(&self, f: f64) -> f64 {
        match self {
            Objective::BinaryLogistic => sigmoid(f),
            Objective::Gamma => f.exp(),
            Objective::SquaredError => f,
        }
    }
}

/// Training-set metric recorded per boosting round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMetric {
    LogLoss,
    Rmse,
}

impl EvalMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalMetric::LogLoss => "logloss",
            EvalMetric::Rmse => "rmse",
        }
    }

    fn compute(&self, predictions: &Array1<f64>, y: &Array1<f64>) -> f64 {
        let n = y.len().max(1) as f64;
        match self {
            EvalMetric::LogLoss => {
                -predictions
                    .iter()
                    .zip(y.iter())
                    .map(|(&p, &t)| {
                        let p = p.clamp(1e-15, 1.0 - 1e-15);
                        t * p.ln() + (1.0 - t) * (1.0 - p).ln()
                    })
                    .sum::<f64>()
                    / n
            }
            EvalMetric::Rmse => {
                let mse = predictions
                    .iter()
                    .zip(y.iter())
                    .map(|(p, t)| (p - t).powi(2))
                    .sum::<f64>()
                    / n;
                mse.sqrt()
            }
        }
    }
}

/// Booster hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split (gamma)
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

/// A single node in a boosted tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum BoostNode {
    Leaf { weight: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<BoostNode>,
        right: Box<BoostNode>,
    },
}

impl BoostNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                BoostNode::Leaf { weight } => return *weight,
                BoostNode::Split { feature, threshold, left, right } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn count_splits(&self, counts: &mut [f64]) {
        if let BoostNode::Split { feature, left, right, .. } = self {
            counts[*feature] += 1.0;
            left.count_splits(counts);
            right.count_splits(counts);
        }
    }
}

/// Gradient statistics of the rows reaching one node
struct NodeStats<'a> {
    grad: &'a Array1<f64>,
    hess: &'a Array1<f64>,
}

/// Build a tree using exact greedy split finding
fn build_tree(
    x: &Array2<f64>,
    stats: &NodeStats<'_>,
    indices: &[usize],
    feature_indices: &[usize],
    depth: usize,
    config: &BoostingConfig,
) -> BoostNode {
    let g_sum: f64 = indices.iter().map(|&i| stats.grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| stats.hess[i]).sum();
    let leaf_weight = compute_leaf_weight(g_sum, h_sum, config.reg_lambda, config.reg_alpha);

    if depth >= config.max_depth || indices.len() < 2 || h_sum < config.min_child_weight {
        return BoostNode::Leaf { weight: leaf_weight };
    }

    // Candidates come back in feature order; the first maximum wins ties
    let candidates: Vec<Option<(usize, f64, f64)>> = feature_indices
        .par_iter()
        .map(|&f| find_best_split_for_feature(x, stats, indices, f, config))
        .collect();
    let best = candidates.into_iter().flatten().fold(None, |best: Option<(usize, f64, f64)>, c| match best {
        Some(b) if b.2 >= c.2 => Some(b),
        _ => Some(c),
    });

    match best {
        Some((feature, threshold, gain)) if gain > config.gamma => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

            if left_idx.is_empty() || right_idx.is_empty() {
                return BoostNode::Leaf { weight: leaf_weight };
            }

            BoostNode::Split {
                feature,
                threshold,
                left: Box::new(build_tree(x, stats, &left_idx, feature_indices, depth + 1, config)),
                right: Box::new(build_tree(x, stats, &right_idx, feature_indices, depth + 1, config)),
            }
        }
        _ => BoostNode::Leaf { weight: leaf_weight },
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
fn compute_leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    let g_adj = if g_sum > alpha {
        g_sum - alpha
    } else if g_sum < -alpha {
        g_sum + alpha
    } else {
        return 0.0;
    };
    -g_adj / (h_sum + lambda)
}

/// Best (feature, threshold, gain) for a single feature
fn find_best_split_for_feature(
    x: &Array2<f64>,
    stats: &NodeStats<'_>,
    indices: &[usize],
    feature: usize,
    config: &BoostingConfig,
) -> Option<(usize, f64, f64)> {
    let mut sorted: Vec<(f64, f64, f64)> = indices
        .iter()
        .map(|&i| (x[[i, feature]], stats.grad[i], stats.hess[i]))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let g_total: f64 = sorted.iter().map(|s| s.1).sum();
    let h_total: f64 = sorted.iter().map(|s| s.2).sum();
    let lambda = config.reg_lambda;
    let parent_score = g_total * g_total / (h_total + lambda);

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<(usize, f64, f64)> = None;

    for pos in 0..sorted.len().saturating_sub(1) {
        let (value, g, h) = sorted[pos];
        g_left += g;
        h_left += h;

        let next = sorted[pos + 1].0;
        if next <= value {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * ((g_left * g_left) / (h_left + lambda) + (g_right * g_right) / (h_right + lambda) - parent_score);

        if best.map_or(true, |b| gain > b.2) {
            let mid = value + (next - value) / 2.0;
            best = Some((feature, if mid < next { mid } else { value }, gain));
        }
    }

    best
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = (((n as f64) * ratio).ceil() as usize).max(1);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

/// Second-order gradient boosted trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTrees {
    objective: Objective,
    config: BoostingConfig,
    trees: Vec<BoostNode>,
    base_score: f64,
    n_features: usize,
    eval_history: Vec<f64>,
}

impl BoostedTrees {
    pub fn new(objective: Objective, config: BoostingConfig) -> Self {
        Self {
            objective,
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
            eval_history: Vec::new(),
        }
    }

    /// Booster with the objective matching `target`
    pub fn for_target(target: TargetType, config: BoostingConfig) -> Self {
        Self::new(Objective::for_target(target), config)
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Training-set value of [`Objective::eval_metric`] after each round
    pub fn eval_history(&self) -> &[f64] {
        &self.eval_history
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn validate_config(&self) -> Result<()> {
        let c = &self.config;
        if c.n_estimators == 0 {
            return Err(ModelingError::Configuration("n_estimators must be positive".to_string()));
        }
        if !(c.learning_rate > 0.0) {
            return Err(ModelingError::Configuration(format!(
                "learning_rate must be positive, got {}",
                c.learning_rate
            )));
        }
        for (name, ratio) in [("subsample", c.subsample), ("colsample_bytree", c.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ModelingError::Configuration(format!(
                    "{name} must lie in (0, 1], got {ratio}"
                )));
            }
        }
        Ok(())
    }

    /// Raw scores before the objective's link transform
    fn raw_predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ModelingError::ModelNotFitted);
        }
        check_n_features(x, self.n_features)?;

        let lr = self.config.learning_rate;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.base_score + lr * self.trees.iter().map(|t| t.predict(row)).sum::<f64>())
            .collect())
    }
}

impl Model for BoostedTrees {
    fn family(&self) -> ModelFamily {
        ModelFamily::Boosted
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_training_data(x, y)?;
        self.validate_config()?;
        self.objective.validate_labels(y)?;

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        self.base_score = self.objective.base_score(y);
        self.trees.clear();
        self.eval_history.clear();

        let mut raw = Array1::from_elem(n_samples, self.base_score);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let metric = self.objective.eval_metric();

        for _ in 0..self.config.n_estimators {
            let (grad, hess): (Vec<f64>, Vec<f64>) = raw
                .iter()
                .zip(y.iter())
                .map(|(&f, &t)| self.objective.grad_hess(f, t))
                .unzip();
            let (grad, hess) = (Array1::from_vec(grad), Array1::from_vec(hess));
            let stats = NodeStats { grad: &grad, hess: &hess };

            let row_indices = subsample(&mut rng, n_samples, self.config.subsample);
            let col_indices = subsample(&mut rng, self.n_features, self.config.colsample_bytree);

            let tree = build_tree(x, &stats, &row_indices, &col_indices, 0, &self.config);

            for (i, row) in x.rows().into_iter().enumerate() {
                raw[i] += self.config.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);

            let transformed = raw.mapv(|f| self.objective.transform(f));
            self.eval_history.push(metric.compute(&transformed, y));
        }

        if raw.iter().any(|v| !v.is_finite()) {
            return Err(ModelingError::Data("boosting diverged to non-finite scores".to_string()));
        }

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let raw = self.raw_predict(x)?;
        Ok(raw.mapv(|f| self.objective.transform(f)))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Option<Result<Array1<f64>>> {
        match self.objective {
            Objective::BinaryLogistic => Some(self.raw_predict(x).map(|raw| raw.mapv(sigmoid))),
            _ => None,
        }
    }

    /// Split-count importances across all trees
    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_features == 0 {
            return None;
        }
        let mut counts = vec![0.0f64; self.n_features];
        for tree in &self.trees {
            tree.count_splits(&mut counts);
        }
        let total: f64 = counts.iter().sum();
        if total > 0.0 {
            counts.iter_mut().for_each(|c| *c /= total);
        }
        Some(Array1::from_vec(counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((50, 2), (0..100).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0] * 2.0 + r[1] * 0.5 + 1.0).collect();
        (x, y)
    }

    fn classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((50, 2), (0..100).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| if r[0] + r[1] > 5.0 { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    fn small_config() -> BoostingConfig {
        BoostingConfig {
            n_estimators: 50,
            max_depth: 4,
            ..Default::default()
        }
    }

    fn r2(pred: &Array1<f64>, y: &Array1<f64>) -> f64 {
        let ym = y.mean().unwrap();
        let ss_res = (pred - y).mapv(|v| v * v).sum();
        let ss_tot = y.mapv(|v| (v - ym).powi(2)).sum();
        1.0 - ss_res / ss_tot
    }

    #[test]
    fn test_objective_per_target() {
        assert_eq!(Objective::for_target(TargetType::Risk), Objective::BinaryLogistic);
        assert_eq!(Objective::for_target(TargetType::Severity), Objective::Gamma);
        assert_eq!(Objective::for_target(TargetType::Margin), Objective::SquaredError);
        assert_eq!(Objective::BinaryLogistic.eval_metric(), EvalMetric::LogLoss);
        assert_eq!(Objective::Gamma.eval_metric().as_str(), "rmse");
    }

    #[test]
    fn test_squared_error_regression() {
        let (x, y) = regression_data();
        let mut model = BoostedTrees::new(Objective::SquaredError, small_config());
        model.fit(&x, &y).unwrap();
        let score = r2(&model.predict(&x).unwrap(), &y);
        assert!(score > 0.9, "R² = {}", score);
        assert!(model.predict_proba(&x).is_none());
    }

    #[test]
    fn test_gamma_regression_positive_predictions() {
        let (x, y) = regression_data();
        let mut model = BoostedTrees::new(Objective::Gamma, small_config());
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert!(pred.iter().all(|p| *p > 0.0));
        assert!(r2(&pred, &y) > 0.8);
    }

    #[test]
    fn test_gamma_rejects_non_positive_labels() {
        let (x, mut y) = regression_data();
        y[3] = 0.0;
        let mut model = BoostedTrees::new(Objective::Gamma, small_config());
        assert!(matches!(model.fit(&x, &y), Err(ModelingError::Data(_))));
    }

    #[test]
    fn test_logistic_classifier() {
        let (x, y) = classification_data();
        let mut model = BoostedTrees::for_target(TargetType::Risk, small_config());
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
        let correct = proba
            .iter()
            .zip(y.iter())
            .filter(|(p, t)| (**p > 0.5) == (**t > 0.5))
            .count();
        assert!(correct as f64 / y.len() as f64 >= 0.8);
    }

    #[test]
    fn test_eval_history_decreases() {
        let (x, y) = classification_data();
        let mut model = BoostedTrees::new(Objective::BinaryLogistic, small_config());
        model.fit(&x, &y).unwrap();

        let history = model.eval_history();
        assert_eq!(history.len(), 50);
        assert!(history[history.len() - 1] < history[0]);
    }

    #[test]
    fn test_subsampled_fit_is_reproducible() {
        let (x, y) = regression_data();
        let config = BoostingConfig {
            subsample: 0.7,
            colsample_bytree: 0.5,
            ..small_config()
        };
        let mut a = BoostedTrees::new(Objective::SquaredError, config.clone());
        let mut b = BoostedTrees::new(Objective::SquaredError, config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_invalid_config() {
        let (x, y) = regression_data();
        let mut model = BoostedTrees::new(
            Objective::SquaredError,
            BoostingConfig {
                subsample: 0.0,
                ..Default::default()
            },
        );
        assert!(matches!(model.fit(&x, &y), Err(ModelingError::Configuration(_))));
    }
}
