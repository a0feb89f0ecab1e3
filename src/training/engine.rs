//! Training engine: fits every model family for one target

use super::config::TrainingConfig;
use super::decision_tree::DecisionTree;
use super::linear_models::LinearRegression;
use super::models::{Model, ModelFamily};
use super::random_forest::RandomForest;
use super::xgboost::BoostedTrees;
use crate::error::{ModelingError, Result};
use crate::target::TargetType;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// The four fitted models of one run, always in [`ModelFamily::ALL`] order
#[derive(Debug)]
pub struct ModelBundle {
    target: TargetType,
    models: Vec<Box<dyn Model>>,
}

impl ModelBundle {
    pub fn target(&self) -> TargetType {
        self.target
    }

    /// Model of the given family
    pub fn get(&self, family: ModelFamily) -> Option<&dyn Model> {
        self.models
            .iter()
            .find(|m| m.family() == family)
            .map(|m| &**m)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Model> {
        self.models.iter().map(|m| &**m)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Unfitted model of `family`, configured for `target`
fn build_model(family: ModelFamily, target: TargetType, config: &TrainingConfig) -> Box<dyn Model> {
    match family {
        ModelFamily::Linear => Box::new(LinearRegression::new()),
        ModelFamily::Tree => {
            let mut tree = DecisionTree::new()
                .with_min_samples_split(config.min_samples_split)
                .with_min_samples_leaf(config.min_samples_leaf)
                .with_random_state(config.random_state);
            if let Some(d) = config.max_depth {
                tree = tree.with_max_depth(d);
            }
            Box::new(tree)
        }
        ModelFamily::Ensemble => {
            let mut forest = RandomForest::new(config.n_estimators)
                .with_min_samples_split(config.min_samples_split)
                .with_min_samples_leaf(config.min_samples_leaf)
                .with_max_features(config.forest_max_features)
                .with_bootstrap(config.forest_bootstrap)
                .with_random_state(config.random_state);
            if let Some(d) = config.forest_max_depth {
                forest = forest.with_max_depth(d);
            }
            Box::new(forest)
        }
        ModelFamily::Boosted => Box::new(BoostedTrees::for_target(target, config.boosting_config())),
    }
}

fn fit_family(
    family: ModelFamily,
    x: &Array2<f64>,
    y: &Array1<f64>,
    target: TargetType,
    config: &TrainingConfig,
) -> Result<Box<dyn Model>> {
    let start = Instant::now();
    let mut model = build_model(family, target, config);
    model.fit(x, y).map_err(|e| ModelingError::fit(family, e))?;
    debug!(%family, elapsed_ms = start.elapsed().as_millis() as u64, "model fitted");
    Ok(model)
}

/// Fit the linear, tree, ensemble and boosted families on the same training data.
///
/// Families are fitted in parallel. The first failure is reported as
/// [`ModelingError::Fit`] naming the family; no partial bundle is returned.
#[instrument(skip(x, y, config), fields(rows = x.nrows(), features = x.ncols()))]
pub fn train(x: &Array2<f64>, y: &Array1<f64>, target: TargetType, config: &TrainingConfig) -> Result<ModelBundle> {
    config.validate()?;
    if x.nrows() != y.len() {
        return Err(ModelingError::Shape {
            expected: format!("{} labels", x.nrows()),
            actual: format!("{} labels", y.len()),
        });
    }

    let start = Instant::now();
    let models = ModelFamily::ALL
        .par_iter()
        .map(|&family| fit_family(family, x, y, target, config))
        .collect::<Result<Vec<_>>>()?;

    info!(
        %target,
        n_models = models.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "training complete"
    );

    Ok(ModelBundle { target, models })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::Objective;
    use ndarray::Array2;

    fn quick_config() -> TrainingConfig {
        let mut config = TrainingConfig::new().with_n_estimators(5).with_max_depth(4);
        config.boosting.n_estimators = 10;
        config
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * (j + 3)) % 17) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| 1.0 + r[0] + 0.5 * r[1]).collect();
        (x, y)
    }

    #[test]
    fn test_bundle_order() {
        let (x, y) = data();
        let bundle = train(&x, &y, TargetType::Margin, &quick_config()).unwrap();

        let families: Vec<ModelFamily> = bundle.iter().map(|m| m.family()).collect();
        assert_eq!(families, ModelFamily::ALL.to_vec());
        assert_eq!(bundle.target(), TargetType::Margin);
        for model in bundle.iter() {
            assert_eq!(model.predict(&x).unwrap().len(), 40);
        }
    }

    #[test]
    fn test_risk_booster_has_probabilities() {
        let (x, _) = data();
        let y: Array1<f64> = x.column(0).mapv(|v| if v > 8.0 { 1.0 } else { 0.0 });
        let bundle = train(&x, &y, TargetType::Risk, &quick_config()).unwrap();

        let boosted = bundle.get(ModelFamily::Boosted).unwrap();
        assert!(boosted.predict_proba(&x).is_some());
        assert!(bundle.get(ModelFamily::Linear).unwrap().predict_proba(&x).is_none());
        assert_eq!(BoostedTrees::for_target(TargetType::Risk, Default::default()).objective(), Objective::BinaryLogistic);
    }

    #[test]
    fn test_severity_zero_label_fails_boosted() {
        let (x, mut y) = data();
        y[0] = 0.0;
        let err = train(&x, &y, TargetType::Severity, &quick_config()).unwrap_err();
        assert!(matches!(
            err,
            ModelingError::Fit {
                family: ModelFamily::Boosted,
                ..
            }
        ));
    }

    #[test]
    fn test_linear_failure_aborts_bundle() {
        // Finite but so large that X^T X overflows; only least squares breaks
        let x = Array2::from_shape_fn((40, 2), |(i, j)| (i * (j + 1) % 13) as f64 * 1e199 + i as f64 * 1e198);
        let y: Array1<f64> = (0..40).map(|i| (i % 5) as f64).collect();

        let result = train(&x, &y, TargetType::Margin, &quick_config());
        match result {
            Err(ModelingError::Fit { family, reason }) => {
                assert_eq!(family, ModelFamily::Linear);
                assert!(reason.contains("least squares"), "{reason}");
            }
            Err(other) => panic!("expected fit error, got {other:?}"),
            Ok(bundle) => panic!("expected no bundle, got {} models", bundle.len()),
        }
    }

    #[test]
    fn test_forest_settings_reach_ensemble() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64);
        let y: Array1<f64> = (0..40).map(|i| i as f64).collect();

        // Without bootstrap every unbounded tree reproduces the training labels
        let config = quick_config().with_forest_bootstrap(false);
        let bundle = train(&x, &y, TargetType::Margin, &config).unwrap();
        let preds = bundle.get(ModelFamily::Ensemble).unwrap().predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-9);
        }

        // Depth-one trees on identical data agree on one stump
        let config = quick_config().with_forest_bootstrap(false).with_forest_max_depth(1);
        let bundle = train(&x, &y, TargetType::Margin, &config).unwrap();
        let mut distinct = bundle.get(ModelFamily::Ensemble).unwrap().predict(&x).unwrap().to_vec();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();
        assert_eq!(distinct.len(), 2);

        let config = quick_config().with_forest_max_features(crate::training::MaxFeatures::Sqrt);
        assert!(train(&x, &y, TargetType::Margin, &config).is_ok());
    }

    #[test]
    fn test_shape_mismatch() {
        let (x, _) = data();
        let y = Array1::zeros(3);
        assert!(matches!(
            train(&x, &y, TargetType::Margin, &quick_config()),
            Err(ModelingError::Shape { .. })
        ));
    }
}
