//! Integration test: Full pipeline (load → encode → split → scale → train → evaluate)

use insurance_models::cli::load_data;
use insurance_models::pipeline::{Pipeline, PipelineConfig};
use insurance_models::preprocessing::{EncodingStrategy, ScalingStrategy};
use insurance_models::schema::AttributeSchema;
use insurance_models::target::{TargetType, CLAIM_SEVERITY, HAS_CLAIM, MARGIN};
use insurance_models::training::{BoostingConfig, ModelFamily, TrainingConfig};
use insurance_models::ModelingError;
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn quick_training() -> TrainingConfig {
    TrainingConfig::new()
        .with_n_estimators(10)
        .with_max_depth(5)
        .with_boosting(BoostingConfig {
            n_estimators: 20,
            max_depth: 3,
            ..Default::default()
        })
}

fn create_policy_dataset(n: usize) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(2015);
    let provinces = ["Gauteng", "KwaZulu-Natal", "Western Cape", "Limpopo"];
    let genders = ["Male", "Female", "Not specified"];

    let mut premium = Vec::with_capacity(n);
    let mut sum_insured = Vec::with_capacity(n);
    let mut province = Vec::with_capacity(n);
    let mut gender = Vec::with_capacity(n);
    let mut postal = Vec::with_capacity(n);
    let mut vat = Vec::with_capacity(n);
    let mut month = Vec::with_capacity(n);
    let mut has_claim = Vec::with_capacity(n);
    let mut severity = Vec::with_capacity(n);
    let mut margin = Vec::with_capacity(n);

    for i in 0..n {
        let p = 20.0 + rng.gen::<f64>() * 200.0;
        let claim = i % 4 == 0;
        let amount = if claim { p * 3.0 + rng.gen::<f64>() * 50.0 + 1.0 } else { 0.0 };

        premium.push(p);
        sum_insured.push(rng.gen_range(5_000i64..500_000));
        province.push(provinces[i % provinces.len()]);
        gender.push(if i % 7 == 0 { None } else { Some(genders[i % genders.len()]) });
        postal.push([2000i64, 7100, 8000][i % 3]);
        vat.push(i % 9 == 0);
        month.push(format!("2015-{:02}-01", i % 12 + 1));
        has_claim.push(i64::from(claim));
        severity.push(amount);
        margin.push(p - amount);
    }

    df!(
        "TotalPremium" => premium,
        "SumInsured" => sum_insured,
        "Province" => province,
        "Gender" => gender,
        "PostalCode" => postal,
        "IsVATRegistered" => vat,
        "TransactionMonth" => month,
        HAS_CLAIM => has_claim,
        "TotalClaims" => severity.clone(),
        CLAIM_SEVERITY => severity,
        MARGIN => margin,
    )
    .unwrap()
}

#[test]
fn test_full_risk_pipeline() {
    let df = create_policy_dataset(200);
    let config = PipelineConfig::new(TargetType::Risk).with_training(quick_training());
    let outcome = Pipeline::new(config).run(&df, &AttributeSchema::insurance()).unwrap();

    assert_eq!(outcome.n_test, 40);
    assert_eq!(outcome.n_train, 160);
    assert!(outcome.feature_names.contains(&"PostalCode_7100".to_string()));
    assert!(!outcome.feature_names.contains(&"PostalCode".to_string()));
    // Raw claim amounts and dates never reach the models
    assert!(!outcome.feature_names.contains(&"TotalClaims".to_string()));
    assert!(!outcome.feature_names.contains(&"TransactionMonth".to_string()));
    assert!(outcome.feature_names.contains(&"IsVATRegistered".to_string()));

    let families: Vec<ModelFamily> = outcome.reports.iter().map(|r| r.family).collect();
    assert_eq!(families, ModelFamily::ALL.to_vec());
    for r in &outcome.reports {
        let acc = r.metric("accuracy").unwrap();
        assert!((0.0..=1.0).contains(&acc));
        assert!(r.metric("roc_auc").is_some());
        assert!(r.metric("rmse").is_none());
    }
}

#[test]
fn test_full_severity_pipeline_label_index() {
    let df = create_policy_dataset(200);
    let config = PipelineConfig::new(TargetType::Severity)
        .with_encoding(EncodingStrategy::LabelIndex)
        .with_scaling(ScalingStrategy::Log1p)
        .with_training(quick_training());
    let outcome = Pipeline::new(config).run(&df, &AttributeSchema::insurance()).unwrap();

    // Only the 50 claim rows take part
    assert_eq!(outcome.n_train + outcome.n_test, 50);
    assert!(outcome.feature_names.contains(&"Province".to_string()));

    let best = outcome.best().unwrap();
    let best_rmse = best.metric("rmse").unwrap();
    for r in &outcome.reports {
        assert!(r.metric("rmse").unwrap() >= best_rmse);
    }
}

#[test]
fn test_severity_without_claim_filter_fails_boosted() {
    let df = create_policy_dataset(80);
    let config = PipelineConfig::new(TargetType::Severity)
        .with_claims_only(false)
        .with_training(quick_training());
    let err = Pipeline::new(config).run(&df, &AttributeSchema::insurance()).unwrap_err();
    assert!(matches!(
        err,
        ModelingError::Fit {
            family: ModelFamily::Boosted,
            ..
        }
    ));
}

#[test]
fn test_full_margin_pipeline_from_csv() {
    let mut df = create_policy_dataset(120);
    let tmp = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
    CsvWriter::new(tmp.as_file()).finish(&mut df).unwrap();

    let loaded = load_data(tmp.path()).unwrap();
    assert_eq!(loaded.height(), 120);

    let config = PipelineConfig::new(TargetType::Margin)
        .with_scaling(ScalingStrategy::MinMax)
        .with_seed(7)
        .with_training(quick_training());
    let outcome = Pipeline::new(config).run(&loaded, &AttributeSchema::insurance()).unwrap();

    assert_eq!(outcome.n_test, 24);
    let linear = outcome.report(ModelFamily::Linear).unwrap();
    for key in ["mae", "mse", "rmse", "r2"] {
        assert!(linear.metric(key).is_some(), "missing {key}");
    }
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["target"], "margin");
    assert_eq!(json["reports"].as_array().unwrap().len(), 4);
}

#[test]
fn test_invalid_test_fraction_rejected() {
    let df = create_policy_dataset(40);
    let config = PipelineConfig::new(TargetType::Margin)
        .with_test_fraction(1.5)
        .with_training(quick_training());
    let err = Pipeline::new(config).run(&df, &AttributeSchema::insurance()).unwrap_err();
    assert!(matches!(err, ModelingError::Configuration(_)));
}
