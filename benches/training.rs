use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use insurance_models::evaluation::evaluate_bundle;
use insurance_models::target::TargetType;
use insurance_models::training::{train, TrainingConfig};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_data(n_rows: usize, n_features: usize, target: TargetType) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0);

    let y = x
        .rows()
        .into_iter()
        .map(|r| {
            let signal = r.sum() + rng.gen::<f64>();
            match target {
                TargetType::Risk => f64::from(signal > 5.0 * n_features as f64),
                TargetType::Severity => signal + 1.0,
                TargetType::Margin => signal - 5.0 * n_features as f64,
            }
        })
        .collect();

    (x, y)
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10); // Fewer samples for training benchmarks

    let config = TrainingConfig::new().with_n_estimators(50).with_max_depth(8);

    for target in TargetType::ALL {
        for n_rows in [1000, 5000].iter() {
            let (x, y) = create_data(*n_rows, 10, target);

            group.bench_with_input(
                BenchmarkId::new(format!("bundle_{}", target), n_rows),
                &(x, y),
                |b, (x, y)| b.iter(|| train(black_box(x), black_box(y), target, &config).unwrap()),
            );
        }
    }

    group.finish();
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation");

    let config = TrainingConfig::new().with_n_estimators(50);
    let (x, y) = create_data(5000, 10, TargetType::Risk);
    let bundle = train(&x, &y, TargetType::Risk, &config).unwrap();

    group.bench_function("evaluate_bundle_risk", |b| {
        b.iter(|| evaluate_bundle(&bundle, black_box(&x), black_box(&y)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_training, bench_evaluation);
criterion_main!(benches);
