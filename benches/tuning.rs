use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_workflow::prelude::*;
use rand::prelude::*;

fn create_classification_data(n_rows: usize, n_features: usize) -> Dataset {
    let mut rng = rand::thread_rng();

    let labels: Vec<bool> = (0..n_rows).map(|_| rng.gen::<f64>() < 0.2).collect();
    let mut columns: Vec<Column> = (0..n_features)
        .map(|i| {
            let values: Vec<f64> = labels
                .iter()
                .map(|&y| rng.gen::<f64>() * 10.0 + if y && i % 2 == 0 { 3.0 } else { 0.0 })
                .collect();
            Column::numeric(format!("feature_{}", i), values)
        })
        .collect();

    columns.push(Column::categorical(
        "target",
        labels.iter().map(|&y| if y { "yes" } else { "no" }).collect::<Vec<_>>(),
    ));

    Dataset::from_columns(columns).unwrap()
}

fn bench_tuning(c: &mut Criterion) {
    let mut group = c.benchmark_group("tuning");
    group.sample_size(10); // Fewer samples for tuning benchmarks

    let data = create_classification_data(2000, 10);
    let resamples = Resamples::vfold(&data, 5, 1, Some("target"), 42).unwrap();
    let workflow = Workflow::bind(
        Recipe::new("target").add_step(Step::Normalize(Selector::AllNumericPredictors)),
        ModelSpec::logistic_regression()
            .set("penalty", ParamSlot::tune())
            .unwrap(),
    );
    let candidates = Grid::log_sequence("penalty", -4.0, -1.0, 10);

    for threads in [1, 4].iter() {
        group.bench_with_input(
            BenchmarkId::new("logistic_grid", threads),
            threads,
            |b, &threads| {
                b.iter(|| {
                    Tuner::new(TuneConfig::new().with_parallelism(threads))
                        .tune(&workflow, black_box(&candidates), &resamples, &MetricSet::default())
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

fn bench_forest_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let data = create_classification_data(*n_rows, 10);
        let concrete = Workflow::bind(Recipe::new("target"), ModelSpec::random_forest())
            .into_concrete()
            .unwrap();

        group.bench_with_input(BenchmarkId::new("fit", n_rows), &data, |b, data| {
            b.iter(|| concrete.fit(black_box(data)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tuning, bench_forest_fit);
criterion_main!(benches);
