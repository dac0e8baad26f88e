use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use branchline::linalg;
use branchline::{
    EngineConfig, Entity, EntityId, EntityTypeRecord, SchemaTable, StateRecord, TickExt, TimelineEngine,
};

fn star_schemas() -> SchemaTable {
    SchemaTable::from_records(vec![
        EntityTypeRecord::new(
            "Galaxy",
            vec![
                StateRecord::new("Initial", "1 billion years").to("Active"),
                StateRecord::new("Active", "10 billion years").to("Dead"),
                StateRecord::new("Dead", ""),
            ],
        ),
        EntityTypeRecord::new(
            "Star",
            vec![
                StateRecord::new("Nebula", "10 million years")
                    .to("Main")
                    .correlated("galaxy", "Initial", 3.0)
                    .correlated("galaxy", "Active", 1.0),
                StateRecord::new("Main", "5 billion years")
                    .to_weighted("Giant", 9.0)
                    .to_weighted("Collapsed", 1.0)
                    .correlated("galaxy", "Active", 1.0),
                StateRecord::new("Giant", "1 billion years").to("Dwarf"),
                StateRecord::new("Dwarf", "").correlated("galaxy", "Dead", 1.0),
                StateRecord::new("Collapsed", "").correlated("galaxy", "Dead", 1.0),
            ],
        )
        .parent("galaxy", "Galaxy")
        .relation("companion", "Star"),
    ])
    .unwrap()
}

fn engine_with_pair() -> (TimelineEngine, EntityId) {
    let schemas = star_schemas();
    let galaxy_type = schemas.resolve("Galaxy").unwrap();
    let star_type = schemas.resolve("Star").unwrap();
    let mut engine = TimelineEngine::new(schemas, EngineConfig::default().with_seed(42)).unwrap();
    let galaxy = engine.register(&Entity::new(galaxy_type)).unwrap();
    let primary = engine
        .register(&Entity::new(star_type).with_parent(galaxy).unwrap())
        .unwrap();
    let companion = engine
        .register(
            &Entity::new(star_type)
                .with_parent(galaxy)
                .unwrap()
                .with_lateral("companion", primary)
                .unwrap(),
        )
        .unwrap();
    (engine, companion)
}

fn bench_matrix_power(c: &mut Criterion) {
    let schemas = star_schemas();
    let star = schemas.schema(schemas.resolve("Star").unwrap()).unwrap();
    let matrix = star.transition_matrix();

    let mut group = c.benchmark_group("linalg/power");
    for years in [1u64, 1_000, 1_000_000, 10_000_000_000] {
        group.bench_with_input(BenchmarkId::from_parameter(years), &years.years(), |b, &exponent| {
            b.iter(|| linalg::power(black_box(matrix), black_box(exponent)));
        });
    }
    group.finish();
}

fn bench_forecast(c: &mut Criterion) {
    c.bench_function("timeline/forecast_with_relations", |b| {
        let (mut engine, star) = engine_with_pair();
        let root = engine.root_universe();
        let date = 4u64.billion().years();
        b.iter(|| {
            let mut timeline = engine.continuity(&root, star).unwrap();
            black_box(timeline.forecast(black_box(date)).unwrap())
        });
    });
}

fn bench_measure_series(c: &mut Criterion) {
    c.bench_function("timeline/measure_series_64", |b| {
        b.iter_batched(
            engine_with_pair,
            |(mut engine, star)| {
                let root = engine.root_universe();
                let mut timeline = engine.continuity(&root, star).unwrap();
                for k in 1..=64u64 {
                    black_box(timeline.measure(k * 250u64.million().years()).unwrap());
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_matrix_power, bench_forecast, bench_measure_series);
criterion_main!(benches);
