//! Benchmarks for configuration loading and pipeline construction
//!
//! Run with: cargo bench --package rampart-config

use criterion::{criterion_group, criterion_main, Criterion};
use rampart_config::{
    BulkheadSettings, CacheSettings, Config, ConfigLoader, PipelineBuilder, PolicyKind,
    RateLimiterSettings,
};
use rampart_resilience::ExecutionContext;
use std::hint::black_box;
use tempfile::TempDir;

fn setup_loader() -> (TempDir, ConfigLoader) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let loader = ConfigLoader::new(temp_dir.path().join("rampart.toml"));
    (temp_dir, loader)
}

fn full_config() -> Config {
    Config {
        pipeline: vec![
            PolicyKind::Cache,
            PolicyKind::Bulkhead,
            PolicyKind::Retry,
            PolicyKind::CircuitBreaker,
            PolicyKind::Timeout,
            PolicyKind::RateLimiter,
        ],
        bulkhead: Some(BulkheadSettings::default()),
        rate_limiter: Some(RateLimiterSettings::default()),
        cache: Some(CacheSettings::default()),
        ..Config::default()
    }
}

fn bench_config_validation(c: &mut Criterion) {
    let config = full_config();

    c.bench_function("config_validate", |b| {
        b.iter(|| {
            let result = config.validate();
            black_box(result);
        });
    });
}

fn bench_config_serialization(c: &mut Criterion) {
    let config = full_config();

    c.bench_function("config_serialize_toml", |b| {
        b.iter(|| {
            let text = ConfigLoader::to_toml_string(&config).expect("Failed to serialize");
            black_box(text);
        });
    });
}

fn bench_config_parse(c: &mut Criterion) {
    let text = ConfigLoader::to_toml_string(&full_config()).expect("Failed to serialize");

    c.bench_function("config_parse_toml", |b| {
        b.iter(|| {
            let config = ConfigLoader::from_toml_str(&text).expect("Failed to parse");
            black_box(config);
        });
    });
}

fn bench_config_save(c: &mut Criterion) {
    let (_temp_dir, loader) = setup_loader();
    let config = full_config();

    c.bench_function("config_save", |b| {
        b.iter(|| {
            loader.save(&config).expect("Failed to save");
        });
    });
}

fn bench_config_load(c: &mut Criterion) {
    let (_temp_dir, loader) = setup_loader();
    loader.save(&full_config()).expect("Failed to save");

    c.bench_function("config_load", |b| {
        b.iter(|| {
            let loaded = loader.load().expect("Failed to load");
            black_box(loaded);
        });
    });
}

fn bench_config_merge(c: &mut Criterion) {
    let mut base = Config::default();
    let override_config = full_config();

    c.bench_function("config_merge", |b| {
        b.iter(|| {
            base.merge(override_config.clone());
            black_box(&base);
        });
    });
}

fn bench_pipeline_build(c: &mut Criterion) {
    let config = full_config();

    c.bench_function("pipeline_build", |b| {
        b.iter(|| {
            let pipeline = PipelineBuilder::<u64>::new(config.clone())
                .build()
                .expect("Failed to build");
            black_box(pipeline);
        });
    });
}

fn bench_pipeline_execute(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create runtime");
    let config = Config {
        pipeline: vec![
            PolicyKind::Retry,
            PolicyKind::CircuitBreaker,
            PolicyKind::Timeout,
        ],
        ..Config::default()
    };
    let pipeline = PipelineBuilder::<u64>::new(config)
        .build()
        .expect("Failed to build");

    c.bench_function("pipeline_execute_success", |b| {
        b.iter(|| {
            let result = runtime.block_on(
                pipeline.execute_fn(|_ctx| async { Ok(7) }, ExecutionContext::new()),
            );
            black_box(result)
        });
    });
}

criterion_group!(
    benches,
    bench_config_validation,
    bench_config_serialization,
    bench_config_parse,
    bench_config_save,
    bench_config_load,
    bench_config_merge,
    bench_pipeline_build,
    bench_pipeline_execute
);

criterion_main!(benches);
