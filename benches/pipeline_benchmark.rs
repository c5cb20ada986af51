use std::hint::black_box;

use bpa::encoder::render_batch;
use bpa::prelude::*;
use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

// Synthetic rows spread over a handful of professionals and days
fn synthetic_rows(count: usize) -> Vec<RawEncounterRow> {
    let procedures = ["105", "121", "27", "24", "156", "106", "UNMAPPED"];
    (0..count)
        .map(|i| RawEncounterRow {
            row_id: Some(format!("L{}", i)),
            patient_id: Some(format!("P{}", i % 500)),
            patient_cns: Some(format!("8980000000{:05}", i % 500)),
            patient_name: Some(format!("PACIENTE {}", i % 500)),
            provider_cns: Some(format!("70000000000{:04}", i % 12)),
            provider_function: Some(((i % 15) + 22).to_string()),
            procedure_code: Some(procedures[i % procedures.len()].to_string()),
            quantity: Some(((i % 3) + 1).to_string()),
            service_date: NaiveDate::from_ymd_opt(2024, 3, (i % 28) as u32 + 1),
            birth_date: NaiveDate::from_ymd_opt(1950 + (i % 60) as i32, 6, 15),
            sex: Some(if i % 2 == 0 { "1" } else { "3" }.to_string()),
            race_code: Some(((i % 5) + 1).to_string()),
            ..Default::default()
        })
        .collect()
}

fn config(policy: DedupPolicy) -> ExportConfig {
    ConfigBuilder::new()
        .facility_code("1234567")
        .dedup_policy(policy)
        .progress_bar(false)
        .build()
}

fn benchmark_build_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_batch");
    let tables = MappingTables::builtin();
    let competence = Competence::parse("202403").expect("valid competence");

    for size in [1_000usize, 10_000] {
        let rows = synthetic_rows(size);
        for policy in [DedupPolicy::None, DedupPolicy::AggregateFull] {
            let config = config(policy);
            let context = PipelineContext::new(&config, competence, &tables).expect("valid config");
            group.bench_with_input(BenchmarkId::new(policy.as_str(), size), &rows, |b, rows| {
                b.iter(|| build_batch(&context, black_box(rows)))
            });
        }
    }
    group.finish();
}

fn benchmark_encode_and_validate(c: &mut Criterion) {
    let tables = MappingTables::builtin();
    let config = config(DedupPolicy::None);
    let context = PipelineContext::new(&config, Competence::parse("202403").expect("valid competence"), &tables)
        .expect("valid config");
    let batch = build_batch(&context, &synthetic_rows(10_000));

    c.bench_function("encode_10k", |b| b.iter(|| black_box(&batch).encode()));

    let text = render_batch(&batch.header, &batch.records);
    let validator = ConformanceValidator::new();
    c.bench_function("validate_10k", |b| {
        b.iter(|| {
            let report = validator.validate_str(black_box(&text));
            assert!(report.is_conformant());
        })
    });
}

criterion_group!(benches, benchmark_build_batch, benchmark_encode_and_validate);
criterion_main!(benches);
