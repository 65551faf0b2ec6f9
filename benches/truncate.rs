//! ANSI-aware truncation and template fitting, the work redone on every resize.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use anifetch::layout::LayoutPlan;
use anifetch::text::truncate_line;

fn info_lines() -> Vec<String> {
    (0..24)
        .map(|row| format!("\x1b[1;3{}mKey {row}\x1b[0m: value with 日本語 and some padding text {row}", row % 8))
        .collect()
}

fn bench_truncate(c: &mut Criterion) {
    let lines = info_lines();
    let mut group = c.benchmark_group("truncate");
    group.sample_size(50);

    group.bench_function("colored_line_to_40", |b| {
        b.iter(|| black_box(truncate_line(black_box(&lines[3]), 40)));
    });

    let plan = LayoutPlan::new(40, 20, true);
    let template = plan.template(&lines);
    group.bench_function("fit_template_to_80", |b| {
        b.iter(|| black_box(template.fit(black_box(80))));
    });

    group.finish();
}

criterion_group!(benches, bench_truncate);
criterion_main!(benches);
