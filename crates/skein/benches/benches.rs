use criterion::{criterion_group, criterion_main, Criterion};
use skein::{
    compile::{build_parser, build_scanner, AdvanceMode, BuildConfig, MinimizeLevel, TableLayout},
    samples::{GrammarSample, ScannerSample},
};

criterion_main!(benches);
criterion_group!(benches, bench_scanners, bench_parsers);

fn bench_scanners(c: &mut Criterion) {
    bench_scanner(c, ScannerSample::Calc);
    bench_scanner(c, ScannerSample::Keywords);
}

fn bench_parsers(c: &mut Criterion) {
    bench_parser(c, GrammarSample::Calc);
    bench_parser(c, GrammarSample::Blocks);
    bench_parser(c, GrammarSample::Lists);
}

fn bench_scanner(c: &mut Criterion, sample: ScannerSample) {
    let def = sample.scanner_def();

    let mut group = c.benchmark_group(format!("scanner-{:?}", sample));
    for (name, minimize) in [
        ("End", MinimizeLevel::End),
        ("Most", MinimizeLevel::Most),
        ("Every", MinimizeLevel::Every),
    ] {
        let config = BuildConfig {
            minimize,
            ..BuildConfig::default()
        };
        group.bench_function(name, |b| {
            b.iter(|| build_scanner(&def, &config).unwrap());
        });
    }
    group.finish();
}

fn bench_parser(c: &mut Criterion, sample: GrammarSample) {
    let grammar = sample.grammar().unwrap();

    let mut group = c.benchmark_group(format!("parser-{:?}", sample));
    for (name, advance, layout) in [
        ("All/Linear", AdvanceMode::All, TableLayout::Linear),
        ("All/Packed", AdvanceMode::All, TableLayout::Packed),
        ("ParseStopOnly/Linear", AdvanceMode::ParseStopOnly, TableLayout::Linear),
    ] {
        let config = BuildConfig {
            advance,
            layout,
            ..BuildConfig::default()
        };
        group.bench_function(name, |b| {
            b.iter(|| build_parser(&grammar, &config).unwrap());
        });
    }
    group.finish();
}
