use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use restock_catalog::{NewProduct, Product};
use restock_reconcile::{
    aggregate_lines, BatchLedger, CatalogIndex, IdentityResolver, RawLineItem, ReconcileConfig,
    ReconciliationEngine,
};

const FAMILIES: [&str; 8] = [
    "Tornillo", "Tuerca", "Rondana", "Taquete", "Broca", "Lija", "Cinta", "Pintura",
];

fn catalog(size: usize) -> Vec<Product> {
    (0..size)
        .map(|i| {
            Product::create(NewProduct {
                name: format!("{} modelo {} serie {}", FAMILIES[i % FAMILIES.len()], i, i % 97),
                sku: (i % 3 != 0).then(|| format!("SKU-{i:06}")),
                upc: (i % 5 == 0).then(|| format!("750{i:09}")),
                cost: 1.0 + (i % 300) as f64,
                selling_price: if i % 2 == 0 { 2.0 } else { 0.0 },
                stock: 10.0,
                ..NewProduct::default()
            })
            .unwrap()
        })
        .collect()
}

/// A supplier document mixing SKU hits, name-only lines and unknown products.
fn document(lines: usize) -> Vec<RawLineItem> {
    (0..lines)
        .map(|i| match i % 4 {
            0 => RawLineItem::new(i + 1, Some(&format!("SKU-{:06}", i * 7 + 1)), "x", 2.0, 3.0, 3.48),
            1 => RawLineItem::new(
                i + 1,
                None,
                &format!("{} modelo {} serie {}", FAMILIES[(i * 3) % 8], i * 3, (i * 3) % 97),
                1.0,
                5.0,
                5.8,
            ),
            2 => RawLineItem::new(i + 1, None, &format!("Articulo nuevo {i}"), 1.0, 9.0, 10.44),
            _ => RawLineItem::new(i + 1, Some(&format!("NEW-{i}")), &format!("Tornilo modelo {i}"), 4.0, 1.0, 1.16),
        })
        .collect()
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_index_build");
    for size in [1_000usize, 20_000] {
        let products = catalog(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &products, |b, products| {
            b.iter(|| CatalogIndex::build(black_box(products.clone())));
        });
    }
    group.finish();
}

fn bench_resolve_line(c: &mut Criterion) {
    let config = ReconcileConfig::default();
    let index = CatalogIndex::build(catalog(20_000));
    let resolver = IdentityResolver::new(&config);
    let lines = aggregate_lines(&document(4)).lines;

    let mut group = c.benchmark_group("resolve_line_20k");
    for (label, line) in ["sku", "exact_name", "unknown", "fuzzy_miss"].iter().zip(&lines) {
        group.bench_function(*label, |b| {
            b.iter(|| resolver.find_match(&index, black_box(line)));
        });
    }
    group.finish();
}

fn bench_reconcile_document(c: &mut Criterion) {
    let config = ReconcileConfig::default();
    let products = catalog(20_000);
    let raw = document(40);

    let mut group = c.benchmark_group("reconcile_document_20k");
    group.sample_size(10);
    group.throughput(Throughput::Elements(raw.len() as u64));
    group.bench_function("plan_40_lines", |b| {
        b.iter(|| {
            let mut index = CatalogIndex::build(products.clone());
            let report = aggregate_lines(black_box(&raw));
            let ledger = BatchLedger::open("bench.xml", Utc::now()).unwrap();
            ReconciliationEngine::new(&config).plan(
                &mut index,
                ledger,
                report.lines,
                report.rejected,
                Utc::now(),
            )
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_index_build,
    bench_resolve_line,
    bench_reconcile_document
);
criterion_main!(benches);
