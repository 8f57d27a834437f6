use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mapper::registry::{SearchField, SiteRegistry};
use mapper::transfer::import_csv;
use shared::SiteDraft;

const CATEGORIES: [&str; 4] = ["Hub", "Relay", "Backhaul", "Depot"];
const ICONS: [&str; 5] = ["tower", "radio", "signal", "database", "map-pin"];

fn populated_registry(size: usize) -> SiteRegistry {
    let mut registry = SiteRegistry::new();
    for i in 0..size {
        let draft = SiteDraft {
            name: format!("Site {i}"),
            lat: Some(-60.0 + (i % 120) as f64),
            lng: Some(-170.0 + (i % 340) as f64),
            icon: Some(ICONS[i % ICONS.len()].to_string()),
            category: Some(CATEGORIES[i % CATEGORIES.len()].to_string()),
            notes: Some(format!("inspection batch {}", i / 50)),
            ..Default::default()
        };
        if let Err(err) = registry.add(draft) {
            panic!("bench fixture rejected: {err}");
        }
    }
    registry
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_search");

    for size in [100usize, 1_000, 10_000] {
        let registry = populated_registry(size);
        group.bench_with_input(BenchmarkId::new("all_fields", size), &registry, |b, registry| {
            b.iter(|| registry.search(black_box("batch 7"), &SearchField::ALL).len());
        });
        group.bench_with_input(BenchmarkId::new("name_only", size), &registry, |b, registry| {
            b.iter(|| registry.search(black_box("site 99"), &[SearchField::Name]).len());
        });
    }

    group.finish();
}

fn benchmark_csv_import(c: &mut Criterion) {
    let mut text = String::from("name,latitude,longitude,type,icon,notes,category\n");
    for i in 0..5_000 {
        text.push_str(&format!(
            "Site {i},{},{},tower,tower,imported,Hub\n",
            -60.0 + (i % 120) as f64,
            -170.0 + (i % 340) as f64
        ));
    }

    c.bench_function("csv_import_5000_rows", |b| {
        b.iter(|| import_csv(black_box(&text)).sites.len());
    });
}

criterion_group!(benches, benchmark_search, benchmark_csv_import);
criterion_main!(benches);
