use std::time::Duration;

use chunklock_grouping::{group_items, GroupingOptions, SizeMap};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Parameters controlling the synthetic workload shape.
///
/// The generator is intentionally simple but aims to resemble a real
/// application: path-like keys with a content-hash suffix, most items
/// contributing JavaScript bytes, a fraction contributing CSS, and a few
/// contributing both (entangled sizes).
#[derive(Debug, Clone, Copy)]
struct WorkloadConfig {
  num_items: usize,
  /// Fraction of items that carry a css size (0.0 - 1.0).
  css_ratio: f64,
  /// Fraction of css items that also carry a javascript size (0.0 - 1.0).
  entangled_ratio: f64,
  seed: u64,
}

fn kind_for(index: usize) -> &'static str {
  match index % 5 {
    0 => "app",
    1 => "routes",
    2 => "components",
    3 => "shared",
    _ => "vendor",
  }
}

fn generate_items(config: WorkloadConfig) -> Vec<(String, SizeMap)> {
  let mut rng = StdRng::seed_from_u64(config.seed);

  (0..config.num_items)
    .map(|index| {
      let hash: u64 = rng.gen();
      let key = format!("{}/module-{index:05}-{hash:016x}.js", kind_for(index));

      let mut size = SizeMap::new();
      if rng.gen_bool(config.css_ratio) {
        size.insert("css", rng.gen_range(64.0..4096.0).round());
        if rng.gen_bool(config.entangled_ratio) {
          size.insert("javascript", rng.gen_range(64.0..8192.0).round());
        }
      } else {
        size.insert("javascript", rng.gen_range(64.0..16384.0).round());
      }
      (key, size)
    })
    .collect()
}

fn grouping_options() -> GroupingOptions {
  GroupingOptions {
    min_size: [("css", 8_192.0), ("javascript", 20_480.0)]
      .into_iter()
      .collect(),
    max_size: [("css", 51_200.0), ("javascript", 122_880.0)]
      .into_iter()
      .collect(),
    collect_debug: false,
  }
}

fn bench_grouping(c: &mut Criterion) {
  let mut group = c.benchmark_group("deterministic_grouping");
  group.measurement_time(Duration::from_secs(10));

  for num_items in [100, 1_000, 10_000] {
    let items = generate_items(WorkloadConfig {
      num_items,
      css_ratio: 0.2,
      entangled_ratio: 0.25,
      seed: 0x5eed,
    });
    let options = grouping_options();

    group.bench_with_input(
      BenchmarkId::from_parameter(num_items),
      &items,
      |b, items| {
        b.iter(|| {
          group_items(
            black_box(items.clone()),
            &options,
            |item| item.0.clone(),
            |item| item.1.clone(),
          )
          .unwrap()
        })
      },
    );
  }

  group.finish();
}

criterion_group!(benches, bench_grouping);
criterion_main!(benches);
