//! Cost of one convergence tick for trace and tree criteria

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use autostop::domain::models::{CriterionConfig, GelmanRubinConfig, TreePsrfConfig};
use autostop::{BurnInStrategy, ConvergenceSession, PhyloTree, RobinsonFoulds, SessionConfig, TaxonMap};

const TOPOLOGIES: [&str; 3] = ["((1,2),(3,4));", "((1,3),(2,4));", "((1,4),(2,3));"];

fn filled_session(config: &SessionConfig, samples: usize) -> ConvergenceSession<PhyloTree> {
    let taxa = TaxonMap::new();
    let trees: Vec<PhyloTree> = TOPOLOGIES
        .iter()
        .map(|newick| PhyloTree::parse(newick, &taxa).expect("valid newick"))
        .collect();
    let normal = Normal::new(-100.0, 1.0).expect("valid distribution");
    let mut session =
        ConvergenceSession::new(2, config, RobinsonFoulds).expect("valid session config");
    for chain in 0..2 {
        let mut rng = StdRng::seed_from_u64(chain as u64);
        for i in 0..samples {
            let value = normal.sample(&mut rng);
            session
                .ingest_scalar_row(chain, &[i as f64, value, value + 1.0, -1.0])
                .expect("row width matches");
            session
                .ingest_tree(chain, trees[(i * 7 + chain) % trees.len()].clone())
                .expect("chain in range");
        }
    }
    session
}

fn trace_config() -> SessionConfig {
    SessionConfig {
        burn_in: BurnInStrategy::FixedFraction { percent: 10 },
        criteria: vec![CriterionConfig::GelmanRubin(GelmanRubinConfig::default())],
        ..SessionConfig::default()
    }
}

fn bench_trace_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_tick");
    let config = trace_config();
    for samples in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(samples), &samples, |b, &samples| {
            b.iter_batched(
                || filled_session(&config, samples),
                |mut session| black_box(session.tick(samples).expect("watermark available")),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_tree_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_tick");
    let config = SessionConfig {
        criteria: vec![CriterionConfig::TreePsrf(TreePsrfConfig::default())],
        ..trace_config()
    };
    for samples in [200usize, 1_000] {
        let mut session = filled_session(&config, samples);
        // warm the distance cache with the previous watermark
        session.tick(samples - 1).expect("watermark available");
        group.bench_with_input(BenchmarkId::from_parameter(samples), &samples, |b, &samples| {
            b.iter(|| black_box(session.tick(samples).expect("watermark available")));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_trace_tick, bench_tree_tick);
criterion_main!(benches);
