//! Benchmarks for path preview and dialog (de)serialization.
//!
//! Run with: `cargo bench --bench feed`
//!
//! The longest-path search explores every simple path, so the diamond
//! ladder doubles in cost with each rung.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use dialog_graph_kernel::{
    feed, forward_map, from_persisted, longest_path, to_persisted, DialogGraph, DialogHeader,
    Handle, NodeId, NodeKind, Position,
};

/// Straight chain of dialog nodes.
fn make_chain(len: usize) -> DialogGraph {
    let mut graph = DialogGraph::new();
    let mut previous: Option<NodeId> = None;
    for i in 0..len {
        let id = graph.create_node(NodeKind::Dialog, Position::new(0.0, i as f64 * 300.0));
        if let Some(previous) = previous {
            graph.connect(&previous, &id, None).unwrap();
        }
        previous = Some(id);
    }
    graph
}

/// Choice nodes whose two choices both lead to the next rung through a
/// dialog node each.
fn make_ladder(rungs: usize) -> DialogGraph {
    let mut graph = DialogGraph::new();
    let mut ask = graph.create_node(NodeKind::Choice, Position::default());
    for i in 0..rungs {
        let y = (i + 1) as f64 * 600.0;
        let next = graph.create_node(NodeKind::Choice, Position::new(0.0, y));
        for x in [-400.0, 400.0] {
            let choice = graph.add_choice(&ask, "go").unwrap();
            let line = graph.create_node(NodeKind::Dialog, Position::new(x, y - 300.0));
            graph
                .connect(&ask, &line, Some(Handle::choice(choice).to_string()))
                .unwrap();
            graph.connect(&line, &next, None).unwrap();
        }
        ask = next;
    }
    graph
}

fn header() -> DialogHeader {
    DialogHeader {
        id: "bench".to_string(),
        name: "Bench".to_string(),
        characters_ids: vec![],
        created_at: chrono::Utc::now(),
        main_character: None,
    }
}

fn bench_feed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_chain");

    for len in [10, 100, 1000] {
        let graph = make_chain(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("nodes", len), &graph, |b, graph| {
            b.iter(|| {
                let fed = feed(black_box(graph));
                assert_eq!(fed.len(), len);
                fed.len()
            })
        });
    }

    group.finish();
}

fn bench_longest_path_ladder(c: &mut Criterion) {
    let mut group = c.benchmark_group("longest_path_ladder");
    group.sample_size(20);

    for rungs in [4, 8, 12] {
        let graph = make_ladder(rungs);
        let forward = forward_map(graph.edges());
        let Some(root) = graph.root().cloned() else {
            continue;
        };
        group.bench_with_input(BenchmarkId::new("rungs", rungs), &forward, |b, forward| {
            b.iter(|| {
                let path = longest_path(black_box(&root), forward);
                assert_eq!(path.len(), rungs * 2 + 1);
                path
            })
        });
    }

    group.finish();
}

fn bench_persisted_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("persisted");
    let header = header();

    for rungs in [10, 100] {
        let graph = make_ladder(rungs);
        let persisted = to_persisted(&graph, &header);
        group.throughput(Throughput::Elements(graph.num_nodes() as u64));

        group.bench_with_input(BenchmarkId::new("to_persisted", rungs), &graph, |b, graph| {
            b.iter(|| to_persisted(black_box(graph), &header))
        });
        group.bench_with_input(BenchmarkId::new("from_persisted", rungs), &persisted, |b, persisted| {
            b.iter(|| from_persisted(black_box(persisted)))
        });
        group.bench_with_input(BenchmarkId::new("json", rungs), &persisted, |b, persisted| {
            b.iter(|| serde_json::to_vec(black_box(persisted)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_feed_chain,
    bench_longest_path_ladder,
    bench_persisted_round_trip,
);

criterion_main!(benches);
