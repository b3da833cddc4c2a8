use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value as Json};

use joueur::chess;
use joueur::core::{DeltaPatch, GameObjectGraph};

fn initial_state(players: usize) -> Json {
    let mut objects = serde_json::Map::new();
    for i in 0..players {
        let id = i.to_string();
        objects.insert(
            id.clone(),
            json!({
                "id": id,
                "gameObjectName": "Player",
                "name": format!("player {i}"),
                "color": if i % 2 == 0 { "white" } else { "black" },
                "opponent": {"id": ((i + 1) % players).to_string()},
                "logs": [],
            }),
        );
    }
    json!({
        "fen": "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "history": [],
        "players": (0..players).map(|i| json!({"id": i.to_string()})).collect::<Vec<_>>(),
        "gameObjects": objects,
    })
}

fn move_delta(ply: usize) -> Json {
    json!({
        "fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
        "history": {"&LEN": ply + 1, (ply.to_string()): "e2e4"},
        "gameObjects": {
            "0": {"timeRemaining": 8.5e11, "logs": {"&LEN": 1, "0": "thinking"}},
        },
    })
}

fn bench_initial_delta(c: &mut Criterion) {
    let delta = initial_state(64);

    c.bench_function("apply_initial_delta_64_objects", |b| {
        b.iter(|| {
            let mut graph = GameObjectGraph::new(chess::registry());
            graph.apply_delta(black_box(&delta)).unwrap();
            graph
        })
    });
}

fn bench_move_delta(c: &mut Criterion) {
    let mut graph = GameObjectGraph::new(chess::registry());
    graph.apply_delta(&initial_state(2)).unwrap();
    let delta = move_delta(0);

    c.bench_function("apply_move_delta", |b| {
        b.iter(|| {
            graph.apply_delta(black_box(&delta)).unwrap();
        })
    });
}

fn bench_parse_only(c: &mut Criterion) {
    let graph = GameObjectGraph::new(chess::registry());
    let delta = initial_state(64);

    c.bench_function("parse_initial_delta_64_objects", |b| {
        b.iter(|| DeltaPatch::parse(black_box(&delta), graph.constants()).unwrap())
    });
}

criterion_group!(benches, bench_initial_delta, bench_move_delta, bench_parse_only);
criterion_main!(benches);
