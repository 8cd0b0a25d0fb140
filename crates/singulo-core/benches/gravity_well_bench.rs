use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec2;
use singulo_core::entity::{
    CollisionLayer, EntityComponents, EntityTag, Grid, PhysicsBody, RandomWalk, Tile,
    TransformState,
};
use singulo_core::systems::{GravityWellEngine, SingularityEngine};
use singulo_core::Simulation;

/// A level 6 singularity surrounded by a ring of debris, already scanned.
fn debris_field(count: u32) -> Simulation {
    let mut sim = Simulation::with_seed(7);
    let config = sim.config().clone();
    let hungry = sim.spawn(
        EntityTag::Singularity,
        TransformState::at(Vec2::ZERO),
        EntityComponents::default()
            .with_event_horizon(config.event_horizon(0.5))
            .with_gravity_well(config.gravity_well(4.0, 10.0, 0.0))
            .with_singularity(config.singularity(0.0))
            .with_body(PhysicsBody::dynamic(10.0, 0.5).with_collision(
                CollisionLayer::SINGULARITY,
                CollisionLayer::ITEM | CollisionLayer::WALL,
            ))
            .with_random_walk(RandomWalk::default()),
    );
    SingularityEngine::set_energy(&mut sim, hungry, 2000.0);

    for i in 0..count {
        let angle = i as f32 * 0.37;
        let radius = 7.0 + (i % 6) as f32;
        sim.spawn(
            EntityTag::Item,
            TransformState::at(Vec2::from_angle(angle) * radius),
            EntityComponents::default().with_body(PhysicsBody::dynamic(1.0, 0.25)),
        );
    }
    GravityWellEngine::scan(&mut sim, hungry);
    sim
}

fn bench_update_before_solve(c: &mut Criterion) {
    let mut sim = debris_field(500);

    c.bench_function("update_before_solve_500", |b| {
        b.iter(|| {
            GravityWellEngine::update_before_solve(black_box(&mut sim));
        })
    });
}

fn bench_grav_pulse(c: &mut Criterion) {
    let mut sim = debris_field(500);

    c.bench_function("grav_pulse_500", |b| {
        b.iter(|| {
            black_box(GravityWellEngine::grav_pulse_radial(
                &mut sim,
                Vec2::ZERO,
                14.0,
                0.0,
                black_box(5.0),
                0.0,
            ))
        })
    });
}

fn bench_step_with_tiles(c: &mut Criterion) {
    // Fresh world per batch so the singularity always has tiles to eat
    c.bench_function("step_with_tiles", |b| {
        b.iter_batched(
            || {
                let mut sim = debris_field(100);
                sim.spawn(
                    EntityTag::Grid,
                    TransformState::at(Vec2::new(-16.0, -16.0)),
                    EntityComponents::default().with_grid(Grid::filled(32, 32, Tile::PLATING)),
                );
                sim
            },
            |mut sim: Simulation| {
                sim.step();
                black_box(sim.arena().len())
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_update_before_solve, bench_grav_pulse, bench_step_with_tiles);
criterion_main!(benches);
