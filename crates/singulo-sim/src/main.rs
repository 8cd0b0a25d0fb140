//! Headless singularity scenario runner.
//!
//! Builds a plated station grid with a fresh singularity, a ring of debris,
//! some food and a pair of field generators, runs it for a number of ticks
//! and prints a JSON summary.
//!
//! ```text
//! singulo-sim [--config <path>] [--ticks <n>] [--seed <n>] [--save <path>]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;
use serde::Serialize;
use singulo_core::audit::LogImpact;
use singulo_core::entity::{
    CollisionLayer, ContainmentFieldGenerator, EntityComponents, EntityTag, Grid, Markers,
    PhysicsBody, RandomWalk, Tile, TransformState,
};
use singulo_core::systems::ContainmentFieldEngine;
use singulo_core::{EntityId, SimConfig, Simulation};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICKS: u64 = 600;
const GRID_HALF_EXTENT: i32 = 16;
const DEBRIS_COUNT: u16 = 24;
const STARTING_ENERGY: f32 = 100.0;

/// Runs a scripted singularity scenario and prints a JSON summary.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config to load instead of the defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Ticks to run.
    #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_TICKS)]
    ticks: u64,
    /// Overrides the config seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Writes the final world as JSON.
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Summary {
    seed: u64,
    tick: u64,
    seconds: f32,
    entities: usize,
    singularity: Option<SingularitySummary>,
    audit_entries: usize,
    high_impact_audits: usize,
    audio_cues: usize,
}

#[derive(Debug, Serialize)]
struct SingularitySummary {
    id: EntityId,
    energy: f32,
    level: u8,
    horizon_radius: f32,
    position: [f32; 2],
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let ticks = args.ticks;

    let mut sim = Simulation::new(config);
    let singularity = build_scenario(&mut sim);
    info!(seed = sim.config().seed, ticks, "scenario ready");

    let mut cues = 0;
    for _ in 0..ticks {
        sim.step();
        cues += sim.take_audio_cues().len();
        if !sim.arena().contains(singularity) {
            warn!(tick = sim.tick(), "singularity is gone, stopping early");
            break;
        }
    }

    let summary = summarize(&sim, singularity, cues);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = args.save {
        let json = serde_json::to_string(sim.arena())?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "saved world");
    }
    Ok(())
}

fn build_scenario(sim: &mut Simulation) -> EntityId {
    let config = sim.config().clone();
    let side = GRID_HALF_EXTENT * 2;
    #[allow(clippy::cast_precision_loss)]
    let origin = Vec2::splat(-(GRID_HALF_EXTENT as f32));
    let grid = sim.spawn(
        EntityTag::Grid,
        TransformState::at(origin),
        EntityComponents::default().with_grid(Grid::filled(side, side, Tile::PLATING)),
    );

    let singularity = sim.spawn(
        EntityTag::Singularity,
        TransformState::at(Vec2::ZERO),
        EntityComponents::default()
            .with_event_horizon(config.event_horizon(0.5))
            .with_gravity_well(config.gravity_well(4.0, 10.0, 0.0))
            .with_singularity(config.singularity(STARTING_ENERGY))
            .with_body(PhysicsBody::dynamic(10.0, 0.5).with_collision(
                CollisionLayer::SINGULARITY,
                CollisionLayer::ITEM
                    | CollisionLayer::MOB
                    | CollisionLayer::WALL
                    | CollisionLayer::FIELD,
            ))
            .with_random_walk(RandomWalk::default())
            .with_distortion()
            .with_radiation(),
    );

    for i in 0..DEBRIS_COUNT {
        let angle = f32::from(i) * 0.61;
        let radius = 3.0 + f32::from(i % 8);
        sim.spawn(
            EntityTag::Item,
            TransformState::at(Vec2::from_angle(angle) * radius),
            EntityComponents::default().with_body(
                PhysicsBody::dynamic(1.0, 0.25)
                    .with_collision(CollisionLayer::ITEM, CollisionLayer::WALL),
            ),
        );
    }

    sim.spawn(
        EntityTag::Item,
        TransformState::at(Vec2::new(-5.0, 3.0)),
        EntityComponents::default()
            .with_body(PhysicsBody::dynamic(1.0, 0.25))
            .with_food(50.0),
    );

    let west = spawn_generator(sim, grid, Vec2::new(-12.0, -12.0));
    spawn_generator(sim, grid, Vec2::new(-6.0, -12.0));
    sim.spawn_marked(
        EntityTag::Item,
        Markers::EMITTER_BOLT,
        TransformState::at(Vec2::new(-12.4, -12.0)),
        EntityComponents::default().with_body(
            PhysicsBody::dynamic(0.1, 0.1)
                .with_collision(CollisionLayer::BOLT, CollisionLayer::WALL),
        ),
    );
    ContainmentFieldEngine::receive_power(sim, west, 3);

    singularity
}

fn spawn_generator(sim: &mut Simulation, grid: EntityId, pos: Vec2) -> EntityId {
    sim.spawn(
        EntityTag::FieldGenerator,
        TransformState::at(pos).anchored_to(grid),
        EntityComponents::default()
            .with_body(PhysicsBody::fixed(0.45).with_collision(
                CollisionLayer::WALL,
                CollisionLayer::ITEM
                    | CollisionLayer::MOB
                    | CollisionLayer::SINGULARITY
                    | CollisionLayer::BOLT,
            ))
            .with_generator(ContainmentFieldGenerator::default()),
    )
}

fn summarize(sim: &Simulation, singularity: EntityId, audio_cues: usize) -> Summary {
    let singularity = sim.arena().get(singularity).and_then(|entity| {
        let state = entity.components.singularity.as_ref()?;
        let position = sim.arena().world_position(entity.id())?;
        Some(SingularitySummary {
            id: entity.id(),
            energy: state.energy,
            level: state.level,
            horizon_radius: entity
                .components
                .event_horizon
                .as_ref()
                .map_or(0.0, |h| h.radius),
            position: position.to_array(),
        })
    });

    Summary {
        seed: sim.config().seed,
        tick: sim.tick(),
        seconds: sim.time().as_secs_f32(),
        entities: sim.arena().len(),
        singularity,
        audit_entries: sim.audit().len(),
        high_impact_audits: sim.audit().at_least(LogImpact::High).count(),
        audio_cues,
    }
}
