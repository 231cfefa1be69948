//! Genome construction.

use evolab_core::{EvolabConfig, Position, RandomSource, SpeciesMarker};
use rand::RngCore;

use crate::model::{
    BodyLink, BodyNode, Genome, GenomeId, HgtGenes, Metabolism, Motor, Sensor, SocialGenes,
    ViralGenes,
};

/// Highest marker handed to a founder drawn without an explicit marker.
const FOUNDER_MARKER_CEILING: i64 = 1_000;
/// Chance that a random body wires one motor to one sensor.
const MODULATION_CHANCE: f32 = 0.3;
/// Radial jitter applied to ring placement.
const RING_NOISE: f32 = 2.0;

/// Explicit genome fields. Anything left `None` is randomized by
/// [`create_genome`]; body arrays default to empty.
#[derive(Debug, Clone, Default)]
pub struct GenomeOptions {
    pub id: Option<GenomeId>,
    pub lineage: Option<u64>,
    pub parents: [Option<GenomeId>; 2],
    pub species_marker: Option<SpeciesMarker>,
    pub generation: u32,
    pub nodes: Vec<BodyNode>,
    pub links: Vec<BodyLink>,
    pub motors: Vec<Motor>,
    pub sensors: Vec<Sensor>,
    pub metabolism: Option<Metabolism>,
    pub social: Option<SocialGenes>,
    pub hgt: Option<HgtGenes>,
    pub viral: Option<ViralGenes>,
}

fn random_marker(rng: &mut dyn RngCore) -> SpeciesMarker {
    SpeciesMarker(rng.int_between(1, FOUNDER_MARKER_CEILING) as u32)
}

/// Build a genome from `options`, filling missing sub-records with fresh
/// random defaults. A genome without an explicit lineage founds its own.
pub fn create_genome(options: GenomeOptions, config: &EvolabConfig, rng: &mut dyn RngCore) -> Genome {
    let id = match options.id {
        Some(id) => id,
        None => GenomeId::random(rng),
    };
    let species_marker = match options.species_marker {
        Some(marker) if marker.is_assigned() => marker,
        _ => random_marker(rng),
    };
    let metabolism = options
        .metabolism
        .unwrap_or_else(|| Metabolism::random(rng));
    let social = options.social.unwrap_or_else(|| SocialGenes::random(rng));
    let hgt = options.hgt.unwrap_or_else(|| HgtGenes::random(rng));
    let viral = options
        .viral
        .unwrap_or_else(|| ViralGenes::random(&config.viral, rng));

    Genome {
        id,
        lineage: options.lineage.unwrap_or(id.0),
        parents: options.parents,
        species_marker,
        generation: options.generation,
        nodes: options.nodes,
        links: options.links,
        motors: options.motors,
        sensors: options.sensors,
        metabolism,
        social,
        hgt,
        viral,
    }
}

/// Knobs for [`generate_random_genome`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBodyOptions {
    /// Node count, clamped to the configured bounds. Random when `None`.
    pub node_count: Option<usize>,
    pub species_marker: Option<SpeciesMarker>,
}

fn random_link(id: usize, nodes: &[BodyNode], a: usize, b: usize, rng: &mut dyn RngCore) -> BodyLink {
    BodyLink {
        id,
        node_a: a,
        node_b: b,
        rest_length: nodes[a].position.distance(nodes[b].position),
        stiffness: rng.between(0.3, 0.8),
        damping: rng.between(0.05, 0.2),
    }
}

/// Random founder: a noisy ring of nodes braced by cross links, with motors,
/// sensors and optional motor modulation.
pub fn generate_random_genome(
    options: RandomBodyOptions,
    config: &EvolabConfig,
    rng: &mut dyn RngCore,
) -> Genome {
    let limits = &config.genome;
    let count = match options.node_count {
        Some(count) => count,
        None => rng.int_between(limits.min_nodes as i64, limits.initial_max_nodes as i64) as usize,
    }
    .clamp(limits.min_nodes, limits.max_nodes);

    let radius = 10.0 + 2.0 * count as f32;
    let nodes: Vec<BodyNode> = (0..count)
        .map(|id| {
            let angle = std::f32::consts::TAU * id as f32 / count as f32;
            let r = radius + rng.between(-RING_NOISE, RING_NOISE);
            BodyNode {
                id,
                position: Position::new(angle.cos() * r, angle.sin() * r),
                mass: rng.between(0.8, 2.0),
                friction: rng.between(0.2, 0.8),
            }
        })
        .collect();

    let mut genome = create_genome(
        GenomeOptions {
            species_marker: options.species_marker,
            nodes,
            ..GenomeOptions::default()
        },
        config,
        rng,
    );

    for a in 0..count {
        let b = (a + 1) % count;
        if a == b || genome.is_linked(a, b) || genome.links.len() >= limits.max_links {
            continue;
        }
        let link = random_link(genome.links.len(), &genome.nodes, a, b, rng);
        genome.links.push(link);
    }

    let braces = count / 2;
    let mut added = 0;
    let mut attempts = 0;
    while added < braces && attempts < braces * 10 && genome.links.len() < limits.max_links {
        attempts += 1;
        let a = rng.int_between(0, count as i64 - 1) as usize;
        let b = rng.int_between(0, count as i64 - 1) as usize;
        if a == b || genome.is_linked(a, b) {
            continue;
        }
        let link = random_link(genome.links.len(), &genome.nodes, a, b, rng);
        genome.links.push(link);
        added += 1;
    }

    for link in 0..genome.links.len() {
        if genome.motors.len() >= limits.max_motors {
            break;
        }
        if rng.chance(limits.motor_chance) {
            let motor = Motor::random(genome.motors.len(), link, rng);
            genome.motors.push(motor);
        }
    }

    let sensors = rng
        .int_between(0, limits.initial_max_sensors as i64)
        .clamp(0, limits.max_sensors as i64) as usize;
    for id in 0..sensors {
        genome.sensors.push(Sensor::random(id, rng));
    }

    if !genome.motors.is_empty() && !genome.sensors.is_empty() && rng.chance(MODULATION_CHANCE) {
        let sensor_count = genome.sensors.len();
        if let Some(motor) = rng.pick_index(genome.motors.len()) {
            genome.motors[motor].sensor_modulation = rng.pick_index(sensor_count);
        }
    }

    genome
}

/// Deep copy. Genomes own all of their data, so the clone shares nothing with
/// the source and can be mutated independently.
#[must_use]
pub fn clone_genome(genome: &Genome) -> Genome {
    genome.clone()
}
