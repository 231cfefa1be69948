//! In-place genome mutation.
//!
//! Operators run in a fixed order, each gated by its own probability from
//! [`MutationSettings`]. Structural removals go through the public `remove_*`
//! functions, which keep every index reference exact: after any removal all
//! ids are dense and every link, motor and modulation reference resolves.

use evolab_core::{EvolabConfig, GenomeLimits, MutationSettings, RandomSource, clamp01};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::{BodyLink, BodyNode, Genome, Motor, Sensor, clamp_to, ranges, sample};

/// Per-gene sampling rate for point mutations.
const POINT_SAMPLE_RATE: f32 = 0.1;
/// Attempts to find an unlinked node pair before giving up.
const ADD_LINK_ATTEMPTS: usize = 10;
const SOCIAL_STEP: f32 = 0.1;
const TERRITORY_TOGGLE_CHANCE: f32 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Point,
    AddNode,
    RemoveNode,
    AddLink,
    RemoveLink,
    AddMotor,
    RemoveMotor,
    AddSensor,
    RemoveSensor,
    Social,
}

/// Operators that fired during one [`mutate_genome`] call, in order.
pub type MutationLog = SmallVec<[MutationKind; 8]>;

/// Mutate `genome` in place and bump its generation.
pub fn mutate_genome(genome: &mut Genome, config: &EvolabConfig, rng: &mut dyn RngCore) -> MutationLog {
    let settings = &config.mutation;
    let limits = &config.genome;
    let mut log = MutationLog::new();

    if rng.chance(settings.point_rate) {
        point_mutation(genome, settings, rng);
        log.push(MutationKind::Point);
    }
    if rng.chance(settings.add_node) && add_node(genome, limits, rng) {
        log.push(MutationKind::AddNode);
    }
    if rng.chance(settings.remove_node) && genome.nodes.len() > limits.min_nodes.max(1) {
        let index = rng.int_between(1, genome.nodes.len() as i64 - 1) as usize;
        if remove_node(genome, index) {
            log.push(MutationKind::RemoveNode);
        }
    }
    if rng.chance(settings.add_link) && add_link(genome, limits, rng) {
        log.push(MutationKind::AddLink);
    }
    if rng.chance(settings.remove_link)
        && genome.links.len() > genome.nodes.len().saturating_sub(1)
        && let Some(index) = rng.pick_index(genome.links.len())
        && remove_link(genome, index)
    {
        log.push(MutationKind::RemoveLink);
    }
    if rng.chance(settings.add_motor) && add_motor(genome, limits, rng) {
        log.push(MutationKind::AddMotor);
    }
    if rng.chance(settings.remove_motor)
        && let Some(index) = rng.pick_index(genome.motors.len())
        && remove_motor(genome, index)
    {
        log.push(MutationKind::RemoveMotor);
    }
    if rng.chance(settings.add_sensor) && add_sensor(genome, limits, rng) {
        log.push(MutationKind::AddSensor);
    }
    if rng.chance(settings.remove_sensor)
        && let Some(index) = rng.pick_index(genome.sensors.len())
        && remove_sensor(genome, index)
    {
        log.push(MutationKind::RemoveSensor);
    }
    if rng.chance(settings.social) {
        mutate_social(genome, rng);
        log.push(MutationKind::Social);
    }

    genome.generation += 1;
    log
}

fn perturb(value: f32, strength: f32, range: std::ops::RangeInclusive<f32>, rng: &mut dyn RngCore) -> f32 {
    clamp_to(value + rng.between(-strength, strength), range)
}

/// Uniform perturbation of a sampled subset of continuous body and
/// metabolism genes.
fn point_mutation(genome: &mut Genome, settings: &MutationSettings, rng: &mut dyn RngCore) {
    let strength = settings.strength;
    for node in &mut genome.nodes {
        if rng.chance(POINT_SAMPLE_RATE) {
            node.mass = perturb(node.mass, strength, ranges::MASS, rng);
        }
    }
    for link in &mut genome.links {
        if rng.chance(POINT_SAMPLE_RATE) {
            link.stiffness = perturb(link.stiffness, strength, ranges::STIFFNESS, rng);
        }
        if rng.chance(POINT_SAMPLE_RATE) {
            link.damping = perturb(link.damping, strength, ranges::DAMPING, rng);
        }
    }
    for motor in &mut genome.motors {
        if rng.chance(POINT_SAMPLE_RATE) {
            motor.cycle_speed = perturb(motor.cycle_speed, strength, ranges::CYCLE_SPEED, rng);
        }
        if rng.chance(POINT_SAMPLE_RATE) {
            motor.amplitude = perturb(motor.amplitude, strength, ranges::AMPLITUDE, rng);
        }
    }
    if rng.chance(POINT_SAMPLE_RATE) {
        genome.metabolism.efficiency =
            perturb(genome.metabolism.efficiency, strength, ranges::EFFICIENCY, rng);
    }
}

/// Split a random link with a new midpoint node.
pub fn add_node(genome: &mut Genome, limits: &GenomeLimits, rng: &mut dyn RngCore) -> bool {
    if genome.nodes.len() >= limits.max_nodes || genome.links.len() >= limits.max_links {
        return false;
    }
    let Some(split) = rng.pick_index(genome.links.len()) else {
        return false;
    };
    let (near, far) = (genome.links[split].node_a, genome.links[split].node_b);
    let (Some(a), Some(b)) = (genome.nodes.get(near), genome.nodes.get(far)) else {
        return false;
    };
    let id = genome.nodes.len();
    let node = BodyNode {
        id,
        position: a.position.midpoint(b.position),
        mass: clamp_to((a.mass + b.mass) * 0.5, ranges::MASS),
        friction: clamp_to((a.friction + b.friction) * 0.5, ranges::FRICTION),
    };
    genome.nodes.push(node);

    let second_id = genome.links.len();
    let link = &mut genome.links[split];
    link.rest_length *= 0.5;
    link.node_b = id;
    let second = BodyLink {
        id: second_id,
        node_a: id,
        node_b: far,
        rest_length: link.rest_length,
        stiffness: link.stiffness,
        damping: link.damping,
    };
    genome.links.push(second);
    true
}

/// Connect a random unlinked node pair.
pub fn add_link(genome: &mut Genome, limits: &GenomeLimits, rng: &mut dyn RngCore) -> bool {
    let count = genome.nodes.len();
    if count < 2 || genome.links.len() >= limits.max_links {
        return false;
    }
    for _ in 0..ADD_LINK_ATTEMPTS {
        let a = rng.int_between(0, count as i64 - 1) as usize;
        let b = rng.int_between(0, count as i64 - 1) as usize;
        if a == b || genome.is_linked(a, b) {
            continue;
        }
        let link = BodyLink {
            id: genome.links.len(),
            node_a: a,
            node_b: b,
            rest_length: genome.nodes[a].position.distance(genome.nodes[b].position),
            stiffness: rng.between(0.3, 0.8),
            damping: rng.between(0.05, 0.2),
        };
        genome.links.push(link);
        return true;
    }
    false
}

/// Drive a random link that has no motor yet.
pub fn add_motor(genome: &mut Genome, limits: &GenomeLimits, rng: &mut dyn RngCore) -> bool {
    if genome.motors.len() >= limits.max_motors {
        return false;
    }
    let free: SmallVec<[usize; 16]> = (0..genome.links.len())
        .filter(|link| !genome.link_has_motor(*link))
        .collect();
    let Some(pick) = rng.pick_index(free.len()) else {
        return false;
    };
    let motor = Motor::random(genome.motors.len(), free[pick], rng);
    genome.motors.push(motor);
    true
}

pub fn add_sensor(genome: &mut Genome, limits: &GenomeLimits, rng: &mut dyn RngCore) -> bool {
    if genome.sensors.len() >= limits.max_sensors {
        return false;
    }
    let sensor = Sensor::random(genome.sensors.len(), rng);
    genome.sensors.push(sensor);
    true
}

/// Remove the node at `index` with every link touching it (and their motors),
/// then shift higher node references down by one.
pub fn remove_node(genome: &mut Genome, index: usize) -> bool {
    if index >= genome.nodes.len() {
        return false;
    }
    let touching: SmallVec<[usize; 8]> = genome
        .links
        .iter()
        .enumerate()
        .filter(|(_, link)| link.touches(index))
        .map(|(position, _)| position)
        .collect();
    for position in touching.into_iter().rev() {
        remove_link(genome, position);
    }

    genome.nodes.remove(index);
    for link in &mut genome.links {
        if link.node_a > index {
            link.node_a -= 1;
        }
        if link.node_b > index {
            link.node_b -= 1;
        }
    }
    genome.renumber_nodes();
    true
}

/// Remove the link at `index` and the motors driving it, then shift higher
/// motor attachments down by one.
pub fn remove_link(genome: &mut Genome, index: usize) -> bool {
    if index >= genome.links.len() {
        return false;
    }
    genome.links.remove(index);
    genome.motors.retain(|motor| motor.attached_to != index);
    for motor in &mut genome.motors {
        if motor.attached_to > index {
            motor.attached_to -= 1;
        }
    }
    genome.renumber_links();
    genome.renumber_motors();
    true
}

pub fn remove_motor(genome: &mut Genome, index: usize) -> bool {
    if index >= genome.motors.len() {
        return false;
    }
    genome.motors.remove(index);
    genome.renumber_motors();
    true
}

/// Remove the sensor at `index`, clearing modulation that pointed at it and
/// shifting higher modulation indices down by one.
pub fn remove_sensor(genome: &mut Genome, index: usize) -> bool {
    if index >= genome.sensors.len() {
        return false;
    }
    genome.sensors.remove(index);
    for motor in &mut genome.motors {
        motor.sensor_modulation = match motor.sensor_modulation {
            Some(sensor) if sensor == index => None,
            Some(sensor) if sensor > index => Some(sensor - 1),
            other => other,
        };
    }
    genome.renumber_sensors();
    true
}

fn mutate_social(genome: &mut Genome, rng: &mut dyn RngCore) {
    let cooperation = &mut genome.social.cooperation;
    cooperation.link_willingness =
        clamp01(cooperation.link_willingness + rng.between(-SOCIAL_STEP, SOCIAL_STEP));
    cooperation.resource_sharing =
        clamp01(cooperation.resource_sharing + rng.between(-SOCIAL_STEP, SOCIAL_STEP));

    let competition = &mut genome.social.competition;
    competition.aggression = clamp01(competition.aggression + rng.between(-SOCIAL_STEP, SOCIAL_STEP));
    competition.flee_threshold =
        clamp01(competition.flee_threshold + rng.between(-SOCIAL_STEP, SOCIAL_STEP));
    if rng.chance(TERRITORY_TOGGLE_CHANCE) {
        competition.territorial_radius = if competition.territorial_radius > 0.0 {
            0.0
        } else {
            sample(rng, ranges::TERRITORIAL_RADIUS)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{RandomBodyOptions, generate_random_genome};
    use crate::validate::validate_genome;
    use evolab_core::Position;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn body(nodes: usize, links: &[(usize, usize)]) -> Genome {
        let mut rng = SmallRng::seed_from_u64(0xB0D1);
        let config = EvolabConfig::default();
        let mut genome = generate_random_genome(
            RandomBodyOptions {
                node_count: Some(nodes),
                species_marker: None,
            },
            &config,
            &mut rng,
        );
        for (id, node) in genome.nodes.iter_mut().enumerate() {
            node.position = Position::new(id as f32 * 10.0, 0.0);
        }
        genome.links = links
            .iter()
            .enumerate()
            .map(|(id, (a, b))| BodyLink {
                id,
                node_a: *a,
                node_b: *b,
                rest_length: 10.0,
                stiffness: 0.5,
                damping: 0.1,
            })
            .collect();
        genome.motors.clear();
        genome.sensors.clear();
        genome
    }

    #[test]
    fn removing_a_node_renumbers_references() {
        let mut genome = body(5, &[(0, 1), (1, 2), (2, 3), (3, 4), (0, 4), (1, 3)]);
        genome.motors = (0..6)
            .map(|link| Motor {
                id: link,
                attached_to: link,
                cycle_speed: 0.1,
                amplitude: 0.3,
                phase_offset: 0.0,
                energy_cost: 0.05,
                sensor_modulation: None,
            })
            .collect();

        assert!(remove_node(&mut genome, 2));

        assert_eq!(genome.nodes.len(), 4);
        assert!(genome.nodes.iter().enumerate().all(|(i, n)| n.id == i));
        let pairs: Vec<(usize, usize)> = genome.links.iter().map(|l| (l.node_a, l.node_b)).collect();
        assert_eq!(pairs, vec![(0, 1), (2, 3), (0, 3), (1, 2)]);
        assert!(genome.links.iter().enumerate().all(|(i, l)| l.id == i));
        let attached: Vec<usize> = genome.motors.iter().map(|m| m.attached_to).collect();
        assert_eq!(attached, vec![0, 1, 2, 3]);
        assert!(genome.motors.iter().enumerate().all(|(i, m)| m.id == i));
    }

    #[test]
    fn removing_a_link_drops_its_motor() {
        let mut genome = body(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        for link in [0, 2, 3] {
            let motor = Motor {
                id: genome.motors.len(),
                attached_to: link,
                cycle_speed: 0.1,
                amplitude: 0.3,
                phase_offset: 0.0,
                energy_cost: 0.05,
                sensor_modulation: None,
            };
            genome.motors.push(motor);
        }
        assert!(remove_link(&mut genome, 2));
        let attached: Vec<usize> = genome.motors.iter().map(|m| m.attached_to).collect();
        assert_eq!(attached, vec![0, 2]);
        assert_eq!(genome.motors[1].id, 1);
        assert!(!remove_link(&mut genome, 10));
    }

    #[test]
    fn removing_a_sensor_fixes_modulation() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut genome = body(3, &[(0, 1), (1, 2), (2, 0)]);
        genome.sensors = (0..3).map(|id| Sensor::random(id, &mut rng)).collect();
        genome.motors = (0..3)
            .map(|link| Motor {
                id: link,
                attached_to: link,
                cycle_speed: 0.1,
                amplitude: 0.3,
                phase_offset: 0.0,
                energy_cost: 0.05,
                sensor_modulation: Some(link),
            })
            .collect();
        assert!(remove_sensor(&mut genome, 1));
        let modulation: Vec<Option<usize>> =
            genome.motors.iter().map(|m| m.sensor_modulation).collect();
        assert_eq!(modulation, vec![Some(0), None, Some(1)]);
        assert!(genome.sensors.iter().enumerate().all(|(i, s)| s.id == i));
    }

    #[test]
    fn add_node_splits_link() {
        let mut rng = SmallRng::seed_from_u64(6);
        let config = EvolabConfig::default();
        let mut genome = body(3, &[(0, 2)]);
        assert!(add_node(&mut genome, &config.genome, &mut rng));
        assert_eq!(genome.nodes.len(), 4);
        assert_eq!(genome.links.len(), 2);
        assert_eq!((genome.links[0].node_a, genome.links[0].node_b), (0, 3));
        assert_eq!((genome.links[1].node_a, genome.links[1].node_b), (3, 2));
        assert!((genome.links[0].rest_length - 5.0).abs() < 1e-6);
        assert_eq!(genome.links[1].stiffness, genome.links[0].stiffness);
        assert_eq!(genome.nodes[3].position, Position::new(10.0, 0.0));
    }

    #[test]
    fn structural_operators_are_noops_on_degenerate_bodies() {
        let mut rng = SmallRng::seed_from_u64(7);
        let config = EvolabConfig::default();
        let mut genome = body(3, &[]);
        assert!(!add_node(&mut genome, &config.genome, &mut rng));
        assert!(!add_motor(&mut genome, &config.genome, &mut rng));
        assert!(!remove_motor(&mut genome, 0));
        assert!(!remove_sensor(&mut genome, 0));
        assert!(!remove_node(&mut genome, 3));
    }

    #[test]
    fn mutation_bumps_generation_and_logs_in_order() {
        let mut rng = SmallRng::seed_from_u64(8);
        let mut config = EvolabConfig::default();
        config.mutation.point_rate = 1.0;
        config.mutation.social = 1.0;
        let mut genome = generate_random_genome(RandomBodyOptions::default(), &config, &mut rng);
        let before = genome.generation;
        let log = mutate_genome(&mut genome, &config, &mut rng);
        assert_eq!(genome.generation, before + 1);
        assert_eq!(log.first(), Some(&MutationKind::Point));
        assert_eq!(log.last(), Some(&MutationKind::Social));
        assert!(validate_genome(&genome, &config.genome).valid);
    }
}
