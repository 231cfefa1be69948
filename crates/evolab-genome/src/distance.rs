//! Genetic distance and the species test.
//!
//! [`genetic_distance`] is a coarse phenotypic proxy: body part counts, diet,
//! and a handful of behavioural traits with fixed weights, scaled by 1/10 so
//! typical values land in `[0, 1]`. It is not a marker-based genetic distance,
//! and the weights are part of the contract that species clustering relies on.

use crate::model::Genome;
use crate::traits::{GeneticTrait, trait_value};

pub const NODE_WEIGHT: f32 = 0.5;
pub const LINK_WEIGHT: f32 = 0.3;
pub const MOTOR_WEIGHT: f32 = 0.4;
pub const SENSOR_WEIGHT: f32 = 0.4;
pub const DIET_PENALTY: f32 = 1.0;
pub const EFFICIENCY_WEIGHT: f32 = 1.0;
pub const COOPERATION_WEIGHT: f32 = 0.5;
pub const AGGRESSION_WEIGHT: f32 = 0.5;
pub const NORMALIZATION: f32 = 10.0;

fn count_diff(a: usize, b: usize) -> f32 {
    a.abs_diff(b) as f32
}

/// Weighted phenotypic distance between two genomes. Symmetric, and zero for
/// identical genomes.
#[must_use]
pub fn genetic_distance(a: &Genome, b: &Genome) -> f32 {
    let mut distance = NODE_WEIGHT * count_diff(a.nodes.len(), b.nodes.len())
        + LINK_WEIGHT * count_diff(a.links.len(), b.links.len())
        + MOTOR_WEIGHT * count_diff(a.motors.len(), b.motors.len())
        + SENSOR_WEIGHT * count_diff(a.sensors.len(), b.sensors.len());

    if a.metabolism.primary_food != b.metabolism.primary_food {
        distance += DIET_PENALTY;
    }
    distance += EFFICIENCY_WEIGHT * (a.metabolism.efficiency - b.metabolism.efficiency).abs();
    distance += COOPERATION_WEIGHT
        * (a.social.cooperation.link_willingness - b.social.cooperation.link_willingness).abs();
    distance += AGGRESSION_WEIGHT
        * (a.social.competition.aggression - b.social.competition.aggression).abs();

    distance / NORMALIZATION
}

/// Whether `a` and `b` fall within `threshold` of each other.
#[must_use]
pub fn is_same_species(a: &Genome, b: &Genome, threshold: f32) -> bool {
    genetic_distance(a, b) < threshold
}

const NEUTRAL_TRAITS: [GeneticTrait; 4] = [
    GeneticTrait::Fleeing,
    GeneticTrait::StorageCapacity,
    GeneticTrait::Resistance,
    GeneticTrait::SignalEmission,
];

fn neutral_vector(genome: &Genome) -> [f32; 9] {
    let social = &genome.social;
    let mut values = [
        social.cooperation.link_strength,
        social.cooperation.signal_response,
        social.competition.resource_greed,
        social.symbiosis.attachment_strength,
        social.communication.signal_frequency,
        0.0,
        0.0,
        0.0,
        0.0,
    ];
    for (slot, which) in NEUTRAL_TRAITS.into_iter().enumerate() {
        values[5 + slot] = trait_value(genome, which).unwrap_or(0.0);
    }
    values
}

/// Mean absolute difference over traits with little direct fitness effect,
/// each normalized to `[0, 1]`. Used as the heterozygosity proxy.
#[must_use]
pub fn neutral_distance(a: &Genome, b: &Genome) -> f32 {
    let va = neutral_vector(a);
    let vb = neutral_vector(b);
    let total: f32 = va
        .iter()
        .zip(vb.iter())
        .map(|(x, y)| (x.clamp(0.0, 1.0) - y.clamp(0.0, 1.0)).abs())
        .sum();
    total / va.len() as f32
}
