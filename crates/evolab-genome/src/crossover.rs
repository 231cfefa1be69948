//! Sexual recombination.
//!
//! The body graph comes wholesale from one randomly chosen primary parent:
//! mixing nodes from two unrelated graphs rarely yields a valid topology.
//! Motors and sensors are drawn from both parents and filtered so every
//! reference in the child resolves against the primary parent's links.

use evolab_core::{EvolabConfig, RandomSource, ViralSettings};
use rand::RngCore;

use crate::model::{
    CompetitionGenes, CooperationGenes, Genome, GenomeId, HgtGenes, Metabolism, Motor, ReceptorSet,
    Sensor, SocialGenes, ViralGenes,
};

fn mean(a: f32, b: f32) -> f32 {
    (a + b) * 0.5
}

fn either<'a, T>(a: &'a T, b: &'a T, rng: &mut dyn RngCore) -> &'a T {
    if rng.chance(0.5) { a } else { b }
}

/// Recombine two parents into a new child genome. Plasmids are not inherited
/// here; horizontal transfer handles them.
pub fn crossover(a: &Genome, b: &Genome, config: &EvolabConfig, rng: &mut dyn RngCore) -> Genome {
    let primary = either(a, b, rng);
    let species_marker = either(a, b, rng).species_marker;

    let parents = [a, b];
    let mut sensors: Vec<Sensor> = Vec::new();
    let mut sensor_maps: [Vec<Option<usize>>; 2] =
        [vec![None; a.sensors.len()], vec![None; b.sensors.len()]];
    for (which, parent) in parents.iter().enumerate() {
        for (index, sensor) in parent.sensors.iter().enumerate() {
            if sensors.len() >= config.genome.max_sensors {
                break;
            }
            if rng.chance(0.5) {
                sensor_maps[which][index] = Some(sensors.len());
                sensors.push(Sensor {
                    id: sensors.len(),
                    ..sensor.clone()
                });
            }
        }
    }

    let links = primary.links.len();
    let mut motors: Vec<Motor> = Vec::new();
    for (which, parent) in parents.iter().enumerate() {
        for motor in &parent.motors {
            if !rng.chance(0.5) || motors.len() >= config.genome.max_motors {
                continue;
            }
            if motor.attached_to >= links || motors.iter().any(|m| m.attached_to == motor.attached_to)
            {
                continue;
            }
            let sensor_modulation = motor
                .sensor_modulation
                .and_then(|sensor| sensor_maps[which].get(sensor).copied().flatten());
            motors.push(Motor {
                id: motors.len(),
                sensor_modulation,
                ..motor.clone()
            });
        }
    }

    let metabolism = Metabolism {
        efficiency: mean(a.metabolism.efficiency, b.metabolism.efficiency),
        ..either(&a.metabolism, &b.metabolism, rng).clone()
    };

    let social = blend_social(&a.social, &b.social, rng);
    let hgt = blend_hgt(&a.hgt, &b.hgt, rng);

    let mut receptors = ReceptorSet::new();
    for receptor in a.viral.receptors.iter().chain(b.viral.receptors.iter()) {
        if receptors.len() >= config.viral.max_receptors {
            break;
        }
        if !receptors.contains(receptor) {
            receptors.push(*receptor);
        }
    }
    let viral = ViralGenes {
        receptors,
        resistance: mean(a.viral.resistance, b.viral.resistance),
        crispr_memory: inherit_crispr(&a.viral.crispr_memory, &b.viral.crispr_memory, &config.viral, rng),
    };

    Genome {
        id: GenomeId::random(rng),
        lineage: primary.lineage,
        parents: [Some(a.id), Some(b.id)],
        species_marker,
        generation: a.generation.max(b.generation) + 1,
        nodes: primary.nodes.clone(),
        links: primary.links.clone(),
        motors,
        sensors,
        metabolism,
        social,
        hgt,
        viral,
    }
}

fn blend_social(a: &SocialGenes, b: &SocialGenes, rng: &mut dyn RngCore) -> SocialGenes {
    let cooperation = CooperationGenes {
        link_willingness: mean(a.cooperation.link_willingness, b.cooperation.link_willingness),
        link_strength: mean(a.cooperation.link_strength, b.cooperation.link_strength),
        resource_sharing: mean(a.cooperation.resource_sharing, b.cooperation.resource_sharing),
        signal_response: mean(a.cooperation.signal_response, b.cooperation.signal_response),
    };
    let competition = CompetitionGenes {
        aggression: mean(a.competition.aggression, b.competition.aggression),
        territorial_radius: either(&a.competition, &b.competition, rng).territorial_radius,
        flee_threshold: mean(a.competition.flee_threshold, b.competition.flee_threshold),
        resource_greed: mean(a.competition.resource_greed, b.competition.resource_greed),
    };
    SocialGenes {
        cooperation,
        competition,
        symbiosis: either(&a.symbiosis, &b.symbiosis, rng).clone(),
        communication: either(&a.communication, &b.communication, rng).clone(),
    }
}

fn blend_hgt(a: &HgtGenes, b: &HgtGenes, rng: &mut dyn RngCore) -> HgtGenes {
    let template = either(a, b, rng);
    let mut restriction_markers = a.restriction_markers.clone();
    for marker in &b.restriction_markers {
        if !restriction_markers.contains(marker) {
            restriction_markers.push(*marker);
        }
    }
    HgtGenes {
        donor_willingness: mean(a.donor_willingness, b.donor_willingness),
        recipient_openness: mean(a.recipient_openness, b.recipient_openness),
        transfer_type: template.transfer_type,
        plasmids: Vec::new(),
        restriction_markers,
        release_on_death: template.release_on_death,
    }
}

/// Merge two CRISPR memories: union without duplicates, keep the most recent
/// `crispr_memory_slots` entries, then drop each survivor with probability
/// `crispr_memory_decay`.
pub fn inherit_crispr(
    a: &[u32],
    b: &[u32],
    settings: &ViralSettings,
    rng: &mut dyn RngCore,
) -> Vec<u32> {
    let mut merged: Vec<u32> = Vec::with_capacity(a.len() + b.len());
    for marker in a.iter().chain(b.iter()) {
        if !merged.contains(marker) {
            merged.push(*marker);
        }
    }
    if merged.len() > settings.crispr_memory_slots {
        let excess = merged.len() - settings.crispr_memory_slots;
        merged.drain(..excess);
    }
    let keep = 1.0 - settings.crispr_memory_decay;
    merged.retain(|_| rng.chance(keep));
    merged
}
