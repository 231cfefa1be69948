//! Structural validation of genomes.

use evolab_core::GenomeLimits;
use serde::Serialize;
use thiserror::Error;

use crate::model::{Genome, GenomeId};

/// A single structural problem found in a genome.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
pub enum GenomeError {
    #[error("genome has no id")]
    MissingId,
    #[error("genome has no species marker")]
    UnassignedSpeciesMarker,
    #[error("genome has {count} nodes, minimum is {min}")]
    TooFewNodes { count: usize, min: usize },
    #[error("node at index {index} carries id {id}")]
    NodeIdMismatch { index: usize, id: usize },
    #[error("link at index {index} carries id {id}")]
    LinkIdMismatch { index: usize, id: usize },
    #[error("link {link} references node {node}, genome has {nodes} nodes")]
    LinkNodeOutOfRange { link: usize, node: usize, nodes: usize },
    #[error("link {link} connects node {node} to itself")]
    SelfLoop { link: usize, node: usize },
    #[error("motor {motor} is attached to link {link}, genome has {links} links")]
    MotorLinkOutOfRange { motor: usize, link: usize, links: usize },
    #[error("motor {motor} is modulated by sensor {sensor}, genome has {sensors} sensors")]
    SensorModulationOutOfRange {
        motor: usize,
        sensor: usize,
        sensors: usize,
    },
}

/// Outcome of [`validate_genome`]. Callers decide whether findings are fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<GenomeError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<GenomeError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Check identity, node count bounds, and that every cross reference in the
/// body graph resolves.
#[must_use]
pub fn validate_genome(genome: &Genome, limits: &GenomeLimits) -> ValidationReport {
    let mut errors = Vec::new();

    if genome.id == GenomeId::MISSING {
        errors.push(GenomeError::MissingId);
    }
    if !genome.species_marker.is_assigned() {
        errors.push(GenomeError::UnassignedSpeciesMarker);
    }
    if genome.nodes.len() < limits.min_nodes {
        errors.push(GenomeError::TooFewNodes {
            count: genome.nodes.len(),
            min: limits.min_nodes,
        });
    }

    for (index, node) in genome.nodes.iter().enumerate() {
        if node.id != index {
            errors.push(GenomeError::NodeIdMismatch { index, id: node.id });
        }
    }

    let nodes = genome.nodes.len();
    for (index, link) in genome.links.iter().enumerate() {
        if link.id != index {
            errors.push(GenomeError::LinkIdMismatch { index, id: link.id });
        }
        for node in [link.node_a, link.node_b] {
            if node >= nodes {
                errors.push(GenomeError::LinkNodeOutOfRange {
                    link: index,
                    node,
                    nodes,
                });
            }
        }
        if link.node_a == link.node_b {
            errors.push(GenomeError::SelfLoop {
                link: index,
                node: link.node_a,
            });
        }
    }

    let links = genome.links.len();
    let sensors = genome.sensors.len();
    for (index, motor) in genome.motors.iter().enumerate() {
        if motor.attached_to >= links {
            errors.push(GenomeError::MotorLinkOutOfRange {
                motor: index,
                link: motor.attached_to,
                links,
            });
        }
        if let Some(sensor) = motor.sensor_modulation
            && sensor >= sensors
        {
            errors.push(GenomeError::SensorModulationOutOfRange {
                motor: index,
                sensor,
                sensors,
            });
        }
    }

    ValidationReport::from_errors(errors)
}

/// `nodes + links + 2·motors + 2·sensors`.
#[must_use]
pub fn genome_complexity(genome: &Genome) -> usize {
    genome.complexity()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{RandomBodyOptions, generate_random_genome};
    use evolab_core::{EvolabConfig, SpeciesMarker};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn sample() -> (Genome, EvolabConfig) {
        let config = EvolabConfig::default();
        let mut rng = SmallRng::seed_from_u64(71);
        let genome = generate_random_genome(
            RandomBodyOptions {
                node_count: Some(5),
                species_marker: Some(SpeciesMarker(3)),
            },
            &config,
            &mut rng,
        );
        (genome, config)
    }

    #[test]
    fn reports_identity_problems() {
        let (mut genome, config) = sample();
        genome.id = GenomeId::MISSING;
        genome.species_marker = SpeciesMarker::UNASSIGNED;
        let report = validate_genome(&genome, &config.genome);
        assert!(!report.valid);
        assert!(report.errors.contains(&GenomeError::MissingId));
        assert!(report.errors.contains(&GenomeError::UnassignedSpeciesMarker));
    }

    #[test]
    fn reports_dangling_references() {
        let (mut genome, config) = sample();
        genome.links[0].node_b = 42;
        if let Some(motor) = genome.motors.first_mut() {
            motor.attached_to = 99;
        }
        let report = validate_genome(&genome, &config.genome);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| matches!(
            e,
            GenomeError::LinkNodeOutOfRange { link: 0, node: 42, .. }
        )));
        if !genome.motors.is_empty() {
            assert!(report.errors.iter().any(|e| matches!(
                e,
                GenomeError::MotorLinkOutOfRange { link: 99, .. }
            )));
        }
    }

    #[test]
    fn reports_small_bodies_and_bad_ids() {
        let (mut genome, config) = sample();
        genome.nodes.truncate(2);
        genome.links.retain(|link| link.node_a < 2 && link.node_b < 2);
        genome.motors.clear();
        genome.nodes[1].id = 7;
        let report = validate_genome(&genome, &config.genome);
        assert!(report.errors.contains(&GenomeError::TooFewNodes { count: 2, min: 3 }));
        assert!(report.errors.contains(&GenomeError::NodeIdMismatch { index: 1, id: 7 }));
    }

    #[test]
    fn complexity_weights_actuators_double() {
        let (genome, _) = sample();
        let expected = genome.nodes.len()
            + genome.links.len()
            + 2 * genome.motors.len()
            + 2 * genome.sensors.len();
        assert_eq!(genome_complexity(&genome), expected);
    }
}
