//! Offspring production and speciation detection.

use evolab_core::{EvolabConfig, SpeciesMarker};
use evolab_genome::{
    Genome, GenomeId, MutationLog, clone_genome, crossover, genetic_distance, mutate_genome,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::Agent;

/// Hands out species markers that have never been used in this run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerAllocator {
    next: u32,
}

impl MarkerAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocator that starts above every marker carried by `agents`.
    #[must_use]
    pub fn above(agents: &[Agent]) -> Self {
        let mut allocator = Self::new();
        for agent in agents {
            allocator.observe(agent.species_marker());
        }
        allocator
    }

    /// Make sure future markers are strictly greater than `marker`.
    pub fn observe(&mut self, marker: SpeciesMarker) {
        self.next = self.next.max(marker.0.saturating_add(1)).max(1);
    }

    pub fn allocate(&mut self) -> SpeciesMarker {
        let marker = SpeciesMarker(self.next.max(1));
        self.next = marker.0.saturating_add(1);
        marker
    }
}

/// A child that diverged far enough from its parents to found a new species.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpeciationEvent {
    pub parent: SpeciesMarker,
    pub child: SpeciesMarker,
    pub genome: GenomeId,
    /// Distance to the closest parent.
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct Offspring {
    pub genome: Genome,
    pub mutations: MutationLog,
    pub speciation: Option<SpeciationEvent>,
}

fn assign_species(
    child: &mut Genome,
    parents: &[&Genome],
    config: &EvolabConfig,
    allocator: &mut MarkerAllocator,
) -> Option<SpeciationEvent> {
    let closest = parents
        .iter()
        .map(|parent| genetic_distance(child, parent))
        .fold(f32::INFINITY, f32::min);
    if !closest.is_finite() || closest < config.species.distance_threshold {
        return None;
    }
    let parent = child.species_marker;
    let marker = allocator.allocate();
    child.species_marker = marker;
    debug!(%parent, child = %marker, distance = closest, "speciation");
    Some(SpeciationEvent {
        parent,
        child: marker,
        genome: child.id,
        distance: closest,
    })
}

/// Clone `parent`, mutate the copy, and check for speciation.
pub fn reproduce_asexual(
    parent: &Genome,
    config: &EvolabConfig,
    allocator: &mut MarkerAllocator,
    rng: &mut dyn RngCore,
) -> Offspring {
    let mut genome = clone_genome(parent);
    genome.id = GenomeId::random(rng);
    genome.parents = [Some(parent.id), None];
    let mutations = mutate_genome(&mut genome, config, rng);
    let speciation = assign_species(&mut genome, &[parent], config, allocator);
    Offspring {
        genome,
        mutations,
        speciation,
    }
}

/// Recombine `a` and `b`, mutate the child, and check for speciation. The
/// child founds a new species only when it is distant from both parents.
pub fn reproduce_sexual(
    a: &Genome,
    b: &Genome,
    config: &EvolabConfig,
    allocator: &mut MarkerAllocator,
    rng: &mut dyn RngCore,
) -> Offspring {
    let mut genome = crossover(a, b, config, rng);
    let mutations = mutate_genome(&mut genome, config, rng);
    let speciation = assign_species(&mut genome, &[a, b], config, allocator);
    Offspring {
        genome,
        mutations,
        speciation,
    }
}
