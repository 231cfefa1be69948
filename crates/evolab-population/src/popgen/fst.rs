//! Fixation index between species or between the two sides of a barrier.

use evolab_core::{PopGenSettings, SpeciesMarker};
use evolab_genome::neutral_distance;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;

/// A straight environmental barrier splitting the world in two.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Barrier {
    /// Agents with `x < value` form one side.
    Vertical(f32),
    /// Agents with `y < value` form one side.
    Horizontal(f32),
}

impl Barrier {
    fn first_side(self, agent: &Agent) -> bool {
        match self {
            Barrier::Vertical(x) => agent.position.x < x,
            Barrier::Horizontal(y) => agent.position.y < y,
        }
    }
}

/// Mean neutral distance over at most `cap` pairs of `members`.
///
/// Small groups are compared exhaustively. Larger groups use a fixed stride
/// so the estimate is reproducible without a random source.
#[must_use]
pub fn heterozygosity(members: &[&Agent], cap: usize) -> f32 {
    let n = members.len();
    if n < 2 || cap == 0 {
        return 0.0;
    }
    let all = n * (n - 1) / 2;
    let mut total = 0.0;
    let mut counted = 0usize;
    if all <= cap {
        for i in 0..n {
            for j in (i + 1)..n {
                total += neutral_distance(&members[i].genome, &members[j].genome);
                counted += 1;
            }
        }
    } else {
        for t in 0..cap {
            let i = t % n;
            let j = (i + 1 + (t / n) % (n - 1)) % n;
            total += neutral_distance(&members[i].genome, &members[j].genome);
            counted += 1;
        }
    }
    total / counted as f32
}

fn fst_between(first: &[&Agent], second: &[&Agent], minimum: usize, cap: usize) -> f32 {
    if first.len() < minimum.max(2) || second.len() < minimum.max(2) {
        return 0.0;
    }
    let hs = (heterozygosity(first, cap) + heterozygosity(second, cap)) / 2.0;
    let pooled: Vec<&Agent> = first.iter().chain(second.iter()).copied().collect();
    let ht = heterozygosity(&pooled, cap);
    if ht <= 0.0 {
        return 0.0;
    }
    let fst = (ht - hs) / ht;
    if fst.is_finite() { fst.clamp(0.0, 1.0) } else { 0.0 }
}

/// Differentiation between two species. Zero when either side has fewer
/// than `fst_min_species` living members.
#[must_use]
pub fn calculate_fst(
    a: SpeciesMarker,
    b: SpeciesMarker,
    agents: &[Agent],
    settings: &PopGenSettings,
) -> f32 {
    let living = agents.iter().filter(|agent| agent.alive);
    let first: Vec<&Agent> = living.clone().filter(|agent| agent.species_marker() == a).collect();
    let second: Vec<&Agent> = living.filter(|agent| agent.species_marker() == b).collect();
    fst_between(&first, &second, settings.fst_min_species, settings.fst_pair_cap)
}

/// Differentiation between the living agents on either side of `barrier`.
/// Zero when either side has fewer than `fst_min_barrier` members.
#[must_use]
pub fn calculate_geographic_fst(
    barrier: Barrier,
    agents: &[Agent],
    settings: &PopGenSettings,
) -> f32 {
    let (first, second): (Vec<&Agent>, Vec<&Agent>) = agents
        .iter()
        .filter(|agent| agent.alive)
        .partition(|agent| barrier.first_side(agent));
    fst_between(&first, &second, settings.fst_min_barrier, settings.fst_pair_cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolab_core::Position;

    fn uniform_group(count: usize, marker: u32, value: f32, x: f32) -> Vec<Agent> {
        let mut group = super::super::tests::agents(count, marker, u64::from(marker));
        for agent in &mut group {
            let genome = &mut agent.genome;
            genome.metabolism.efficiency = value;
            genome.metabolism.storage_capacity = 0.0;
            genome.social.cooperation.signal_response = value;
            genome.social.competition.resource_greed = value;
            genome.social.symbiosis.attachment_strength = value;
            genome.social.communication.signal_frequency = value;
            genome.social.communication.signal_emission = value;
            genome.social.cooperation.link_strength = value;
            genome.social.competition.flee_threshold = value;
            genome.viral.resistance = value;
            agent.position = Position::new(x, 0.0);
        }
        group
    }

    #[test]
    fn fst_is_zero_below_minimum_sample() {
        let settings = PopGenSettings::default();
        let mut agents = uniform_group(1, 1, 0.1, 0.0);
        agents.extend(uniform_group(5, 2, 0.9, 0.0));
        assert_eq!(calculate_fst(SpeciesMarker(1), SpeciesMarker(2), &agents, &settings), 0.0);

        let mut sides = uniform_group(4, 1, 0.1, -5.0);
        sides.extend(uniform_group(10, 2, 0.9, 5.0));
        assert_eq!(calculate_geographic_fst(Barrier::Vertical(0.0), &sides, &settings), 0.0);
    }

    #[test]
    fn divergent_species_are_strongly_differentiated() {
        let settings = PopGenSettings::default();
        let mut agents = uniform_group(6, 1, 0.1, -5.0);
        agents.extend(uniform_group(6, 2, 0.9, 5.0));
        let fst = calculate_fst(SpeciesMarker(1), SpeciesMarker(2), &agents, &settings);
        assert!(fst > 0.5 && fst <= 1.0, "fst {fst}");
        let geographic = calculate_geographic_fst(Barrier::Vertical(0.0), &agents, &settings);
        assert!((geographic - fst).abs() < 1e-5);
        let unsplit = calculate_geographic_fst(Barrier::Horizontal(-1.0), &agents, &settings);
        assert_eq!(unsplit, 0.0);
    }

    #[test]
    fn fst_stays_in_unit_interval_for_random_groups() {
        let settings = PopGenSettings {
            fst_pair_cap: 15,
            ..PopGenSettings::default()
        };
        for seed in 0..10u32 {
            let mut agents = super::super::tests::agents(8, 1, u64::from(seed));
            agents.extend(super::super::tests::agents(9, 2, u64::from(seed) + 100));
            let fst = calculate_fst(SpeciesMarker(1), SpeciesMarker(2), &agents, &settings);
            assert!((0.0..=1.0).contains(&fst), "fst {fst}");
        }
    }

    #[test]
    fn strided_pairs_are_deterministic() {
        let group = super::super::tests::agents(30, 1, 5);
        let refs: Vec<&Agent> = group.iter().collect();
        assert_eq!(heterozygosity(&refs, 40), heterozygosity(&refs, 40));
        assert_eq!(heterozygosity(&refs[..1], 40), 0.0);
    }
}
