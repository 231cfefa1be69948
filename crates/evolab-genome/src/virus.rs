//! Viral genomes and host-side CRISPR memory.

use evolab_core::{RandomSource, clamp01};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::model::{Genome, ViralGenes};

pub const MIN_BURST: u32 = 5;
pub const MAX_BURST: u32 = 100;

/// Host specificity above which only the primary surface marker binds.
const STRICT_SPECIFICITY: f32 = 0.7;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct VirusId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirusGenome {
    pub id: VirusId,
    pub generation: u32,
    pub host_specificity: f32,
    pub injection_speed: f32,
    pub replication_rate: f32,
    /// 0 always lytic, 1 always lysogenic.
    pub lysogenic_preference: f32,
    pub burst_size: u32,
    pub crispr_evasion: f32,
    pub surface_markers: [u32; 2],
    pub packaging_error_rate: f32,
}

fn draw_marker(pool: u32, rng: &mut dyn RngCore) -> u32 {
    rng.int_between(0, i64::from(pool.max(1)) - 1) as u32
}

impl VirusGenome {
    pub fn random(receptor_pool: u32, rng: &mut dyn RngCore) -> Self {
        let mut virus = Self {
            id: VirusId(rng.random::<u64>().max(1)),
            generation: 0,
            host_specificity: rng.uniform(),
            injection_speed: rng.between(0.1, 0.6),
            replication_rate: rng.between(0.1, 0.6),
            lysogenic_preference: rng.uniform(),
            burst_size: rng.int_between(i64::from(MIN_BURST), 50) as u32,
            crispr_evasion: rng.uniform() * 0.2,
            surface_markers: [draw_marker(receptor_pool, rng), draw_marker(receptor_pool, rng)],
            packaging_error_rate: rng.between(0.005, 0.05),
        };
        virus.apply_burst_tradeoff();
        virus
    }

    /// Marker CRISPR systems store when they survive this virus.
    #[must_use]
    pub fn primary_marker(&self) -> u32 {
        self.surface_markers[0]
    }

    /// Replication rate ceiling imposed by the burst size.
    #[must_use]
    pub fn replication_ceiling(&self) -> f32 {
        1.0 - self.burst_size as f32 / (2.0 * MAX_BURST as f32)
    }

    fn apply_burst_tradeoff(&mut self) {
        self.replication_rate = self.replication_rate.min(self.replication_ceiling());
    }

    /// Perturb one to three random fields, then apply coevolutionary feedback.
    ///
    /// `crispr_prevalence` is the fraction of potential hosts remembering this
    /// virus: high prevalence drives evasion up, near-absence lets it decay.
    pub fn mutate(&mut self, crispr_prevalence: f32, receptor_pool: u32, rng: &mut dyn RngCore) {
        let changes = rng.int_between(1, 3);
        for _ in 0..changes {
            match rng.int_between(0, 7) {
                0 => self.host_specificity = clamp01(self.host_specificity + rng.between(-0.1, 0.1)),
                1 => {
                    self.injection_speed =
                        (self.injection_speed + rng.between(-0.1, 0.1)).clamp(0.05, 1.0);
                }
                2 => {
                    self.replication_rate =
                        (self.replication_rate + rng.between(-0.1, 0.1)).clamp(0.05, 1.0);
                }
                3 => {
                    self.lysogenic_preference =
                        clamp01(self.lysogenic_preference + rng.between(-0.1, 0.1));
                }
                4 => {
                    let delta = rng.int_between(-10, 10);
                    self.burst_size = (i64::from(self.burst_size) + delta)
                        .clamp(i64::from(MIN_BURST), i64::from(MAX_BURST))
                        as u32;
                }
                5 => self.crispr_evasion = clamp01(self.crispr_evasion + rng.between(-0.05, 0.05)),
                6 => {
                    let slot = rng.pick_index(2).unwrap_or(0);
                    self.surface_markers[slot] = draw_marker(receptor_pool, rng);
                }
                _ => {
                    self.packaging_error_rate =
                        (self.packaging_error_rate + rng.between(-0.01, 0.01)).clamp(0.001, 0.2);
                }
            }
        }

        let prevalence = clamp01(crispr_prevalence);
        if prevalence > 0.3 {
            self.crispr_evasion = clamp01(self.crispr_evasion + 0.05 * prevalence);
        } else if prevalence < 0.1 {
            self.crispr_evasion = clamp01(self.crispr_evasion - 0.02);
        }
        self.apply_burst_tradeoff();
        self.generation += 1;
    }

    /// Daughter virion released in a burst. Packaging errors mutate it.
    pub fn progeny(
        &self,
        crispr_prevalence: f32,
        receptor_pool: u32,
        rng: &mut dyn RngCore,
    ) -> Self {
        let mut child = self.clone();
        child.id = VirusId(rng.random::<u64>().max(1));
        if rng.chance(self.packaging_error_rate) {
            child.mutate(crispr_prevalence, receptor_pool, rng);
        } else {
            child.generation += 1;
        }
        child
    }

    /// Whether the virus can attach to a host expressing `viral.receptors`.
    #[must_use]
    pub fn binds(&self, viral: &ViralGenes) -> bool {
        if self.host_specificity > STRICT_SPECIFICITY {
            viral.receptors.contains(&self.surface_markers[0])
        } else {
            self.surface_markers
                .iter()
                .any(|marker| viral.receptors.contains(marker))
        }
    }
}

impl ViralGenes {
    /// Store `marker` in CRISPR memory, evicting the oldest beyond `slots`.
    pub fn remember(&mut self, marker: u32, slots: usize) {
        if let Some(pos) = self.crispr_memory.iter().position(|m| *m == marker) {
            self.crispr_memory.remove(pos);
        }
        self.crispr_memory.push(marker);
        if self.crispr_memory.len() > slots {
            let excess = self.crispr_memory.len() - slots;
            self.crispr_memory.drain(..excess);
        }
    }

    /// Probability that CRISPR immunity neutralizes `virus`.
    #[must_use]
    pub fn recognition_probability(&self, virus: &VirusGenome) -> f32 {
        let remembered = virus
            .surface_markers
            .iter()
            .any(|marker| self.crispr_memory.contains(marker));
        if remembered {
            clamp01(1.0 - virus.crispr_evasion)
        } else {
            0.0
        }
    }

    /// Chance an exposure turns into an infection.
    #[must_use]
    pub fn susceptibility(&self, virus: &VirusGenome) -> f32 {
        if !virus.binds(self) {
            return 0.0;
        }
        clamp01((1.0 - self.resistance) * (1.0 - self.recognition_probability(virus)))
    }
}

/// Fraction of `genomes` whose CRISPR memory holds `marker`.
pub fn crispr_prevalence<'a>(genomes: impl IntoIterator<Item = &'a Genome>, marker: u32) -> f32 {
    let mut total = 0usize;
    let mut remembering = 0usize;
    for genome in genomes {
        total += 1;
        if genome.viral.crispr_memory.contains(&marker) {
            remembering += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        remembering as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReceptorSet;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use smallvec::smallvec;

    fn host(receptors: &[u32]) -> ViralGenes {
        ViralGenes {
            receptors: ReceptorSet::from_slice(receptors),
            resistance: 0.0,
            crispr_memory: Vec::new(),
        }
    }

    #[test]
    fn mutation_respects_bounds_and_tradeoff() {
        let mut rng = SmallRng::seed_from_u64(17);
        let mut virus = VirusGenome::random(12, &mut rng);
        for step in 0..2_000 {
            let prevalence = if step % 2 == 0 { 0.8 } else { 0.0 };
            virus.mutate(prevalence, 12, &mut rng);
            assert!((MIN_BURST..=MAX_BURST).contains(&virus.burst_size));
            assert!(virus.replication_rate <= virus.replication_ceiling() + 1e-6);
            assert!((0.0..=1.0).contains(&virus.crispr_evasion));
            assert!(virus.surface_markers.iter().all(|m| *m < 12));
        }
        assert_eq!(virus.generation, 2_000);
    }

    #[test]
    fn prevalent_crispr_pushes_evasion_up() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut virus = VirusGenome::random(12, &mut rng);
        virus.crispr_evasion = 0.1;
        let mut total = 0.0;
        for _ in 0..50 {
            let before = virus.crispr_evasion;
            virus.mutate(1.0, 12, &mut rng);
            total += virus.crispr_evasion - before;
        }
        assert!(total > 0.0, "evasion should trend upward under CRISPR pressure");
    }

    #[test]
    fn binding_depends_on_specificity() {
        let mut rng = SmallRng::seed_from_u64(8);
        let mut virus = VirusGenome::random(12, &mut rng);
        virus.surface_markers = [3, 4];
        virus.host_specificity = 0.2;
        assert!(virus.binds(&host(&[4])));
        assert!(!virus.binds(&host(&[5])));
        virus.host_specificity = 0.9;
        assert!(!virus.binds(&host(&[4])));
        assert!(virus.binds(&host(&[3])));
    }

    #[test]
    fn crispr_memory_is_bounded_fifo() {
        let mut viral = host(&[1]);
        for marker in 0..10 {
            viral.remember(marker, 4);
        }
        assert_eq!(viral.crispr_memory, vec![6, 7, 8, 9]);
        viral.remember(7, 4);
        assert_eq!(viral.crispr_memory, vec![6, 8, 9, 7]);
    }

    #[test]
    fn recognition_reduces_susceptibility() {
        let mut rng = SmallRng::seed_from_u64(12);
        let mut virus = VirusGenome::random(12, &mut rng);
        virus.surface_markers = [2, 2];
        virus.host_specificity = 0.1;
        virus.crispr_evasion = 0.25;
        let mut viral = host(&[2]);
        assert!((viral.susceptibility(&virus) - 1.0).abs() < 1e-6);
        viral.remember(2, 8);
        assert!((viral.recognition_probability(&virus) - 0.75).abs() < 1e-6);
        assert!((viral.susceptibility(&virus) - 0.25).abs() < 1e-6);
        viral.receptors = smallvec![9];
        assert_eq!(viral.susceptibility(&virus), 0.0);
    }

    #[test]
    fn progeny_gets_fresh_identity() {
        let mut rng = SmallRng::seed_from_u64(99);
        let virus = VirusGenome::random(12, &mut rng);
        let child = virus.progeny(0.0, 12, &mut rng);
        assert_ne!(child.id, virus.id);
        assert_eq!(child.generation, virus.generation + 1);
    }
}
