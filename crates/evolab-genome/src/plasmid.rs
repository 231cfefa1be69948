//! Plasmids: small mobile genetic elements carried in a genome's HGT record.

use evolab_core::{EvolabConfig, RandomSource, SpeciesMarker, clamp01};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Genome, HgtGenes, pick};

/// Carrying cost charged per gene when computing fitness contribution.
const GENE_COST: f32 = 0.02;
/// Per-gene chance of a numeric perturbation during plasmid mutation.
const NUMERIC_MUTATION_CHANCE: f32 = 0.3;
/// Per-gene chance of a categorical swap during plasmid mutation.
const CATEGORICAL_MUTATION_CHANCE: f32 = 0.05;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct PlasmidId(pub u64);

impl PlasmidId {
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self(rng.random::<u64>().max(1))
    }
}

impl fmt::Display for PlasmidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{:x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlasmidKind {
    Metabolic,
    Resistance,
    Conjugative,
    Motor,
    Sensor,
    Social,
    Crispr,
}

struct GeneTemplate {
    numeric: [(&'static str, f32, f32); 2],
    categorical: Option<(&'static str, &'static [&'static str])>,
    weight: f32,
}

impl PlasmidKind {
    pub const ALL: [PlasmidKind; 7] = [
        PlasmidKind::Metabolic,
        PlasmidKind::Resistance,
        PlasmidKind::Conjugative,
        PlasmidKind::Motor,
        PlasmidKind::Sensor,
        PlasmidKind::Social,
        PlasmidKind::Crispr,
    ];

    fn template(self) -> GeneTemplate {
        match self {
            PlasmidKind::Metabolic => GeneTemplate {
                numeric: [("efficiency_boost", 0.02, 0.15), ("storage_bonus", 0.0, 0.2)],
                categorical: Some(("substrate", &["sugar", "cellulose", "chitin"])),
                weight: 1.0,
            },
            PlasmidKind::Resistance => GeneTemplate {
                numeric: [("toxin_resistance", 0.05, 0.4), ("viral_resistance", 0.02, 0.2)],
                categorical: None,
                weight: 0.6,
            },
            PlasmidKind::Conjugative => GeneTemplate {
                numeric: [("transfer_rate", 0.05, 0.3), ("pilus_range", 0.1, 0.5)],
                categorical: None,
                weight: 0.2,
            },
            PlasmidKind::Motor => GeneTemplate {
                numeric: [("motor_power", 0.02, 0.2), ("motor_efficiency", 0.02, 0.15)],
                categorical: None,
                weight: 0.8,
            },
            PlasmidKind::Sensor => GeneTemplate {
                numeric: [("sensor_range", 0.05, 0.3), ("sensor_gain", 0.02, 0.2)],
                categorical: Some(("modality", &["chemical", "optical", "tactile"])),
                weight: 0.7,
            },
            PlasmidKind::Social => GeneTemplate {
                numeric: [("cooperation_boost", 0.02, 0.2), ("signal_strength", 0.05, 0.3)],
                categorical: None,
                weight: 0.5,
            },
            PlasmidKind::Crispr => GeneTemplate {
                numeric: [("spacer_capacity", 0.1, 0.5), ("recognition_accuracy", 0.1, 0.4)],
                categorical: None,
                weight: 0.6,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum GeneValue {
    Numeric(f32),
    Categorical(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlasmidGene {
    pub name: String,
    pub value: GeneValue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlasmidOrigin {
    Spontaneous,
    Parent(PlasmidId),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plasmid {
    pub id: PlasmidId,
    pub kind: PlasmidKind,
    pub genes: Vec<PlasmidGene>,
    pub origin: PlasmidOrigin,
    pub generation: u32,
    pub age: u32,
    pub transfer_count: u32,
    pub fitness_contribution: f32,
}

impl Plasmid {
    /// Build a fresh plasmid of `kind` from its gene template.
    pub fn random(kind: PlasmidKind, rng: &mut dyn RngCore) -> Self {
        let template = kind.template();
        let mut genes: Vec<PlasmidGene> = template
            .numeric
            .iter()
            .map(|&(name, lo, hi)| PlasmidGene {
                name: name.to_string(),
                value: GeneValue::Numeric(rng.between(lo, hi)),
            })
            .collect();
        if let Some((name, options)) = template.categorical {
            genes.push(PlasmidGene {
                name: name.to_string(),
                value: GeneValue::Categorical(pick(options, rng).to_string()),
            });
        }
        let mut plasmid = Self {
            id: PlasmidId::random(rng),
            kind,
            genes,
            origin: PlasmidOrigin::Spontaneous,
            generation: 0,
            age: 0,
            transfer_count: 0,
            fitness_contribution: 0.0,
        };
        plasmid.refresh_fitness();
        plasmid
    }

    /// Spontaneous plasmid of a random kind.
    pub fn spontaneous(rng: &mut dyn RngCore) -> Self {
        let kind = pick(&PlasmidKind::ALL, rng);
        Self::random(kind, rng)
    }

    /// Numeric value of the gene called `name`.
    #[must_use]
    pub fn numeric_gene(&self, name: &str) -> Option<f32> {
        self.genes.iter().find_map(|gene| match &gene.value {
            GeneValue::Numeric(value) if gene.name == name => Some(*value),
            _ => None,
        })
    }

    /// Look up a gene by name.
    #[must_use]
    pub fn gene(&self, name: &str) -> Option<&PlasmidGene> {
        self.genes.iter().find(|gene| gene.name == name)
    }

    fn refresh_fitness(&mut self) {
        let numeric_sum: f32 = self
            .genes
            .iter()
            .filter_map(|gene| match gene.value {
                GeneValue::Numeric(value) => Some(value),
                GeneValue::Categorical(_) => None,
            })
            .sum();
        self.fitness_contribution =
            self.kind.template().weight * numeric_sum - GENE_COST * self.genes.len() as f32;
    }

    /// Perturb numeric genes and occasionally swap categorical ones.
    pub fn mutate(&mut self, rng: &mut dyn RngCore, strength: f32) {
        let categorical = self.kind.template().categorical;
        for gene in &mut self.genes {
            match &mut gene.value {
                GeneValue::Numeric(value) => {
                    if rng.chance(NUMERIC_MUTATION_CHANCE) {
                        *value = clamp01(*value + rng.between(-strength, strength));
                    }
                }
                GeneValue::Categorical(value) => {
                    if let Some((_, options)) = categorical {
                        if rng.chance(CATEGORICAL_MUTATION_CHANCE) {
                            *value = pick(options, rng).to_string();
                        }
                    }
                }
            }
        }
        self.refresh_fitness();
    }

    /// Copy handed to a recipient: new id, parent origin, counters reset.
    pub fn clone_for_transfer(&self, rng: &mut dyn RngCore) -> Self {
        Self {
            id: PlasmidId::random(rng),
            origin: PlasmidOrigin::Parent(self.id),
            generation: self.generation + 1,
            age: 0,
            transfer_count: 0,
            ..self.clone()
        }
    }

    pub fn age_tick(&mut self) {
        self.age = self.age.saturating_add(1);
    }
}

impl HgtGenes {
    /// Try to take up `plasmid` from a donor of species `donor`.
    ///
    /// Restriction markers cut foreign DNA outright. A plasmid of a kind the
    /// genome already carries only displaces the resident if it contributes
    /// more fitness.
    pub fn accept_plasmid(&mut self, plasmid: Plasmid, donor: SpeciesMarker, cap: usize) -> bool {
        if self.restriction_markers.contains(&donor.0) {
            return false;
        }
        if let Some(resident) = self.plasmids.iter_mut().find(|p| p.kind == plasmid.kind) {
            if plasmid.fitness_contribution > resident.fitness_contribution {
                *resident = plasmid;
                return true;
            }
            return false;
        }
        if self.plasmids.len() >= cap {
            return false;
        }
        self.plasmids.push(plasmid);
        true
    }

    /// Summed fitness contribution of carried plasmids.
    #[must_use]
    pub fn plasmid_fitness(&self) -> f32 {
        self.plasmids.iter().map(|p| p.fitness_contribution).sum()
    }

    pub fn age_plasmids(&mut self) {
        for plasmid in &mut self.plasmids {
            plasmid.age_tick();
        }
    }
}

/// Attempt a conjugative transfer of one random plasmid from `donor` to
/// `recipient`. Returns the id of the copy the recipient accepted.
pub fn conjugate(
    donor: &mut Genome,
    recipient: &mut Genome,
    config: &EvolabConfig,
    rng: &mut dyn RngCore,
) -> Option<PlasmidId> {
    if !donor.hgt.transfer_type.conjugates() || donor.hgt.plasmids.is_empty() {
        return None;
    }
    if !rng.chance(donor.hgt.donor_willingness) || !rng.chance(recipient.hgt.recipient_openness) {
        return None;
    }
    let index = rng.pick_index(donor.hgt.plasmids.len())?;
    let copy = donor.hgt.plasmids[index].clone_for_transfer(rng);
    let copy_id = copy.id;
    let accepted =
        recipient
            .hgt
            .accept_plasmid(copy, donor.species_marker, config.hgt.max_plasmids);
    if accepted {
        donor.hgt.plasmids[index].transfer_count += 1;
        Some(copy_id)
    } else {
        None
    }
}
