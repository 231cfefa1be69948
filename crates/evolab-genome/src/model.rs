//! Genome data model.
//!
//! The body graph is stored as four flat arrays. Cross references (link
//! endpoints, motor attachments, sensor modulation) are plain indices into
//! those arrays, and every element's `id` equals its array position. Structural
//! operators in [`crate::mutation`] renumber after every removal to keep that
//! true.

use evolab_core::{Position, RandomSource, SpeciesMarker, ViralSettings};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::RangeInclusive;

use crate::plasmid::Plasmid;

/// Valid ranges for every clamped numeric gene.
pub mod ranges {
    use std::ops::RangeInclusive;

    pub const MASS: RangeInclusive<f32> = 0.5..=5.0;
    pub const FRICTION: RangeInclusive<f32> = 0.0..=1.0;
    pub const STIFFNESS: RangeInclusive<f32> = 0.05..=1.0;
    pub const DAMPING: RangeInclusive<f32> = 0.01..=0.5;
    pub const CYCLE_SPEED: RangeInclusive<f32> = 0.01..=0.5;
    pub const AMPLITUDE: RangeInclusive<f32> = 0.05..=1.0;
    pub const PHASE: RangeInclusive<f32> = 0.0..=std::f32::consts::TAU;
    pub const MOTOR_COST: RangeInclusive<f32> = 0.01..=0.2;
    pub const EFFICIENCY: RangeInclusive<f32> = 0.1..=1.0;
    pub const STORAGE: RangeInclusive<f32> = 20.0..=200.0;
    pub const METABOLIC_RATE: RangeInclusive<f32> = 0.01..=0.3;
    pub const SENSITIVITY: RangeInclusive<f32> = 0.1..=1.0;
    pub const SENSOR_RANGE: RangeInclusive<f32> = 10.0..=150.0;
    pub const OUTPUT_GAIN: RangeInclusive<f32> = 0.1..=2.0;
    pub const TERRITORIAL_RADIUS: RangeInclusive<f32> = 20.0..=60.0;
    pub const SIGNAL_FREQUENCY: RangeInclusive<f32> = 0.0..=1.0;
    pub const UNIT: RangeInclusive<f32> = 0.0..=1.0;
}

/// Clamp `value` into `range`.
#[must_use]
pub fn clamp_to(value: f32, range: RangeInclusive<f32>) -> f32 {
    value.clamp(*range.start(), *range.end())
}

pub(crate) fn sample(rng: &mut dyn RngCore, range: RangeInclusive<f32>) -> f32 {
    rng.between(*range.start(), *range.end())
}

/// Unique genome identifier. Zero is reserved for "missing".
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct GenomeId(pub u64);

impl GenomeId {
    pub const MISSING: GenomeId = GenomeId(0);

    /// Draw a fresh non-zero id.
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self(rng.random::<u64>().max(1))
    }
}

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Point mass in the soft body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BodyNode {
    pub id: usize,
    pub position: Position,
    pub mass: f32,
    pub friction: f32,
}

/// Spring connecting two nodes by index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BodyLink {
    pub id: usize,
    pub node_a: usize,
    pub node_b: usize,
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,
}

impl BodyLink {
    /// Whether the link touches `node`.
    #[must_use]
    pub fn touches(&self, node: usize) -> bool {
        self.node_a == node || self.node_b == node
    }

    /// Whether the link joins `a` and `b` in either direction.
    #[must_use]
    pub fn joins(&self, a: usize, b: usize) -> bool {
        (self.node_a == a && self.node_b == b) || (self.node_a == b && self.node_b == a)
    }
}

/// Oscillating actuator driving one link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Motor {
    pub id: usize,
    pub attached_to: usize,
    pub cycle_speed: f32,
    pub amplitude: f32,
    pub phase_offset: f32,
    pub energy_cost: f32,
    /// Index into the genome's sensors modulating this motor.
    pub sensor_modulation: Option<usize>,
}

impl Motor {
    pub(crate) fn random(id: usize, attached_to: usize, rng: &mut dyn RngCore) -> Self {
        Self {
            id,
            attached_to,
            cycle_speed: rng.between(0.02, 0.2),
            amplitude: rng.between(0.1, 0.5),
            phase_offset: sample(rng, ranges::PHASE),
            energy_cost: rng.between(0.02, 0.1),
            sensor_modulation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Food,
    Predator,
    Kin,
    Light,
    Chemical,
    Touch,
}

impl SensorKind {
    pub const ALL: [SensorKind; 6] = [
        SensorKind::Food,
        SensorKind::Predator,
        SensorKind::Kin,
        SensorKind::Light,
        SensorKind::Chemical,
        SensorKind::Touch,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SensorTarget {
    Nearest,
    Strongest,
    Average,
}

impl SensorTarget {
    pub const ALL: [SensorTarget; 3] = [
        SensorTarget::Nearest,
        SensorTarget::Strongest,
        SensorTarget::Average,
    ];
}

/// Environmental sensor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sensor {
    pub id: usize,
    pub kind: SensorKind,
    pub target: SensorTarget,
    pub sensitivity: f32,
    pub range: f32,
    pub output_gain: f32,
}

impl Sensor {
    pub(crate) fn random(id: usize, rng: &mut dyn RngCore) -> Self {
        Self {
            id,
            kind: pick(&SensorKind::ALL, rng),
            target: pick(&SensorTarget::ALL, rng),
            sensitivity: sample(rng, ranges::SENSITIVITY),
            range: rng.between(20.0, 100.0),
            output_gain: rng.between(0.5, 1.5),
        }
    }
}

pub(crate) fn pick<T: Copy>(options: &[T], rng: &mut dyn RngCore) -> T {
    let idx = rng.pick_index(options.len()).unwrap_or(0);
    options[idx]
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FoodType {
    Plant,
    Meat,
    Detritus,
    Mineral,
}

impl FoodType {
    pub const ALL: [FoodType; 4] = [
        FoodType::Plant,
        FoodType::Meat,
        FoodType::Detritus,
        FoodType::Mineral,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WasteType {
    None,
    Detritus,
    Toxin,
    Nutrient,
}

impl WasteType {
    pub const ALL: [WasteType; 4] = [
        WasteType::None,
        WasteType::Detritus,
        WasteType::Toxin,
        WasteType::Nutrient,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metabolism {
    pub primary_food: FoodType,
    pub secondary_food: Option<FoodType>,
    pub efficiency: f32,
    pub storage_capacity: f32,
    pub base_rate: f32,
    pub waste: WasteType,
}

impl Metabolism {
    pub fn random(rng: &mut dyn RngCore) -> Self {
        let primary_food = pick(&FoodType::ALL, rng);
        let secondary_food = if rng.chance(0.3) {
            let other = pick(&FoodType::ALL, rng);
            (other != primary_food).then_some(other)
        } else {
            None
        };
        Self {
            primary_food,
            secondary_food,
            efficiency: rng.between(0.3, 0.9),
            storage_capacity: rng.between(50.0, 150.0),
            base_rate: rng.between(0.05, 0.15),
            waste: pick(&WasteType::ALL, rng),
        }
    }

    /// Whether the organism can digest `food` at all.
    #[must_use]
    pub fn digests(&self, food: FoodType) -> bool {
        self.primary_food == food || self.secondary_food == Some(food)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CooperationGenes {
    pub link_willingness: f32,
    pub link_strength: f32,
    pub resource_sharing: f32,
    pub signal_response: f32,
}

impl CooperationGenes {
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self {
            link_willingness: rng.uniform(),
            link_strength: rng.between(0.2, 0.8),
            resource_sharing: rng.uniform() * 0.5,
            signal_response: rng.uniform(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitionGenes {
    pub aggression: f32,
    /// Zero means the organism does not defend territory.
    pub territorial_radius: f32,
    pub flee_threshold: f32,
    pub resource_greed: f32,
}

impl CompetitionGenes {
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self {
            aggression: rng.uniform() * 0.5,
            territorial_radius: if rng.chance(0.2) {
                sample(rng, ranges::TERRITORIAL_RADIUS)
            } else {
                0.0
            },
            flee_threshold: rng.between(0.2, 0.7),
            resource_greed: rng.uniform(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbiosisGenes {
    pub accepted_markers: Vec<SpeciesMarker>,
    pub offered_benefit: f32,
    pub needed_benefit: f32,
    pub attachment_strength: f32,
}

impl SymbiosisGenes {
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self {
            accepted_markers: Vec::new(),
            offered_benefit: rng.uniform() * 0.3,
            needed_benefit: rng.uniform() * 0.3,
            attachment_strength: rng.uniform(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunicationGenes {
    pub signal_emission: f32,
    pub signal_type: u8,
    pub signal_frequency: f32,
}

impl CommunicationGenes {
    pub const SIGNAL_TYPES: u8 = 4;

    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self {
            signal_emission: rng.uniform() * 0.5,
            signal_type: rng.int_between(0, i64::from(Self::SIGNAL_TYPES) - 1) as u8,
            signal_frequency: sample(rng, ranges::SIGNAL_FREQUENCY),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialGenes {
    pub cooperation: CooperationGenes,
    pub competition: CompetitionGenes,
    pub symbiosis: SymbiosisGenes,
    pub communication: CommunicationGenes,
}

impl SocialGenes {
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self {
            cooperation: CooperationGenes::random(rng),
            competition: CompetitionGenes::random(rng),
            symbiosis: SymbiosisGenes::random(rng),
            communication: CommunicationGenes::random(rng),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Conjugation,
    Transformation,
    Both,
}

impl TransferType {
    pub const ALL: [TransferType; 3] = [
        TransferType::Conjugation,
        TransferType::Transformation,
        TransferType::Both,
    ];

    #[must_use]
    pub fn conjugates(self) -> bool {
        matches!(self, TransferType::Conjugation | TransferType::Both)
    }

    #[must_use]
    pub fn transforms(self) -> bool {
        matches!(self, TransferType::Transformation | TransferType::Both)
    }
}

/// Horizontal-gene-transfer capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HgtGenes {
    pub donor_willingness: f32,
    pub recipient_openness: f32,
    pub transfer_type: TransferType,
    pub plasmids: Vec<Plasmid>,
    /// Donor species markers whose DNA this genome cuts on entry.
    pub restriction_markers: Vec<u32>,
    pub release_on_death: bool,
}

impl HgtGenes {
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self {
            donor_willingness: rng.uniform() * 0.5,
            recipient_openness: rng.uniform() * 0.5,
            transfer_type: pick(&TransferType::ALL, rng),
            plasmids: Vec::new(),
            restriction_markers: Vec::new(),
            release_on_death: rng.chance(0.5),
        }
    }
}

/// Receptor ids expressed on the cell surface.
pub type ReceptorSet = SmallVec<[u32; 5]>;

/// Viral susceptibility record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViralGenes {
    pub receptors: ReceptorSet,
    pub resistance: f32,
    /// Remembered viral markers, oldest first.
    pub crispr_memory: Vec<u32>,
}

impl ViralGenes {
    /// One to four distinct receptors drawn from the configured pool.
    pub fn random(settings: &ViralSettings, rng: &mut dyn RngCore) -> Self {
        let wanted = rng.int_between(1, 4) as usize;
        let mut receptors = ReceptorSet::new();
        let mut attempts = 0;
        while receptors.len() < wanted.min(settings.max_receptors) && attempts < 32 {
            attempts += 1;
            let receptor = rng.int_between(0, i64::from(settings.receptor_pool) - 1) as u32;
            if !receptors.contains(&receptor) {
                receptors.push(receptor);
            }
        }
        Self {
            receptors,
            resistance: rng.uniform() * 0.3,
            crispr_memory: Vec::new(),
        }
    }
}

/// The full heritable record for one organism.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genome {
    pub id: GenomeId,
    /// Founder id, inherited unchanged from the primary parent.
    pub lineage: u64,
    pub parents: [Option<GenomeId>; 2],
    pub species_marker: SpeciesMarker,
    pub generation: u32,
    pub nodes: Vec<BodyNode>,
    pub links: Vec<BodyLink>,
    pub motors: Vec<Motor>,
    pub sensors: Vec<Sensor>,
    pub metabolism: Metabolism,
    pub social: SocialGenes,
    pub hgt: HgtGenes,
    pub viral: ViralGenes,
}

impl Genome {
    /// Whether any link joins nodes `a` and `b`.
    #[must_use]
    pub fn is_linked(&self, a: usize, b: usize) -> bool {
        self.links.iter().any(|link| link.joins(a, b))
    }

    /// Whether a motor already drives `link`.
    #[must_use]
    pub fn link_has_motor(&self, link: usize) -> bool {
        self.motors.iter().any(|motor| motor.attached_to == link)
    }

    /// `nodes + links + 2·motors + 2·sensors`.
    #[must_use]
    pub fn complexity(&self) -> usize {
        self.nodes.len() + self.links.len() + 2 * self.motors.len() + 2 * self.sensors.len()
    }

    /// Whether the genome is descended from at least one recorded parent.
    #[must_use]
    pub fn is_descendant(&self) -> bool {
        self.parents.iter().any(Option::is_some)
    }

    pub(crate) fn renumber_nodes(&mut self) {
        for (index, node) in self.nodes.iter_mut().enumerate() {
            node.id = index;
        }
    }

    pub(crate) fn renumber_links(&mut self) {
        for (index, link) in self.links.iter_mut().enumerate() {
            link.id = index;
        }
    }

    pub(crate) fn renumber_motors(&mut self) {
        for (index, motor) in self.motors.iter_mut().enumerate() {
            motor.id = index;
        }
    }

    pub(crate) fn renumber_sensors(&mut self) {
        for (index, sensor) in self.sensors.iter_mut().enumerate() {
            sensor.id = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn clamp_to_respects_bounds() {
        assert_eq!(clamp_to(9.0, ranges::MASS), 5.0);
        assert_eq!(clamp_to(-1.0, ranges::UNIT), 0.0);
        assert_eq!(clamp_to(0.25, ranges::UNIT), 0.25);
    }

    #[test]
    fn random_viral_genes_have_distinct_receptors() {
        let mut rng = SmallRng::seed_from_u64(3);
        let settings = ViralSettings::default();
        for _ in 0..200 {
            let viral = ViralGenes::random(&settings, &mut rng);
            assert!((1..=4).contains(&viral.receptors.len()));
            let mut sorted = viral.receptors.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), viral.receptors.len());
            assert!(viral.receptors.iter().all(|r| *r < settings.receptor_pool));
        }
    }

    #[test]
    fn secondary_food_never_duplicates_primary() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..500 {
            let metabolism = Metabolism::random(&mut rng);
            assert_ne!(metabolism.secondary_food, Some(metabolism.primary_food));
            assert!(metabolism.digests(metabolism.primary_food));
        }
    }

    #[test]
    fn transfer_type_capabilities() {
        assert!(TransferType::Both.conjugates());
        assert!(TransferType::Both.transforms());
        assert!(!TransferType::Transformation.conjugates());
        assert!(!TransferType::Conjugation.transforms());
    }
}
